//! Interface to the Linux one-wire (`w1`) bus and DS18xx temperature sensors.
//!
//! # Examples
//!
//! Print the temperature of every sensor on the first bus master
//!
//! ```rust,no_run
//! # use w1therm::system::w1::*;
//! let bus = BusMaster::new(Config::default());
//!
//! for dev in bus.devices().unwrap() {
//!     println!("{}: {}°C", dev.identity(), dev.temperature().unwrap());
//! }
//! ```
//!
//! # Implementation
//!
//! This uses the sysfs interface of the `w1` and `w1_therm` drivers,
//! documented [here][1] and [here][2].
//!
//! The bus master directory holds bus wide attributes, every bound slave has
//! a directory named `<family code>-<serial>` next to it.
//!
//! [1]: https://www.kernel.org/doc/Documentation/ABI/stable/sysfs-driver-w1_therm
//! [2]: https://www.kernel.org/doc/html/latest/w1/w1-generic.html
use crate::{
    error::{text, Error},
    util::attr_path,
};
use std::{
    fmt,
    hash::{Hash, Hasher},
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

pub mod master;
pub mod therm;

pub use master::{BusMaster, DeviceAction};
pub use therm::SensorDevice;

pub use crate::util::W1_PATH;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Lowest temperature, in °C, the sensors can measure or alarm on.
pub const MIN_TEMP: i32 = -55;

/// Highest temperature, in °C, the sensors can measure or alarm on.
pub const MAX_TEMP: i32 = 125;

/// Supported temperature sensor families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    /// Family code `10`
    Ds18s20,

    /// Family code `22`
    Ds1822,

    /// Family code `28`
    Ds18b20,

    /// Family code `3B`
    Ds1825,

    /// Family code `42`
    Ds28ea00,
}

impl DeviceType {
    /// Every supported family.
    pub const ALL: [DeviceType; 5] = [
        DeviceType::Ds18s20,
        DeviceType::Ds1822,
        DeviceType::Ds18b20,
        DeviceType::Ds1825,
        DeviceType::Ds28ea00,
    ];

    /// Two character hex family code, as used in slave names.
    pub fn family_code(self) -> &'static str {
        match self {
            DeviceType::Ds18s20 => "10",
            DeviceType::Ds1822 => "22",
            DeviceType::Ds18b20 => "28",
            DeviceType::Ds1825 => "3B",
            DeviceType::Ds28ea00 => "42",
        }
    }

    /// Look up a family code. Hex digits are matched case-insensitively.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownFamily`] if `code` isn't one of ours
    pub fn from_family_code(code: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.family_code().eq_ignore_ascii_case(code))
            .ok_or_else(|| Error::UnknownFamily(code.into()))
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.family_code())
    }
}

impl FromStr for DeviceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_family_code(s)
    }
}

impl TryFrom<&str> for DeviceType {
    type Error = Error;

    fn try_from(code: &str) -> Result<Self> {
        Self::from_family_code(code)
    }
}

/// Which sensor on the bus, `(family, serial)`.
///
/// The serial is whatever the driver reports, it's an identifier and is never
/// validated.
///
/// Parsed identities remember how the driver spelled the family code, the
/// kernel names slaves in lowercase hex (`3b-...`) and the device directory
/// has to match. Equality only looks at `(family, serial)`.
#[derive(Debug, Clone)]
pub struct DeviceIdentity {
    family: DeviceType,
    serial: String,
    code: String,
}

impl DeviceIdentity {
    /// Identity with the canonical family code spelling, see
    /// [`DeviceType::family_code`].
    pub fn new<S: Into<String>>(family: DeviceType, serial: S) -> Self {
        Self {
            family,
            serial: serial.into(),
            code: family.family_code().into(),
        }
    }

    /// Parse `line` from the attribute `dir/file`, blaming it on failure.
    pub(crate) fn parse_in(dir: &str, file: &str, line: &str) -> Result<Self> {
        let invalid = |field| Error::Parse(attr_path(dir, file), field, line.into());
        let (code, serial) = line.split_once('-').ok_or_else(|| invalid(text::DEVICE))?;
        let family = DeviceType::from_family_code(code).map_err(|_| invalid(text::FAMILY))?;
        Ok(Self {
            family,
            serial: serial.into(),
            code: code.into(),
        })
    }

    pub fn family(&self) -> DeviceType {
        self.family
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Slave name, `<family code>-<serial>`. Also the device directory name.
    pub fn name(&self) -> String {
        self.to_string()
    }
}

impl PartialEq for DeviceIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.family == other.family && self.serial == other.serial
    }
}

impl Eq for DeviceIdentity {}

impl Hash for DeviceIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.family.hash(state);
        self.serial.hash(state);
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.code, self.serial)
    }
}

impl FromStr for DeviceIdentity {
    type Err = Error;

    /// Parse a slave name as listed in `w1_master_slaves`.
    fn from_str(s: &str) -> Result<Self> {
        let (code, serial) = s
            .split_once('-')
            .ok_or_else(|| Error::InvalidName(s.into()))?;
        Ok(Self {
            family: code.parse()?,
            serial: serial.into(),
            code: code.into(),
        })
    }
}

/// Strong pullup setting of a bus master.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullupSetting {
    Enabled,
    Disabled,

    /// Enable the pullup only if some sensor on the bus is parasite powered.
    ///
    /// Only meaningful for [`BusMaster::set_pullup`], it's never stored.
    Auto,
}

impl fmt::Display for PullupSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PullupSetting::Enabled => "enabled",
            PullupSetting::Disabled => "disabled",
            PullupSetting::Auto => "auto",
        })
    }
}

/// Alarm window of a sensor, in whole °C.
///
/// A sensor is in alarm when its temperature is outside `low..=high`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmThresholds {
    low: i32,
    high: i32,
}

impl AlarmThresholds {
    /// Alarm window between `a` and `b`, in either order.
    ///
    /// # Errors
    ///
    /// - [`Error::Range`] if the window leaves [`MIN_TEMP`]..=[`MAX_TEMP`]
    pub fn new(a: i32, b: i32) -> Result<Self> {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        if low < MIN_TEMP {
            return Err(Error::Range(text::ALARM_LOW, low, MIN_TEMP, MAX_TEMP));
        }
        if high > MAX_TEMP {
            return Err(Error::Range(text::ALARM_HIGH, high, MIN_TEMP, MAX_TEMP));
        }
        Ok(Self { low, high })
    }

    /// Whatever the driver reported, unchecked.
    pub(crate) fn new_unchecked(low: i32, high: i32) -> Self {
        Self { low, high }
    }

    pub fn low(&self) -> i32 {
        self.low
    }

    pub fn high(&self) -> i32 {
        self.high
    }

    /// Whether `temp` would trigger an alarm.
    pub fn is_alarm(&self, temp: i32) -> bool {
        temp < self.low || temp > self.high
    }
}

impl fmt::Display for AlarmThresholds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.low, self.high)
    }
}

/// Raw 9 byte sensor scratchpad, as last read by the driver.
///
/// See the DS18B20 datasheet for the layout. Byte 8 is the CRC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScratchpadSnapshot([u8; 9]);

impl ScratchpadSnapshot {
    pub fn new(bytes: [u8; 9]) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> &[u8; 9] {
        &self.0
    }

    /// Raw little endian temperature register
    pub fn temperature_raw(&self) -> i16 {
        i16::from_le_bytes([self.0[0], self.0[1]])
    }

    /// TH register, the high alarm threshold
    pub fn alarm_high(&self) -> i8 {
        self.0[2] as i8
    }

    /// TL register, the low alarm threshold
    pub fn alarm_low(&self) -> i8 {
        self.0[3] as i8
    }

    /// Configuration register. Not present on the DS18S20.
    pub fn config(&self) -> u8 {
        self.0[4]
    }

    pub fn crc(&self) -> u8 {
        self.0[8]
    }
}

/// Where to find the bus, and how to wait on it.
#[derive(Debug, Clone)]
pub struct Config {
    base: PathBuf,
    master: u32,
    poll_interval: Duration,
    max_polls: Option<u32>,
}

impl Default for Config {
    /// `/sys/bus/w1/devices/w1_bus_master1`, polling every 750ms for up to 30
    /// seconds.
    fn default() -> Self {
        Self {
            base: W1_PATH.into(),
            master: 1,
            // Worst case 12 bit conversion time
            poll_interval: Duration::from_millis(750),
            max_polls: Some(40),
        }
    }
}

impl Config {
    /// Directory holding the bus masters and slaves.
    pub fn with_base<P: AsRef<Path>>(mut self, base: P) -> Self {
        self.base = base.as_ref().to_path_buf();
        self
    }

    /// Bus master index, the `N` in `w1_bus_masterN`.
    pub fn with_master(mut self, master: u32) -> Self {
        self.master = master;
        self
    }

    /// How long to sleep between checks on a bulk conversion.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Give up on a bulk conversion after this many sleeps. [`None`] waits
    /// forever.
    pub fn with_max_polls(mut self, max: Option<u32>) -> Self {
        self.max_polls = max;
        self
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn master(&self) -> u32 {
        self.master
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn max_polls(&self) -> Option<u32> {
        self.max_polls
    }

    /// Bus master directory name, relative to [`Config::base`].
    pub fn master_dir(&self) -> String {
        format!("w1_bus_master{}", self.master)
    }
}
