//! DS18xx temperature sensors, through the `w1_therm` driver.
//!
//! A [`SensorDevice`] is only a handle. Nothing is cached, every accessor goes
//! back to sysfs.
use super::{AlarmThresholds, BusMaster, DeviceIdentity, Result, ScratchpadSnapshot};
use crate::{
    error::{text, Error},
    sysfs::Sysfs,
    util::{attr_path, parse_int, read_int, write_str},
};
use std::{ops::RangeInclusive, sync::Arc};
use tracing::{debug, warn};

const TEMPERATURE: &str = "temperature";
const RESOLUTION: &str = "resolution";
const ALARMS: &str = "alarms";
const EXT_POWER: &str = "ext_power";
const EEPROM: &str = "eeprom";
const W1_SLAVE: &str = "w1_slave";

/// Reported when the temperature attribute is empty, -56°C, one below what
/// any sensor can measure.
const INVALID_MILLI_C: i32 = -56_000;

/// Supported conversion resolutions, in bits.
pub const RESOLUTIONS: RangeInclusive<i32> = 9..=12;

/// A temperature sensor bound to the `w1_therm` driver.
#[derive(Debug, Clone)]
pub struct SensorDevice {
    sysfs: Arc<dyn Sysfs>,
    identity: DeviceIdentity,
    dir: String,
}

// Public
impl SensorDevice {
    /// Handle to the sensor `identity`.
    ///
    /// This doesn't check the sensor exists, a missing sensor shows up as
    /// [`Error::Io`] on first use.
    pub fn new(sysfs: Arc<dyn Sysfs>, identity: DeviceIdentity) -> Self {
        let dir = identity.name();
        Self {
            sysfs,
            identity,
            dir,
        }
    }

    /// The first sensor on `bus`, for setups with only one.
    ///
    /// # Errors
    ///
    /// - [`Error::NoDevices`] if the bus is empty
    /// - Anything [`BusMaster::list_devices`] can return
    pub fn first(bus: &BusMaster) -> Result<Self> {
        bus.devices()?.into_iter().next().ok_or(Error::NoDevices)
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// Point this handle at a different sensor.
    pub fn set_identity(&mut self, identity: DeviceIdentity) {
        self.dir = identity.name();
        self.identity = identity;
    }

    /// Last converted temperature, in °C.
    ///
    /// An empty attribute reads as -56°C, which no sensor can report.
    pub fn temperature(&self) -> Result<f64> {
        let milli = read_int(&*self.sysfs, &self.dir, TEMPERATURE, INVALID_MILLI_C)?;
        Ok(f64::from(milli) / 1000.0)
    }

    /// Conversion resolution, in bits.
    pub fn resolution(&self) -> Result<i32> {
        read_int(&*self.sysfs, &self.dir, RESOLUTION, 12)
    }

    /// Set the conversion resolution to `bits`, 9 to 12.
    ///
    /// Only affects SRAM, see [`SensorDevice::save_to_eeprom`].
    ///
    /// # Errors
    ///
    /// - [`Error::Range`] if `bits` isn't supported. Nothing is written.
    /// - [`Error::WriteVerification`] if the driver didn't take it
    pub fn set_resolution(&self, bits: i32) -> Result<()> {
        if !RESOLUTIONS.contains(&bits) {
            return Err(Error::Range(
                text::RESOLUTION,
                bits,
                *RESOLUTIONS.start(),
                *RESOLUTIONS.end(),
            ));
        }
        write_str(&*self.sysfs, &self.dir, RESOLUTION, &bits.to_string())?;
        let observed = self.resolution()?;
        if observed != bits {
            return Err(self.mismatch(RESOLUTION, bits, observed));
        }
        self.persist_to_sram()?;
        Ok(())
    }

    /// Configured alarm window.
    ///
    /// # Errors
    ///
    /// - I/O
    /// - If the attribute isn't two integers
    pub fn alarm_thresholds(&self) -> Result<AlarmThresholds> {
        let lines = self.sysfs.read_lines(&self.dir, ALARMS)?;
        let mut it = lines.iter().flat_map(|l| l.split_whitespace());
        let mut next = |field: &'static str| -> Result<i32> {
            let tok = it.next().ok_or_else(|| {
                Error::Parse(attr_path(&self.dir, ALARMS), field, lines.join("\n"))
            })?;
            parse_int(&self.dir, ALARMS, field, tok)
        };
        let low = next(text::ALARM_LOW)?;
        let high = next(text::ALARM_HIGH)?;
        Ok(AlarmThresholds::new_unchecked(low, high))
    }

    /// Set the alarm window, `a` and `b` may be given in either order.
    ///
    /// Only affects SRAM, see [`SensorDevice::save_to_eeprom`].
    ///
    /// # Errors
    ///
    /// - [`Error::Range`] if the window isn't within -55..=125°C. Nothing is
    ///   written.
    /// - [`Error::WriteVerification`] if either threshold didn't take
    pub fn set_alarm_thresholds(&self, a: i32, b: i32) -> Result<()> {
        let wanted = AlarmThresholds::new(a, b)?;
        write_str(&*self.sysfs, &self.dir, ALARMS, &wanted.to_string())?;
        let observed = self.alarm_thresholds()?;
        if observed != wanted {
            return Err(self.mismatch(ALARMS, wanted, observed));
        }
        self.persist_to_sram()?;
        Ok(())
    }

    /// Whether the sensor has its own supply, as opposed to parasite power
    /// from the data line.
    ///
    /// An empty attribute is assumed external.
    pub fn has_external_power(&self) -> Result<bool> {
        Ok(read_int(&*self.sysfs, &self.dir, EXT_POWER, 1)? != 0)
    }

    /// Reload SRAM from EEPROM, as if the sensor had just powered up.
    pub fn restore_from_eeprom(&self) -> Result<()> {
        debug!(device = %self.identity, "restoring from eeprom");
        write_str(&*self.sysfs, &self.dir, EEPROM, "restore")
    }

    /// Persist SRAM, resolution and alarms, to EEPROM.
    ///
    /// # Note
    ///
    /// Parasite powered sensors need the strong pullup during the copy, see
    /// [`BusMaster::set_pullup`]. That's up to the caller.
    pub fn save_to_eeprom(&self) -> Result<()> {
        debug!(device = %self.identity, "saving to eeprom");
        write_str(&*self.sysfs, &self.dir, EEPROM, "save")
    }

    /// Raw scratchpad, the first 9 bytes of `w1_slave`.
    ///
    /// Reading `w1_slave` makes the driver talk to the sensor, so this is
    /// slow.
    pub fn read_scratchpad(&self) -> Result<ScratchpadSnapshot> {
        let lines = self.sysfs.read_lines(&self.dir, W1_SLAVE)?;
        let invalid =
            |s: &str| Error::Parse(attr_path(&self.dir, W1_SLAVE), text::SCRATCHPAD, s.into());
        let mut bytes = [0u8; 9];
        let mut toks = lines.iter().flat_map(|l| l.split_whitespace());
        for b in &mut bytes {
            let tok = toks.next().ok_or_else(|| invalid(&lines.join("\n")))?;
            *b = u8::from_str_radix(tok, 16).map_err(|_| invalid(tok))?;
        }
        Ok(ScratchpadSnapshot::new(bytes))
    }
}

// Private
impl SensorDevice {
    /// Re-read the scratchpad so the driver refreshes its view of SRAM after
    /// a configuration write.
    fn persist_to_sram(&self) -> Result<ScratchpadSnapshot> {
        self.read_scratchpad()
    }

    fn mismatch<T: ToString>(&self, file: &str, expected: T, observed: T) -> Error {
        let path = attr_path(&self.dir, file);
        let (expected, observed) = (expected.to_string(), observed.to_string());
        warn!(%path, %expected, %observed, "write didn't stick");
        Error::WriteVerification(path, expected, observed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        sysfs::mem::MemSysfs,
        system::w1::{Config, DeviceType},
    };

    const DEV: &str = "28-000000abcd";
    const SLAVE: &str = "72 01 4b 46 7f ff 0e 10 57 : crc=57 YES\n\
                         72 01 4b 46 7f ff 0e 10 57 t=23125\n";

    fn setup() -> (Arc<MemSysfs>, SensorDevice) {
        let fs = Arc::new(MemSysfs::new());
        fs.insert(DEV, TEMPERATURE, "23562\n");
        fs.insert(DEV, RESOLUTION, "12\n");
        fs.insert(DEV, ALARMS, "70 75\n");
        fs.insert(DEV, EXT_POWER, "1\n");
        fs.insert(DEV, EEPROM, "");
        fs.insert(DEV, W1_SLAVE, SLAVE);
        let dev = SensorDevice::new(
            fs.clone(),
            DeviceIdentity::new(DeviceType::Ds18b20, "000000abcd"),
        );
        (fs, dev)
    }

    #[test]
    fn temperature() {
        let (fs, dev) = setup();
        assert_eq!(dev.temperature().unwrap(), 23.562);

        fs.insert(DEV, TEMPERATURE, "-1250\n");
        assert_eq!(dev.temperature().unwrap(), -1.25);

        fs.insert(DEV, TEMPERATURE, "");
        assert_eq!(dev.temperature().unwrap(), -56.0);

        fs.insert(DEV, TEMPERATURE, "85000x\n");
        assert!(dev.temperature().unwrap_err().is_parse());
    }

    #[test]
    fn resolution() {
        let (fs, dev) = setup();
        assert_eq!(dev.resolution().unwrap(), 12);
        fs.insert(DEV, RESOLUTION, "");
        assert_eq!(dev.resolution().unwrap(), 12);

        dev.set_resolution(10).unwrap();
        assert_eq!(fs.get(DEV, RESOLUTION).unwrap(), "10\n");
        assert_eq!(dev.resolution().unwrap(), 10);
        // Scratchpad refreshed afterwards
        assert_eq!(fs.reads_of(DEV, W1_SLAVE), 1);
    }

    #[test]
    fn resolution_range() {
        let (fs, dev) = setup();
        for bits in [-1, 0, 8, 13, 16] {
            assert!(dev.set_resolution(bits).unwrap_err().is_range());
        }
        assert!(fs.writes().is_empty());
    }

    #[test]
    fn resolution_mismatch() {
        let (fs, dev) = setup();
        fs.clamp(DEV, RESOLUTION, "9\n");
        match dev.set_resolution(10) {
            Err(Error::WriteVerification(path, expected, observed)) => {
                assert_eq!(path, "28-000000abcd/resolution");
                assert_eq!(expected, "10");
                assert_eq!(observed, "9");
            }
            r => panic!("expected verification failure, got {r:?}"),
        }
        assert_eq!(fs.reads_of(DEV, W1_SLAVE), 0);
    }

    #[test]
    fn alarms() {
        let (fs, dev) = setup();
        assert_eq!(
            dev.alarm_thresholds().unwrap(),
            AlarmThresholds::new(70, 75).unwrap()
        );

        dev.set_alarm_thresholds(10, 5).unwrap();
        assert_eq!(fs.get(DEV, ALARMS).unwrap(), "5 10\n");
        dev.set_alarm_thresholds(5, 10).unwrap();
        assert_eq!(fs.get(DEV, ALARMS).unwrap(), "5 10\n");
        assert_eq!(fs.reads_of(DEV, W1_SLAVE), 2);

        fs.insert(DEV, ALARMS, "5\n");
        assert!(dev.alarm_thresholds().unwrap_err().is_parse());
    }

    #[test]
    fn alarms_range() {
        let (fs, dev) = setup();
        assert!(dev.set_alarm_thresholds(-60, 10).unwrap_err().is_range());
        assert!(dev.set_alarm_thresholds(5, 130).unwrap_err().is_range());
        assert!(fs.writes().is_empty());
    }

    #[test]
    fn alarms_single_field_mismatch() {
        let (fs, dev) = setup();
        // Driver clamps the high threshold
        fs.clamp(DEV, ALARMS, "5 9\n");
        let e = dev.set_alarm_thresholds(5, 10).unwrap_err();
        assert!(e.is_verification());
        assert_eq!(e.to_string(), "Wrote `5 10` to `28-000000abcd/alarms` but read back `5 9`");
    }

    #[test]
    fn power_and_eeprom() {
        let (fs, dev) = setup();
        assert!(dev.has_external_power().unwrap());
        fs.insert(DEV, EXT_POWER, "0\n");
        assert!(!dev.has_external_power().unwrap());
        fs.insert(DEV, EXT_POWER, "");
        assert!(dev.has_external_power().unwrap());

        dev.save_to_eeprom().unwrap();
        assert_eq!(fs.get(DEV, EEPROM).unwrap(), "save\n");
        dev.restore_from_eeprom().unwrap();
        assert_eq!(fs.get(DEV, EEPROM).unwrap(), "restore\n");
    }

    #[test]
    fn scratchpad() {
        let (fs, dev) = setup();
        let s = dev.read_scratchpad().unwrap();
        assert_eq!(s.bytes(), &[0x72, 0x01, 0x4b, 0x46, 0x7f, 0xff, 0x0e, 0x10, 0x57]);

        fs.insert(DEV, W1_SLAVE, "72 01 4b\n");
        assert!(dev.read_scratchpad().unwrap_err().is_parse());
        fs.insert(DEV, W1_SLAVE, "72 01 4b 46 zz ff 0e 10 57\n");
        assert!(dev.read_scratchpad().unwrap_err().is_parse());
    }

    #[test]
    fn missing_device() {
        let fs = Arc::new(MemSysfs::new());
        let dev = SensorDevice::new(fs, "10-000000ef01".parse().unwrap());
        assert!(dev.temperature().unwrap_err().is_io());
    }

    #[test]
    fn first() {
        let fs = Arc::new(MemSysfs::new());
        let bus = BusMaster::with_sysfs(Config::default(), fs.clone());
        fs.insert("w1_bus_master1", "w1_master_slave_count", "0\n");
        assert!(matches!(SensorDevice::first(&bus), Err(Error::NoDevices)));

        fs.insert("w1_bus_master1", "w1_master_slave_count", "2\n");
        fs.insert("w1_bus_master1", "w1_master_slaves", "10-000000ef01\n28-000000abcd\n");
        let mut dev = SensorDevice::first(&bus).unwrap();
        assert_eq!(dev.identity().to_string(), "10-000000ef01");

        dev.set_identity("28-000000abcd".parse().unwrap());
        fs.insert(DEV, TEMPERATURE, "1000\n");
        assert_eq!(dev.temperature().unwrap(), 1.0);
    }
}
