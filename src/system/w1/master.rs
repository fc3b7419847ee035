//! One-wire bus masters.
//!
//! A bus master holds no state of its own, everything lives in the
//! `w1_bus_masterN` sysfs directory.
use super::{
    Config,
    DeviceIdentity,
    PullupSetting,
    Result,
    SensorDevice,
};
use crate::{
    error::Error,
    sysfs::{FsSysfs, Sysfs},
    util::{attr_path, read_int, write_str},
};
use std::{sync::Arc, thread};
use tracing::{debug, trace, warn};

const SLAVE_COUNT: &str = "w1_master_slave_count";
const SLAVES: &str = "w1_master_slaves";
const ADD: &str = "w1_master_add";
const REMOVE: &str = "w1_master_remove";
const PULLUP: &str = "w1_master_pullup";
const BULK_READ: &str = "therm_bulk_read";

/// [`BULK_READ`] status while a conversion is still running.
const CONVERTING: i32 = -1;

/// Supported [`BusMaster::manual_control`] actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceAction {
    Add,
    Remove,
}

/// A `w1` bus master and the sensors on it.
#[derive(Debug, Clone)]
pub struct BusMaster {
    sysfs: Arc<dyn Sysfs>,
    config: Config,
    dir: String,
}

// Public
impl BusMaster {
    /// Bus master described by `config`, on the real sysfs.
    pub fn new(config: Config) -> Self {
        let sysfs = Arc::new(FsSysfs::new(config.base()));
        Self::with_sysfs(config, sysfs)
    }

    /// Bus master described by `config`, using `sysfs` for all access.
    ///
    /// [`Config::base`] is ignored, `sysfs` decides where attributes live.
    pub fn with_sysfs(config: Config, sysfs: Arc<dyn Sysfs>) -> Self {
        let dir = config.master_dir();
        Self { sysfs, config, dir }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Number of slaves the driver currently knows about.
    pub fn device_count(&self) -> Result<i32> {
        read_int(&*self.sysfs, &self.dir, SLAVE_COUNT, 0)
    }

    /// Every slave on the bus, in the order the driver lists them.
    ///
    /// # Errors
    ///
    /// - I/O
    /// - [`Error::Parse`] if a slave isn't a supported sensor
    pub fn list_devices(&self) -> Result<Vec<DeviceIdentity>> {
        // The slave list may not exist before the first search.
        if self.device_count()? == 0 {
            return Ok(Vec::new());
        }
        self.sysfs
            .read_lines(&self.dir, SLAVES)?
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .map(|l| DeviceIdentity::parse_in(&self.dir, SLAVES, l))
            .collect()
    }

    /// Handles to every sensor on the bus, see [`BusMaster::list_devices`].
    pub fn devices(&self) -> Result<Vec<SensorDevice>> {
        Ok(self
            .list_devices()?
            .into_iter()
            .map(|id| self.device(id))
            .collect())
    }

    /// Handle to the sensor `identity`, sharing this bus' sysfs access.
    pub fn device(&self, identity: DeviceIdentity) -> SensorDevice {
        SensorDevice::new(self.sysfs.clone(), identity)
    }

    /// Manually add or remove a slave.
    ///
    /// The driver normally does this on its own. It makes the most sense with
    /// automatic search disabled.
    ///
    /// # Note
    ///
    /// The driver doesn't report whether this did anything, use
    /// [`BusMaster::list_devices`] to find out.
    pub fn manual_control(&self, identity: &DeviceIdentity, action: DeviceAction) -> Result<()> {
        let file = match action {
            DeviceAction::Add => ADD,
            DeviceAction::Remove => REMOVE,
        };
        write_str(&*self.sysfs, &self.dir, file, &identity.name())
    }

    /// See [`BusMaster::manual_control`]
    pub fn manual_add(&self, identity: &DeviceIdentity) -> Result<()> {
        self.manual_control(identity, DeviceAction::Add)
    }

    /// See [`BusMaster::manual_control`]
    pub fn manual_remove(&self, identity: &DeviceIdentity) -> Result<()> {
        self.manual_control(identity, DeviceAction::Remove)
    }

    /// Current strong pullup setting, never [`PullupSetting::Auto`].
    pub fn pullup(&self) -> Result<PullupSetting> {
        // Inverted, 0 means enabled.
        Ok(match read_int(&*self.sysfs, &self.dir, PULLUP, 1)? {
            0 => PullupSetting::Enabled,
            _ => PullupSetting::Disabled,
        })
    }

    /// Set the strong pullup.
    ///
    /// [`PullupSetting::Auto`] enables it only if some sensor is parasite
    /// powered, see [`BusMaster::all_devices_externally_powered`].
    ///
    /// # Errors
    ///
    /// - [`Error::WriteVerification`] if the driver didn't take it
    pub fn set_pullup(&self, setting: PullupSetting) -> Result<()> {
        let target = match setting {
            PullupSetting::Auto if self.all_devices_externally_powered()? => {
                PullupSetting::Disabled
            }
            PullupSetting::Auto => PullupSetting::Enabled,
            s => s,
        };
        let value = match target {
            PullupSetting::Enabled => "0",
            _ => "1",
        };
        write_str(&*self.sysfs, &self.dir, PULLUP, value)?;
        let observed = self.pullup()?;
        if observed != target {
            let path = attr_path(&self.dir, PULLUP);
            warn!(%path, %target, %observed, "pullup didn't stick");
            return Err(Error::WriteVerification(
                path,
                target.to_string(),
                observed.to_string(),
            ));
        }
        Ok(())
    }

    /// Whether no sensor on the bus is parasite powered.
    pub fn all_devices_externally_powered(&self) -> Result<bool> {
        for dev in self.devices()? {
            if !dev.has_external_power()? {
                debug!(device = %dev.identity(), "parasite powered");
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Sensors whose temperature is outside their alarm window.
    ///
    /// Triggers a simultaneous conversion on every sensor on the bus, waits
    /// for it, then compares each rounded temperature against that sensor's
    /// [`super::AlarmThresholds`].
    ///
    /// This blocks the calling thread for the whole conversion.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] if the conversion is still running after
    ///   [`Config::max_polls`] polls
    pub fn alarm_search(&self) -> Result<Vec<DeviceIdentity>> {
        self.bulk_convert()?;
        let mut alarms = Vec::new();
        for dev in self.devices()? {
            let window = dev.alarm_thresholds()?;
            let temp = dev.temperature()?.round() as i32;
            if window.is_alarm(temp) {
                debug!(device = %dev.identity(), temp, %window, "in alarm");
                alarms.push(dev.identity().clone());
            }
        }
        Ok(alarms)
    }
}

// Private
impl BusMaster {
    /// Start a conversion on every sensor and wait for it to finish.
    fn bulk_convert(&self) -> Result<()> {
        write_str(&*self.sysfs, &self.dir, BULK_READ, "trigger")?;
        let mut polls = 0;
        loop {
            let status = read_int(&*self.sysfs, &self.dir, BULK_READ, 0)?;
            if status != CONVERTING {
                trace!(status, polls, "bulk conversion done");
                return Ok(());
            }
            if matches!(self.config.max_polls(), Some(max) if polls >= max) {
                let path = attr_path(&self.dir, BULK_READ);
                warn!(%path, polls, "bulk conversion timed out");
                return Err(Error::Timeout(path, polls));
            }
            polls += 1;
            thread::sleep(self.config.poll_interval());
        }
    }
}
