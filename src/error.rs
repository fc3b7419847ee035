//! Error handling stuff
use displaydoc::Display;
use std::io;
use thiserror::Error;

/// Error type for [`crate::system::w1`]
#[derive(Debug, Display, Error)]
pub enum Error {
    /// IO failed on `{0}`: {1}
    Io(String, #[source] io::Error),

    /// Invalid {1} in `{0}`: `{2}`
    Parse(String, &'static str, String),

    /// Unknown family code `{0}`
    UnknownFamily(String),

    /// Invalid slave name `{0}`, expected `<family code>-<serial>`
    InvalidName(String),

    /// {0} of {1} is outside of {2}..={3}
    Range(&'static str, i32, i32, i32),

    /// Wrote `{1}` to `{0}` but read back `{2}`
    WriteVerification(String, String, String),

    /// `{0}` still busy after {1} polls
    Timeout(String, u32),

    /// No devices on the bus
    NoDevices,
}

impl Error {
    /// Whether this is an I/O failure, usually permissions or a missing
    /// device.
    pub fn is_io(&self) -> bool {
        matches!(self, Error::Io(..))
    }

    /// Whether the backing store reported something we couldn't parse.
    pub fn is_parse(&self) -> bool {
        matches!(
            self,
            Error::Parse(..) | Error::UnknownFamily(..) | Error::InvalidName(..)
        )
    }

    /// Whether a caller supplied value was rejected before any write.
    pub fn is_range(&self) -> bool {
        matches!(self, Error::Range(..))
    }

    /// Whether a write went through but didn't stick.
    pub fn is_verification(&self) -> bool {
        matches!(self, Error::WriteVerification(..))
    }

    /// Whether a bulk conversion never finished.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(..))
    }
}

/// Error text.
pub(crate) mod text {
    pub const INTEGER: &str = "integer";

    pub const DEVICE: &str = "device name";

    pub const FAMILY: &str = "family code";

    pub const SCRATCHPAD: &str = "scratchpad byte";

    pub const RESOLUTION: &str = "resolution";

    pub const ALARM_LOW: &str = "low alarm threshold";

    pub const ALARM_HIGH: &str = "high alarm threshold";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        let e = Error::WriteVerification("28-01/resolution".into(), "10".into(), "9".into());
        assert_eq!(e.to_string(), "Wrote `10` to `28-01/resolution` but read back `9`");
        assert!(e.is_verification());

        let e = Error::Range(text::RESOLUTION, 13, 9, 12);
        assert_eq!(e.to_string(), "resolution of 13 is outside of 9..=12");
        assert!(e.is_range());
        assert!(!e.is_io());
    }
}
