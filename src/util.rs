//! Utility functions
use crate::{
    error::{text, Error},
    sysfs::Sysfs,
};

/// Where the kernel `w1` bus exposes its masters and slaves.
///
/// Technically this lives under `/sys`, but as with everything else in sysfs
/// it is configurable so tests and odd layouts can point elsewhere.
pub const W1_PATH: &str = "/sys/bus/w1/devices";

/// `dir/file`, as used in error messages and by [`Sysfs`] implementations.
pub(crate) fn attr_path(dir: &str, file: &str) -> String {
    format!("{dir}/{file}")
}

/// First whitespace separated token in `lines`, if there is one.
fn first_token(lines: &[String]) -> Option<&str> {
    lines.iter().flat_map(|l| l.split_whitespace()).next()
}

/// Parse `s` as an integer, blaming `dir/file` if it isn't one.
pub(crate) fn parse_int(
    dir: &str,
    file: &str,
    field: &'static str,
    s: &str,
) -> Result<i32, Error> {
    s.parse::<i32>()
        .map_err(|_| Error::Parse(attr_path(dir, file), field, s.into()))
}

/// Read the leading integer of an attribute.
///
/// Empty content yields `default`, the kernel leaves some attributes empty
/// until the first conversion or bus scan.
///
/// # Errors
///
/// - I/O
/// - Content that doesn't start with an integer
pub(crate) fn read_int(
    sysfs: &dyn Sysfs,
    dir: &str,
    file: &str,
    default: i32,
) -> Result<i32, Error> {
    let lines = sysfs.read_lines(dir, file)?;
    match first_token(&lines) {
        Some(tok) => parse_int(dir, file, text::INTEGER, tok),
        None => Ok(default),
    }
}

/// Write a single line attribute.
pub(crate) fn write_str(
    sysfs: &dyn Sysfs,
    dir: &str,
    file: &str,
    value: &str,
) -> Result<(), Error> {
    tracing::debug!(path = %attr_path(dir, file), value, "writing attribute");
    sysfs.write_lines(dir, file, &[value])
}
