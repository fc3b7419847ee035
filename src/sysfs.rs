//! Text attribute access to the `w1` sysfs tree.
//!
//! # Implementation Details
//!
//! Everything the kernel `w1` and `w1_therm` drivers expose is a small text
//! file. Reads return the content split on `\n`, writes truncate and replace
//! the whole attribute.
//!
//! Many of these attributes write through to hardware, and require root.
//! Nothing here manages privilege, a denied open is just an
//! [`Error::Io`].
//!
//! There is no locking. Two writers on the same control file race, and only
//! the kernel driver decides who wins.
use crate::{error::Error, util::attr_path};
use std::{
    fmt::Debug,
    fs,
    io::prelude::*,
    path::{Path, PathBuf},
};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Line based access to attributes under some base directory.
///
/// `dir` is always relative to that base, either a bus master such as
/// `w1_bus_master1` or a slave such as `28-000000abcd`.
pub trait Sysfs: Debug + Send + Sync {
    /// Every line of `dir/file`, exactly as reported.
    ///
    /// Content ending in a newline yields a trailing empty line.
    ///
    /// # Errors
    ///
    /// - If the attribute can't be opened for reading
    fn read_lines(&self, dir: &str, file: &str) -> Result<Vec<String>>;

    /// Replace the contents of `dir/file` with `lines`, each newline
    /// terminated.
    ///
    /// Must be flushed before returning, so a following
    /// [`Sysfs::read_lines`] observes it.
    ///
    /// # Errors
    ///
    /// - If the attribute can't be opened for writing
    fn write_lines(&self, dir: &str, file: &str, lines: &[&str]) -> Result<()>;
}

/// [`Sysfs`] backed by the real filesystem.
#[derive(Debug, Clone)]
pub struct FsSysfs {
    base: PathBuf,
}

impl FsSysfs {
    /// Access attributes below `base`, normally [`crate::system::w1::W1_PATH`].
    pub fn new<P: AsRef<Path>>(base: P) -> Self {
        Self {
            base: base.as_ref().to_path_buf(),
        }
    }

    /// Base directory
    pub fn base(&self) -> &Path {
        &self.base
    }

    fn path(&self, dir: &str, file: &str) -> PathBuf {
        self.base.join(dir).join(file)
    }
}

impl Sysfs for FsSysfs {
    fn read_lines(&self, dir: &str, file: &str) -> Result<Vec<String>> {
        let path = self.path(dir, file);
        let s = fs::read_to_string(&path)
            .map_err(|e| Error::Io(path.display().to_string(), e))?;
        tracing::trace!(path = %path.display(), content = %s.trim_end(), "read attribute");
        Ok(s.split('\n').map(Into::into).collect())
    }

    fn write_lines(&self, dir: &str, file: &str, lines: &[&str]) -> Result<()> {
        let path = self.path(dir, file);
        let err = |e| Error::Io(path.display().to_string(), e);
        // sysfs attributes can't be created, only opened.
        let mut f = fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(err)?;
        let mut data = String::new();
        for line in lines {
            data.push_str(line);
            data.push('\n');
        }
        f.write_all(data.as_bytes()).map_err(err)?;
        f.flush().map_err(err)?;
        Ok(())
    }
}

/// In-memory [`Sysfs`] used by unit tests.
#[cfg(test)]
pub(crate) mod mem {
    use super::*;
    use std::{
        collections::{HashMap, VecDeque},
        io,
        sync::Mutex,
    };

    #[derive(Debug, Default)]
    pub struct MemSysfs {
        files: Mutex<HashMap<String, String>>,
        /// What the "driver" actually stores when an attribute is written.
        clamps: Mutex<HashMap<String, String>>,
        /// Successive read results, the last one sticks.
        scripted: Mutex<HashMap<String, VecDeque<String>>>,
        reads: Mutex<Vec<String>>,
        writes: Mutex<Vec<(String, String)>>,
    }

    impl MemSysfs {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert(&self, dir: &str, file: &str, content: &str) {
            self.files
                .lock()
                .unwrap()
                .insert(attr_path(dir, file), content.into());
        }

        pub fn get(&self, dir: &str, file: &str) -> Option<String> {
            self.files.lock().unwrap().get(&attr_path(dir, file)).cloned()
        }

        /// Writes to `dir/file` store `content` instead of what was written.
        pub fn clamp(&self, dir: &str, file: &str, content: &str) {
            self.clamps
                .lock()
                .unwrap()
                .insert(attr_path(dir, file), content.into());
        }

        pub fn script(&self, dir: &str, file: &str, reads: &[&str]) {
            self.scripted.lock().unwrap().insert(
                attr_path(dir, file),
                reads.iter().map(|s| s.to_string()).collect(),
            );
        }

        pub fn reads_of(&self, dir: &str, file: &str) -> usize {
            let key = attr_path(dir, file);
            self.reads.lock().unwrap().iter().filter(|k| **k == key).count()
        }

        pub fn writes(&self) -> Vec<(String, String)> {
            self.writes.lock().unwrap().clone()
        }
    }

    impl Sysfs for MemSysfs {
        fn read_lines(&self, dir: &str, file: &str) -> Result<Vec<String>> {
            let key = attr_path(dir, file);
            self.reads.lock().unwrap().push(key.clone());
            let scripted = {
                let mut scripted = self.scripted.lock().unwrap();
                match scripted.get_mut(&key) {
                    Some(q) if q.len() > 1 => q.pop_front(),
                    Some(q) => q.front().cloned(),
                    None => None,
                }
            };
            let content = match scripted {
                Some(s) => s,
                None => self
                    .files
                    .lock()
                    .unwrap()
                    .get(&key)
                    .cloned()
                    .ok_or_else(|| Error::Io(key.clone(), io::ErrorKind::NotFound.into()))?,
            };
            Ok(content.split('\n').map(Into::into).collect())
        }

        fn write_lines(&self, dir: &str, file: &str, lines: &[&str]) -> Result<()> {
            let key = attr_path(dir, file);
            let mut files = self.files.lock().unwrap();
            if !files.contains_key(&key) {
                return Err(Error::Io(key, io::ErrorKind::NotFound.into()));
            }
            let data: String = lines.iter().map(|l| format!("{l}\n")).collect();
            self.writes.lock().unwrap().push((key.clone(), data.clone()));
            let stored = self.clamps.lock().unwrap().get(&key).cloned();
            files.insert(key, stored.unwrap_or(data));
            Ok(())
        }
    }
}
