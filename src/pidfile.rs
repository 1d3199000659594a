//! Advisory PID file: one line holding the daemon's decimal process id.
//!
//! The existence checks are not atomic with the write. Two processes starting
//! at the same moment can both pass [`PidFile::abort_if_existing`]; the file
//! is a marker for tooling, not a lock.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{DaemonError, DaemonResult};
use crate::sys::System;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        PidFile { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Checks for the file without looking at its content.
    pub fn exists<S: System + ?Sized>(&self, sys: &S) -> bool {
        sys.path_exists(&self.path)
    }

    /// Returns the recorded pid, or `None` when there is no file.
    ///
    /// Only the first line is parsed. Anything that is not a positive
    /// decimal number is [`DaemonError::InvalidPidFile`].
    pub fn read_pid<S: System + ?Sized>(&self, sys: &S) -> DaemonResult<Option<i32>> {
        let content = match sys.read_file(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let first_line = content.lines().next().unwrap_or("").trim();
        match first_line.parse::<i32>() {
            Ok(pid) if pid > 0 => Ok(Some(pid)),
            _ => Err(DaemonError::InvalidPidFile {
                path: self.path.clone(),
                content: first_line.to_owned(),
            }),
        }
    }

    /// Writes the calling process's pid, replacing any previous content.
    pub fn write_pid<S: System + ?Sized>(&self, sys: &S) -> DaemonResult<()> {
        let pid = sys.getpid();
        sys.write_file(&self.path, format!("{pid}\n").as_bytes())?;
        debug!(pid, path = %self.path.display(), "wrote pidfile");
        Ok(())
    }

    /// Deletes the file. A file that is already gone is not an error.
    pub fn remove<S: System + ?Sized>(&self, sys: &S) -> DaemonResult<()> {
        match sys.remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "removed pidfile");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Fails with [`DaemonError::AlreadyRunning`] if the file exists.
    ///
    /// The recorded pid is read only for the message; a stale file from a
    /// dead process blocks startup just the same.
    pub fn abort_if_existing<S: System + ?Sized>(&self, sys: &S) -> DaemonResult<()> {
        if !self.exists(sys) {
            return Ok(());
        }
        let pid = self.read_pid(sys).unwrap_or_else(|err| {
            warn!(path = %self.path.display(), %err, "unreadable pidfile");
            None
        });
        Err(DaemonError::AlreadyRunning {
            path: self.path.clone(),
            pid,
        })
    }

    /// Fails with [`DaemonError::NotRunning`] if the file is absent.
    pub fn abort_if_missing<S: System + ?Sized>(&self, sys: &S) -> DaemonResult<()> {
        if self.exists(sys) {
            Ok(())
        } else {
            Err(DaemonError::NotRunning {
                path: self.path.clone(),
            })
        }
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use crate::sys::mock::MockSystem;
    use proptest::prelude::*;

    proptest! {
        /// read_pid returns exactly what the last write_pid recorded
        #[test]
        fn read_returns_last_written_pid(first in 1i32..=i32::MAX, second in 1i32..=i32::MAX) {
            let pidfile = PidFile::new("/run/prop.pid");
            let mut sys = MockSystem::new();
            prop_assert_eq!(pidfile.read_pid(&sys).unwrap(), None);

            sys.pid = first;
            pidfile.write_pid(&sys).unwrap();
            sys.pid = second;
            pidfile.write_pid(&sys).unwrap();

            prop_assert_eq!(pidfile.read_pid(&sys).unwrap(), Some(second));
        }

        /// remove never fails on a missing file, however often it is called
        #[test]
        fn remove_is_idempotent(times in 1usize..5) {
            let pidfile = PidFile::new("/run/prop.pid");
            let sys = MockSystem::new().with_file("/run/prop.pid", "1\n");
            for _ in 0..times {
                prop_assert!(pidfile.remove(&sys).is_ok());
            }
            prop_assert!(!pidfile.exists(&sys));
        }
    }
}
