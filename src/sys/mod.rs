//! Process-global OS operations behind a single trait.
//!
//! Everything that forks, changes the descriptor table, touches resource
//! limits or reads/writes the PID file goes through [`System`], so the
//! orchestration code can be driven by a recording double in tests.

use std::io;
use std::os::unix::io::RawFd;
use std::path::Path;

use crate::signal::SignalAction;

pub mod unix;

#[cfg(test)]
pub(crate) mod mock;

pub use unix::Unix;

/// Outcome of a successful `fork()` as seen by the calling process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fork {
    /// We are the parent; carries the child's pid.
    Parent(i32),
    Child,
}

/// Soft and hard values of a resource limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RLimit {
    pub soft: u64,
    pub hard: u64,
}

impl RLimit {
    pub const ZERO: RLimit = RLimit { soft: 0, hard: 0 };
}

/// The OS capabilities a daemon context depends on.
///
/// `exit` is not declared diverging: the real implementation never returns,
/// test doubles record the call and return so the caller can observe it.
pub trait System {
    fn fork(&self) -> io::Result<Fork>;
    fn setsid(&self) -> io::Result<()>;
    fn exit(&self, status: i32);
    /// Writes one diagnostic line to the process's error stream.
    fn write_stderr(&self, line: &str);

    fn dup2(&self, src: RawFd, dst: RawFd) -> io::Result<()>;

    fn get_core_limit(&self) -> io::Result<RLimit>;
    fn set_core_limit(&self, limit: RLimit) -> io::Result<()>;

    fn chroot(&self, path: &Path) -> io::Result<()>;
    fn chdir(&self, path: &Path) -> io::Result<()>;
    fn umask(&self, mask: u32);
    fn user_id(&self, name: &str) -> Option<u32>;
    fn group_id(&self, name: &str) -> Option<u32>;
    fn setgid(&self, gid: u32) -> io::Result<()>;
    fn setuid(&self, uid: u32) -> io::Result<()>;

    fn getpid(&self) -> i32;
    fn kill(&self, pid: i32, signal: i32) -> io::Result<()>;
    fn install_signal(&self, signal: i32, action: &SignalAction) -> io::Result<()>;

    fn path_exists(&self, path: &Path) -> bool;
    fn read_file(&self, path: &Path) -> io::Result<String>;
    /// Creates or truncates `path`, writes `contents` and flushes it to disk.
    fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()>;
    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Tells a supervising service manager the daemon is up, if there is one.
    fn notify_ready(&self);
    fn notify_stopping(&self);
}
