use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Error type for daemon context operations.
///
/// Fork failures never show up here: the failing process reports to stderr
/// and exits with status 1 (see [`crate::Detachment`]).
#[derive(Debug, Error)]
pub enum DaemonError {
    /// A PID file is already present, so another instance is assumed to be running.
    #[error("daemon already running: pidfile {} exists{}", .path.display(), fmt_pid(.pid))]
    AlreadyRunning { path: PathBuf, pid: Option<i32> },

    /// No PID file is present, so there is nothing to stop.
    #[error("daemon not running: pidfile {} does not exist", .path.display())]
    NotRunning { path: PathBuf },

    /// `start()` was called on a context that is already open.
    #[error("daemon context is already open")]
    AlreadyOpen,

    /// `stop()` was called on a context that is not open.
    #[error("daemon context is not open")]
    NotOpen,

    /// The platform exposes no core-dump resource limit.
    #[error("configuration error: platform does not support limiting core dumps")]
    CoreDumpUnsupported,

    /// The PID file exists but does not start with a decimal process id.
    #[error("invalid pidfile {}: {content:?} is not a process id", .path.display())]
    InvalidPidFile { path: PathBuf, content: String },

    /// A system call failed.
    #[error("syscall '{call}' failed: {source}")]
    Syscall {
        call: &'static str,
        #[source]
        source: io::Error,
    },

    /// Failed to change root, user or group.
    #[error("privilege error: {0}")]
    Privilege(String),

    /// A signal disposition could not be installed.
    #[error("failed to install handler for signal {signal}: {source}")]
    Signal {
        signal: i32,
        #[source]
        source: io::Error,
    },

    /// Standard IO errors (PID file, stream targets).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl DaemonError {
    pub(crate) fn syscall(call: &'static str, source: io::Error) -> Self {
        DaemonError::Syscall { call, source }
    }

    /// Raw OS error number carried by this error, if any.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            DaemonError::Io(err)
            | DaemonError::Syscall { source: err, .. }
            | DaemonError::Signal { source: err, .. } => err.raw_os_error(),
            _ => None,
        }
    }
}

fn fmt_pid(pid: &Option<i32>) -> String {
    match pid {
        Some(pid) => format!(" (pid {pid})"),
        None => String::new(),
    }
}

/// A specialized Result type for daemon context operations.
pub type DaemonResult<T> = Result<T, DaemonError>;
