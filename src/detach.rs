use std::fmt;
use std::io;

use tracing::{debug, error};

use crate::sys::{Fork, System};

/// Exit status of a parent that forked successfully.
pub const EXIT_PARENT: i32 = 0;
/// Exit status of a process whose fork or setsid failed.
pub const EXIT_FAILURE: i32 = 1;

/// What the calling process must do after detaching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Detachment {
    /// This process is the daemon and carries on.
    Daemon,
    /// This process has been told to exit with the given status.
    ///
    /// With the real system the process is already gone; the value is only
    /// ever observed with a substituted [`System`].
    Exited(i32),
}

impl Detachment {
    pub fn is_daemon(self) -> bool {
        self == Detachment::Daemon
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkStage {
    First,
    Second,
}

impl fmt::Display for ForkStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForkStage::First => f.write_str("fork #1"),
            ForkStage::Second => f.write_str("fork #2"),
        }
    }
}

/// Detaches the calling process from its terminal with the double-fork
/// protocol: fork, `setsid`, fork again.
///
/// Both intermediate parents exit with [`EXIT_PARENT`]. A failed fork (or
/// `setsid`) writes `"<step> failed: (<errno>) <message>"` to stderr and exits
/// with [`EXIT_FAILURE`]. The survivor is not a process-group leader and,
/// since it is not a session leader either, can never reacquire a
/// controlling terminal.
pub fn detach<S: System + ?Sized>(sys: &S) -> Detachment {
    if let Some(exited) = fork_and_exit_parent(sys, ForkStage::First) {
        return exited;
    }

    if let Err(err) = sys.setsid() {
        return fail(sys, "setsid", &err);
    }
    debug!("became session leader");

    if let Some(exited) = fork_and_exit_parent(sys, ForkStage::Second) {
        return exited;
    }

    debug!(pid = sys.getpid(), "detached from controlling terminal");
    Detachment::Daemon
}

fn fork_and_exit_parent<S: System + ?Sized>(sys: &S, stage: ForkStage) -> Option<Detachment> {
    match sys.fork() {
        Ok(Fork::Child) => None,
        Ok(Fork::Parent(child)) => {
            debug!(%stage, child, "parent exiting after fork");
            sys.exit(EXIT_PARENT);
            Some(Detachment::Exited(EXIT_PARENT))
        }
        Err(err) => Some(fail(sys, &stage.to_string(), &err)),
    }
}

fn fail<S: System + ?Sized>(sys: &S, step: &str, err: &io::Error) -> Detachment {
    let errno = err.raw_os_error().unwrap_or(0);
    error!(step, errno, %err, "daemon detachment failed");
    sys.write_stderr(&format!("{step} failed: ({errno}) {err}"));
    sys.exit(EXIT_FAILURE);
    Detachment::Exited(EXIT_FAILURE)
}

/// Whether detaching makes sense for this process.
///
/// Returns false when a supervisor already handles it: systemd
/// (`NOTIFY_SOCKET` is set) or any process started directly by init.
pub fn detach_process_required() -> bool {
    if std::env::var_os("NOTIFY_SOCKET").is_some() {
        return false;
    }
    std::os::unix::process::parent_id() != 1
}
