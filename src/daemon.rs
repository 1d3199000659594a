use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::detach::{self, Detachment};
use crate::error::{DaemonError, DaemonResult};
use crate::pidfile::PidFile;
use crate::resource;
use crate::signal::{self, SignalMap};
use crate::stdio::{Redirect, StdStream, Stdio};
use crate::sys::{System, Unix};
use crate::types::{Group, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Open,
}

/// Stream and pidfile settings an application declares for itself.
///
/// Handed to [`DaemonContext::for_application`]; builder calls made afterwards
/// take precedence.
#[derive(Debug, Default)]
pub struct ApplicationDefaults {
    pub stdin: Option<Stdio>,
    pub stdout: Option<Stdio>,
    pub stderr: Option<Stdio>,
    pub pidfile: Option<PathBuf>,
}

/// Turns the current process into a daemon and tracks it through a PID file.
///
/// `start()` moves the context from closed to open, `stop()` back again.
/// Every OS call goes through `S`, the real [`Unix`] system unless replaced
/// with [`DaemonContext::with_system`].
pub struct DaemonContext<S: System = Unix> {
    pub(crate) pidfile: Option<PidFile>,
    pub(crate) stdin: Stdio,
    pub(crate) stdout: Stdio,
    pub(crate) stderr: Stdio,
    pub(crate) signal_map: SignalMap,
    pub(crate) working_directory: Option<PathBuf>,
    pub(crate) chroot_directory: Option<PathBuf>,
    pub(crate) umask: Option<u32>,
    pub(crate) user: Option<User>,
    pub(crate) group: Option<Group>,
    pub(crate) detach_process: bool,
    pub(crate) prevent_core: bool,
    pub(crate) stop_signal: i32,
    state: State,
    sys: S,
}

impl<S: System> fmt::Debug for DaemonContext<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DaemonContext")
            .field("pidfile", &self.pidfile)
            .field("stdin", &self.stdin)
            .field("stdout", &self.stdout)
            .field("stderr", &self.stderr)
            .field("signal_map", &self.signal_map)
            .field("working_directory", &self.working_directory)
            .field("chroot_directory", &self.chroot_directory)
            .field("umask", &self.umask)
            .field("user", &self.user)
            .field("group", &self.group)
            .field("detach_process", &self.detach_process)
            .field("prevent_core", &self.prevent_core)
            .field("stop_signal", &self.stop_signal)
            .field("state", &self.state)
            .finish()
    }
}

impl Default for DaemonContext<Unix> {
    fn default() -> Self {
        Self::new()
    }
}

impl DaemonContext<Unix> {
    /// Creates a closed context with the default configuration.
    ///
    /// # Defaults
    /// - No PID file
    /// - Stdio: `/dev/null`
    /// - Working directory: `/`
    /// - Umask: `0o027`
    /// - Signals: [`SignalMap::default`]
    /// - Detach and prevent core dumps: yes
    /// - Stop signal: `SIGTERM`
    pub fn new() -> Self {
        DaemonContext {
            pidfile: None,
            stdin: Stdio::devnull(),
            stdout: Stdio::devnull(),
            stderr: Stdio::devnull(),
            signal_map: SignalMap::default(),
            working_directory: Some(PathBuf::from("/")),
            chroot_directory: None,
            umask: Some(0o027),
            user: None,
            group: None,
            detach_process: true,
            prevent_core: true,
            stop_signal: libc::SIGTERM,
            state: State::Closed,
            sys: Unix,
        }
    }

    /// Creates a context seeded with the application's declared streams and pidfile.
    pub fn for_application(app: ApplicationDefaults) -> Self {
        let mut ctx = Self::new();
        if let Some(stdin) = app.stdin {
            ctx.stdin = stdin;
        }
        if let Some(stdout) = app.stdout {
            ctx.stdout = stdout;
        }
        if let Some(stderr) = app.stderr {
            ctx.stderr = stderr;
        }
        ctx.pidfile = app.pidfile.map(PidFile::new);
        ctx
    }
}

impl<S: System> DaemonContext<S> {
    // --- Public Getters ---

    /// True between a successful `start()` and the following `stop()`.
    pub fn is_open(&self) -> bool {
        self.state == State::Open
    }

    pub fn pidfile_path(&self) -> Option<&Path> {
        self.pidfile.as_ref().map(PidFile::path)
    }

    pub fn working_directory_path(&self) -> Option<&Path> {
        self.working_directory.as_deref()
    }

    pub fn signals(&self) -> &SignalMap {
        &self.signal_map
    }

    pub fn system(&self) -> &S {
        &self.sys
    }

    // --- Builder Methods ---

    /// Sets the path of the PID file.
    pub fn pidfile<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.pidfile = Some(PidFile::new(path));
        self
    }

    /// Configures the standard input stream.
    pub fn stdin<T: Into<Stdio>>(mut self, stdio: T) -> Self {
        self.stdin = stdio.into();
        self
    }

    /// Configures the standard output stream.
    pub fn stdout<T: Into<Stdio>>(mut self, stdio: T) -> Self {
        self.stdout = stdio.into();
        self
    }

    /// Configures the standard error stream.
    pub fn stderr<T: Into<Stdio>>(mut self, stdio: T) -> Self {
        self.stderr = stdio.into();
        self
    }

    pub fn signal_map(mut self, map: SignalMap) -> Self {
        self.signal_map = map;
        self
    }

    /// Sets the working directory, or `None` to stay where we are.
    pub fn working_directory<P: Into<PathBuf>>(mut self, path: Option<P>) -> Self {
        self.working_directory = path.map(Into::into);
        self
    }

    /// Changes the root directory before anything else in the environment.
    ///
    /// Relative pidfile and stream paths are made absolute against the
    /// directory `start()` is called from, but they are opened after the
    /// change of root, so they resolve inside the new root.
    pub fn chroot<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.chroot_directory = Some(path.into());
        self
    }

    pub fn umask(mut self, mask: Option<u32>) -> Self {
        self.umask = mask;
        self
    }

    /// Sets the user to run the daemon as (privilege dropping).
    pub fn user<U: Into<User>>(mut self, user: U) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Sets the group to run the daemon as.
    pub fn group<G: Into<Group>>(mut self, group: G) -> Self {
        self.group = Some(group.into());
        self
    }

    /// If `false`, skips the fork and session steps. See
    /// [`crate::detach_process_required`].
    pub fn detach_process(mut self, detach: bool) -> Self {
        self.detach_process = detach;
        self
    }

    pub fn prevent_core(mut self, prevent: bool) -> Self {
        self.prevent_core = prevent;
        self
    }

    /// Signal `stop()` sends to the recorded process.
    pub fn stop_signal(mut self, signal: i32) -> Self {
        self.stop_signal = signal;
        self
    }

    /// Swaps the OS backend, keeping the rest of the configuration.
    pub fn with_system<T: System>(self, sys: T) -> DaemonContext<T> {
        DaemonContext {
            pidfile: self.pidfile,
            stdin: self.stdin,
            stdout: self.stdout,
            stderr: self.stderr,
            signal_map: self.signal_map,
            working_directory: self.working_directory,
            chroot_directory: self.chroot_directory,
            umask: self.umask,
            user: self.user,
            group: self.group,
            detach_process: self.detach_process,
            prevent_core: self.prevent_core,
            stop_signal: self.stop_signal,
            state: self.state,
            sys,
        }
    }

    // --- Lifecycle ---

    /// Becomes the daemon.
    ///
    /// In order: refuses if the pidfile exists, detaches, applies the process
    /// environment, disables core dumps, installs the signal map, writes the
    /// pidfile and redirects stdin, stdout and stderr. Stream targets are
    /// opened before the pidfile is written, so a missing input file leaves
    /// no pidfile behind.
    ///
    /// Returns [`Detachment::Daemon`] in the surviving process. The
    /// intermediate parents exit inside this call; only a substituted system
    /// lets it return [`Detachment::Exited`], leaving the context closed.
    pub fn start(&mut self) -> DaemonResult<Detachment> {
        if self.is_open() {
            return Err(DaemonError::AlreadyOpen);
        }
        self.resolve_relative_paths()?;

        if let Some(pidfile) = &self.pidfile {
            pidfile.abort_if_existing(&self.sys)?;
        }
        // Find out before forking; afterwards there is no one to tell.
        if self.prevent_core {
            resource::core_dump_supported(&self.sys)?;
        }

        if self.detach_process {
            if let exited @ Detachment::Exited(_) = detach::detach(&self.sys) {
                return Ok(exited);
            }
        }

        self.apply_environment()?;
        if self.prevent_core {
            resource::prevent_core_dump(&self.sys)?;
        }
        signal::install(&self.sys, &self.signal_map)?;
        let redirects = self.open_streams()?;
        if let Some(pidfile) = &self.pidfile {
            pidfile.write_pid(&self.sys)?;
        }
        for redirect in redirects {
            redirect.apply(&self.sys)?;
        }

        self.state = State::Open;
        self.sys.notify_ready();
        info!(pid = self.sys.getpid(), "daemon context opened");
        Ok(Detachment::Daemon)
    }

    /// Terminates the recorded daemon and closes the context.
    ///
    /// When the pidfile records this very process, the file is removed and
    /// the context closed before the stop signal goes out, since the signal
    /// may end the process.
    pub fn stop(&mut self) -> DaemonResult<()> {
        if !self.is_open() {
            return Err(DaemonError::NotOpen);
        }
        let Some(pidfile) = self.pidfile.clone() else {
            self.sys.notify_stopping();
            self.close();
            return Ok(());
        };
        pidfile.abort_if_missing(&self.sys)?;
        let pid = pidfile.read_pid(&self.sys)?;
        self.sys.notify_stopping();

        match pid {
            Some(pid) if pid == self.sys.getpid() => {
                pidfile.remove(&self.sys)?;
                self.close();
                self.send_stop_signal(&pidfile, pid)
            }
            pid => {
                if let Some(pid) = pid {
                    self.send_stop_signal(&pidfile, pid)?;
                }
                pidfile.remove(&self.sys)?;
                self.close();
                Ok(())
            }
        }
    }

    /// Signals the process recorded in the pidfile and removes the file.
    ///
    /// Needs no prior `start()`, which makes it the entry point for a
    /// separate control process. A recorded process that no longer exists is
    /// treated as already stopped. Returns the pid that was read, if any.
    pub fn terminate_recorded(&self) -> DaemonResult<Option<i32>> {
        let Some(pidfile) = &self.pidfile else {
            return Ok(None);
        };
        pidfile.abort_if_missing(&self.sys)?;
        let pid = pidfile.read_pid(&self.sys)?;
        self.sys.notify_stopping();

        if let Some(pid) = pid {
            self.send_stop_signal(pidfile, pid)?;
        }
        pidfile.remove(&self.sys)?;
        Ok(pid)
    }

    fn send_stop_signal(&self, pidfile: &PidFile, pid: i32) -> DaemonResult<()> {
        match self.sys.kill(pid, self.stop_signal) {
            Ok(()) => {
                debug!(pid, signal = self.stop_signal, "signalled daemon");
                Ok(())
            }
            Err(err) if err.raw_os_error() == Some(libc::ESRCH) => {
                warn!(pid, path = %pidfile.path().display(), "stale pidfile, process already gone");
                Ok(())
            }
            Err(err) => Err(DaemonError::syscall("kill", err)),
        }
    }

    fn close(&mut self) {
        self.state = State::Closed;
        info!("daemon context closed");
    }

    // --- Steps ---

    /// Pins relative paths to the current directory, which `start()` may change.
    fn resolve_relative_paths(&mut self) -> DaemonResult<()> {
        let relative_pidfile = match &self.pidfile {
            Some(pidfile) if pidfile.path().is_relative() => Some(pidfile.path().to_path_buf()),
            _ => None,
        };
        if let Some(path) = relative_pidfile {
            self.pidfile = Some(PidFile::new(std::path::absolute(path)?));
        }
        for stdio in [&mut self.stdin, &mut self.stdout, &mut self.stderr] {
            if let Stdio::Path(path) = stdio {
                if path.is_relative() {
                    *path = std::path::absolute(&*path)?;
                }
            }
        }
        Ok(())
    }

    fn apply_environment(&self) -> DaemonResult<()> {
        if let Some(root) = &self.chroot_directory {
            self.sys.chroot(root).map_err(|err| {
                DaemonError::Privilege(format!("chroot to {} failed: {err}", root.display()))
            })?;
            if self.working_directory.is_none() {
                self.sys
                    .chdir(Path::new("/"))
                    .map_err(|err| DaemonError::syscall("chdir", err))?;
            }
        }
        if let Some(dir) = &self.working_directory {
            self.sys
                .chdir(dir)
                .map_err(|err| DaemonError::syscall("chdir", err))?;
        }
        if let Some(mask) = self.umask {
            self.sys.umask(mask);
        }

        // Group first: once the uid is dropped, setgid is no longer allowed.
        if let Some(group) = &self.group {
            let gid = self.resolve_group(group)?;
            self.sys.setgid(gid).map_err(|err| {
                DaemonError::Privilege(format!("failed to setgid({gid}): {err}"))
            })?;
        }
        if let Some(user) = &self.user {
            let uid = self.resolve_user(user)?;
            self.sys.setuid(uid).map_err(|err| {
                DaemonError::Privilege(format!("failed to setuid({uid}): {err}"))
            })?;
        }
        debug!("process environment applied");
        Ok(())
    }

    fn resolve_user(&self, user: &User) -> DaemonResult<u32> {
        match user {
            User::Id(uid) => Ok(*uid),
            User::Name(name) => self
                .sys
                .user_id(name)
                .ok_or_else(|| DaemonError::Privilege(format!("User '{name}' not found"))),
        }
    }

    fn resolve_group(&self, group: &Group) -> DaemonResult<u32> {
        match group {
            Group::Id(gid) => Ok(*gid),
            Group::Name(name) => self
                .sys
                .group_id(name)
                .ok_or_else(|| DaemonError::Privilege(format!("Group '{name}' not found"))),
        }
    }

    /// Opens the stdin, stdout and stderr targets, in that order.
    fn open_streams(&self) -> DaemonResult<Vec<Redirect<'_>>> {
        let mut redirects = Vec::with_capacity(StdStream::ALL.len());
        for (stream, stdio) in StdStream::ALL
            .into_iter()
            .zip([&self.stdin, &self.stdout, &self.stderr])
        {
            redirects.push(stdio.open_for(stream)?);
        }
        Ok(redirects)
    }
}
