//! Recording [`System`] double for unit tests.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};

use super::{Fork, RLimit, System};
use crate::signal::SignalAction;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Fork,
    Setsid,
    Exit(i32),
    Dup2 { src: RawFd, dst: RawFd },
    GetCoreLimit,
    SetCoreLimit(RLimit),
    Chroot(PathBuf),
    Chdir(PathBuf),
    Umask(u32),
    Setgid(u32),
    Setuid(u32),
    Kill { pid: i32, signal: i32 },
    InstallSignal { signal: i32, action: &'static str },
    PathExists(PathBuf),
    ReadFile(PathBuf),
    WriteFile(PathBuf),
    RemoveFile(PathBuf),
    NotifyReady,
    NotifyStopping,
}

pub(crate) struct MockSystem {
    pub pid: i32,
    pub forks: RefCell<VecDeque<io::Result<Fork>>>,
    pub setsid_error: Option<i32>,
    pub core_limit_error: Option<i32>,
    pub kill_error: Option<i32>,
    pub remove_error: Option<i32>,
    pub users: HashMap<String, u32>,
    pub groups: HashMap<String, u32>,
    pub files: RefCell<HashMap<PathBuf, String>>,
    pub stderr: RefCell<String>,
    calls: RefCell<Vec<Call>>,
}

impl MockSystem {
    pub fn new() -> Self {
        MockSystem {
            pid: 235,
            forks: RefCell::new(VecDeque::new()),
            setsid_error: None,
            core_limit_error: None,
            kill_error: None,
            remove_error: None,
            users: HashMap::new(),
            groups: HashMap::new(),
            files: RefCell::new(HashMap::new()),
            stderr: RefCell::new(String::new()),
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Scripts the results of successive `fork()` calls; unscripted forks
    /// return `Fork::Child`.
    pub fn with_forks(self, forks: Vec<io::Result<Fork>>) -> Self {
        *self.forks.borrow_mut() = forks.into();
        self
    }

    pub fn with_file(self, path: impl Into<PathBuf>, contents: &str) -> Self {
        self.files
            .borrow_mut()
            .insert(path.into(), contents.to_owned());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn file(&self, path: &Path) -> Option<String> {
        self.files.borrow().get(path).cloned()
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }
}

fn errno(code: Option<i32>) -> io::Result<()> {
    match code {
        Some(code) => Err(io::Error::from_raw_os_error(code)),
        None => Ok(()),
    }
}

impl System for MockSystem {
    fn fork(&self) -> io::Result<Fork> {
        self.record(Call::Fork);
        self.forks.borrow_mut().pop_front().unwrap_or(Ok(Fork::Child))
    }

    fn setsid(&self) -> io::Result<()> {
        self.record(Call::Setsid);
        errno(self.setsid_error)
    }

    fn exit(&self, status: i32) {
        self.record(Call::Exit(status));
    }

    fn write_stderr(&self, line: &str) {
        let mut stderr = self.stderr.borrow_mut();
        stderr.push_str(line);
        stderr.push('\n');
    }

    fn dup2(&self, src: RawFd, dst: RawFd) -> io::Result<()> {
        self.record(Call::Dup2 { src, dst });
        Ok(())
    }

    fn get_core_limit(&self) -> io::Result<RLimit> {
        self.record(Call::GetCoreLimit);
        errno(self.core_limit_error)?;
        Ok(RLimit {
            soft: 0,
            hard: u64::MAX,
        })
    }

    fn set_core_limit(&self, limit: RLimit) -> io::Result<()> {
        self.record(Call::SetCoreLimit(limit));
        Ok(())
    }

    fn chroot(&self, path: &Path) -> io::Result<()> {
        self.record(Call::Chroot(path.to_path_buf()));
        Ok(())
    }

    fn chdir(&self, path: &Path) -> io::Result<()> {
        self.record(Call::Chdir(path.to_path_buf()));
        Ok(())
    }

    fn umask(&self, mask: u32) {
        self.record(Call::Umask(mask));
    }

    fn user_id(&self, name: &str) -> Option<u32> {
        self.users.get(name).copied()
    }

    fn group_id(&self, name: &str) -> Option<u32> {
        self.groups.get(name).copied()
    }

    fn setgid(&self, gid: u32) -> io::Result<()> {
        self.record(Call::Setgid(gid));
        Ok(())
    }

    fn setuid(&self, uid: u32) -> io::Result<()> {
        self.record(Call::Setuid(uid));
        Ok(())
    }

    fn getpid(&self) -> i32 {
        self.pid
    }

    fn kill(&self, pid: i32, signal: i32) -> io::Result<()> {
        self.record(Call::Kill { pid, signal });
        errno(self.kill_error)
    }

    fn install_signal(&self, signal: i32, action: &SignalAction) -> io::Result<()> {
        let action = match action {
            SignalAction::Ignore => "ignore",
            SignalAction::Default => "default",
            SignalAction::Handler(_) => "handler",
        };
        self.record(Call::InstallSignal { signal, action });
        Ok(())
    }

    fn path_exists(&self, path: &Path) -> bool {
        self.record(Call::PathExists(path.to_path_buf()));
        self.files.borrow().contains_key(path)
    }

    fn read_file(&self, path: &Path) -> io::Result<String> {
        self.record(Call::ReadFile(path.to_path_buf()));
        self.files
            .borrow()
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::from_raw_os_error(libc::ENOENT))
    }

    fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        self.record(Call::WriteFile(path.to_path_buf()));
        let contents = String::from_utf8_lossy(contents).into_owned();
        self.files.borrow_mut().insert(path.to_path_buf(), contents);
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        self.record(Call::RemoveFile(path.to_path_buf()));
        errno(self.remove_error)?;
        match self.files.borrow_mut().remove(path) {
            Some(_) => Ok(()),
            None => Err(io::Error::from_raw_os_error(libc::ENOENT)),
        }
    }

    fn notify_ready(&self) {
        self.record(Call::NotifyReady);
    }

    fn notify_stopping(&self) {
        self.record(Call::NotifyStopping);
    }
}
