use std::ffi::CString;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::RawFd;
use std::path::Path;

#[cfg(target_os = "linux")]
use sd_notify::NotifyState;

use super::{Fork, RLimit, System};
use crate::signal::SignalAction;

/// The real thing: `libc` syscalls, `signal-hook` handlers and `sd-notify`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unix;

fn check(ret: libc::c_int) -> io::Result<()> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

fn c_path(path: &Path) -> io::Result<CString> {
    CString::new(path.as_os_str().as_bytes()).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidInput, "path contains a NUL byte")
    })
}

/// Running under systemd with `Type=notify`.
#[cfg(target_os = "linux")]
fn under_systemd() -> bool {
    std::env::var_os("NOTIFY_SOCKET").is_some()
}

impl System for Unix {
    fn fork(&self) -> io::Result<Fork> {
        // SAFETY: the daemon context is driven from a single thread; the child
        // only continues running Rust code owned by that thread.
        match unsafe { libc::fork() } {
            pid if pid < 0 => Err(io::Error::last_os_error()),
            0 => Ok(Fork::Child),
            pid => Ok(Fork::Parent(pid)),
        }
    }

    fn setsid(&self) -> io::Result<()> {
        check(unsafe { libc::setsid() })
    }

    fn exit(&self, status: i32) {
        std::process::exit(status)
    }

    fn write_stderr(&self, line: &str) {
        let mut stderr = io::stderr().lock();
        let _ = writeln!(stderr, "{line}");
        let _ = stderr.flush();
    }

    fn dup2(&self, src: RawFd, dst: RawFd) -> io::Result<()> {
        check(unsafe { libc::dup2(src, dst) })
    }

    fn get_core_limit(&self) -> io::Result<RLimit> {
        let mut limit = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        check(unsafe { libc::getrlimit(libc::RLIMIT_CORE, &mut limit) })?;
        Ok(RLimit {
            soft: limit.rlim_cur as u64,
            hard: limit.rlim_max as u64,
        })
    }

    fn set_core_limit(&self, limit: RLimit) -> io::Result<()> {
        let limit = libc::rlimit {
            rlim_cur: limit.soft as libc::rlim_t,
            rlim_max: limit.hard as libc::rlim_t,
        };
        check(unsafe { libc::setrlimit(libc::RLIMIT_CORE, &limit) })
    }

    fn chroot(&self, path: &Path) -> io::Result<()> {
        let root = c_path(path)?;
        check(unsafe { libc::chroot(root.as_ptr()) })
    }

    fn chdir(&self, path: &Path) -> io::Result<()> {
        std::env::set_current_dir(path)
    }

    fn umask(&self, mask: u32) {
        unsafe { libc::umask(mask as libc::mode_t) };
    }

    fn user_id(&self, name: &str) -> Option<u32> {
        let cname = CString::new(name).ok()?;
        let pwd = unsafe { libc::getpwnam(cname.as_ptr()) };
        if pwd.is_null() {
            None
        } else {
            Some(unsafe { (*pwd).pw_uid })
        }
    }

    fn group_id(&self, name: &str) -> Option<u32> {
        let cname = CString::new(name).ok()?;
        let grp = unsafe { libc::getgrnam(cname.as_ptr()) };
        if grp.is_null() {
            None
        } else {
            Some(unsafe { (*grp).gr_gid })
        }
    }

    fn setgid(&self, gid: u32) -> io::Result<()> {
        check(unsafe { libc::setgid(gid as libc::gid_t) })
    }

    fn setuid(&self, uid: u32) -> io::Result<()> {
        check(unsafe { libc::setuid(uid as libc::uid_t) })
    }

    fn getpid(&self) -> i32 {
        std::process::id() as i32
    }

    fn kill(&self, pid: i32, signal: i32) -> io::Result<()> {
        check(unsafe { libc::kill(pid, signal) })
    }

    fn install_signal(&self, signal: i32, action: &SignalAction) -> io::Result<()> {
        match action {
            SignalAction::Ignore => set_disposition(signal, libc::SIG_IGN),
            SignalAction::Default => set_disposition(signal, libc::SIG_DFL),
            SignalAction::Handler(handler) => {
                // signal-hook panics on these instead of failing.
                if signal_hook::consts::FORBIDDEN.contains(&signal) {
                    return Err(io::Error::from_raw_os_error(libc::EINVAL));
                }
                let handler = handler.clone();
                // SAFETY: handlers are documented to be async-signal-safe.
                unsafe { signal_hook::low_level::register(signal, move || handler()) }?;
                Ok(())
            }
        }
    }

    fn path_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_file(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.write_all(contents)?;
        file.flush()?;
        file.sync_all()
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn notify_ready(&self) {
        #[cfg(target_os = "linux")]
        {
            if under_systemd() {
                let _ = sd_notify::notify(false, &[NotifyState::Ready]);
            }
        }
    }

    fn notify_stopping(&self) {
        #[cfg(target_os = "linux")]
        {
            if under_systemd() {
                let _ = sd_notify::notify(false, &[NotifyState::Stopping]);
            }
        }
    }
}

fn set_disposition(signal: i32, disposition: libc::sighandler_t) -> io::Result<()> {
    if unsafe { libc::signal(signal, disposition) } == libc::SIG_ERR {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}
