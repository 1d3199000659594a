use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::{AsRawFd, IntoRawFd, RawFd};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{DaemonError, DaemonResult};
use crate::sys::System;

const DEV_NULL: &str = "/dev/null";

/// Where one of the standard streams goes once the daemon is running.
#[derive(Debug)]
pub enum Stdio {
    /// Redirects the stream to `/dev/null`. Default option.
    Devnull,
    /// Redirects the stream to an already open file.
    File(File),
    /// Opens the path when the context starts: read-only for stdin,
    /// create + append for stdout and stderr.
    Path(PathBuf),
    /// Keeps the original stream (useful for debugging, but not recommended for production).
    Keep,
}

impl Stdio {
    pub fn devnull() -> Self {
        Stdio::Devnull
    }

    /// Opens (or borrows) the descriptor `stream` will be pointed at.
    ///
    /// Nothing is redirected yet; see [`Redirect::apply`].
    pub(crate) fn open_for(&self, stream: StdStream) -> io::Result<Redirect<'_>> {
        let target = match self {
            Stdio::Keep => None,
            Stdio::File(file) => Some(Target::Borrowed(file)),
            Stdio::Devnull => Some(Target::Opened(
                OpenOptions::new().read(true).write(true).open(DEV_NULL)?,
            )),
            Stdio::Path(path) => Some(Target::Opened(stream.open_options().open(path)?)),
        };
        Ok(Redirect { stream, target })
    }
}

impl Default for Stdio {
    fn default() -> Self {
        Stdio::Devnull
    }
}

impl From<File> for Stdio {
    fn from(f: File) -> Self {
        Stdio::File(f)
    }
}

impl From<PathBuf> for Stdio {
    fn from(path: PathBuf) -> Self {
        Stdio::Path(path)
    }
}

impl From<&Path> for Stdio {
    fn from(path: &Path) -> Self {
        Stdio::Path(path.to_path_buf())
    }
}

enum Target<'a> {
    Borrowed(&'a File),
    Opened(File),
}

impl Target<'_> {
    fn as_raw_fd(&self) -> RawFd {
        match self {
            Target::Borrowed(file) => file.as_raw_fd(),
            Target::Opened(file) => file.as_raw_fd(),
        }
    }
}

/// One of the three standard streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdStream {
    Stdin,
    Stdout,
    Stderr,
}

impl StdStream {
    /// Redirection order used by the daemon context.
    pub const ALL: [StdStream; 3] = [StdStream::Stdin, StdStream::Stdout, StdStream::Stderr];

    pub fn fd(self) -> RawFd {
        match self {
            StdStream::Stdin => libc::STDIN_FILENO,
            StdStream::Stdout => libc::STDOUT_FILENO,
            StdStream::Stderr => libc::STDERR_FILENO,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            StdStream::Stdin => "stdin",
            StdStream::Stdout => "stdout",
            StdStream::Stderr => "stderr",
        }
    }

    fn open_options(self) -> OpenOptions {
        let mut options = OpenOptions::new();
        match self {
            StdStream::Stdin => options.read(true),
            StdStream::Stdout | StdStream::Stderr => options.create(true).append(true),
        };
        options
    }
}

/// Duplicates `target_fd` onto the standard descriptor of `stream`.
pub fn redirect_stream<S: System + ?Sized>(
    sys: &S,
    stream: StdStream,
    target_fd: RawFd,
) -> DaemonResult<()> {
    sys.dup2(target_fd, stream.fd())
        .map_err(|err| DaemonError::syscall("dup2", err))?;
    debug!(stream = stream.name(), target_fd, "redirected standard stream");
    Ok(())
}

/// A standard stream paired with its already opened target.
pub(crate) struct Redirect<'a> {
    stream: StdStream,
    target: Option<Target<'a>>,
}

impl Redirect<'_> {
    /// Points the stream at its target. A kept stream is left alone.
    pub(crate) fn apply<S: System + ?Sized>(self, sys: &S) -> DaemonResult<()> {
        let Some(target) = self.target else {
            return Ok(());
        };
        let target_fd = target.as_raw_fd();
        redirect_stream(sys, self.stream, target_fd)?;

        // If the open landed on the standard descriptor itself (it was closed),
        // dropping the File would close the stream we just set up.
        if target_fd == self.stream.fd() {
            if let Target::Opened(file) = target {
                let _ = file.into_raw_fd();
            }
        }
        Ok(())
    }
}
