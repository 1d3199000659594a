//! # daemon_context
//!
//! Turns the running process into a well-behaved Unix daemon: double-fork
//! detachment from the terminal, an advisory PID file, redirected standard
//! streams and disabled core dumps, sequenced by [`DaemonContext`].
//!
//! ```no_run
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use std::sync::Arc;
//!
//! use daemon_context::{DaemonContext, Detachment, SignalAction, SignalMap};
//!
//! # fn main() -> daemon_context::DaemonResult<()> {
//! let term = Arc::new(AtomicBool::new(false));
//! let flag = Arc::clone(&term);
//! let mut signals = SignalMap::default();
//! signals.insert(
//!     libc::SIGTERM,
//!     SignalAction::handler(move || flag.store(true, Ordering::Relaxed)),
//! );
//!
//! let mut ctx = DaemonContext::new()
//!     .pidfile("/var/run/ticker.pid")
//!     .signal_map(signals);
//!
//! if ctx.start()? == Detachment::Daemon {
//!     while !term.load(Ordering::Relaxed) {
//!         // daemon work
//!     }
//!     ctx.stop()?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! The crate logs through `tracing` and never installs a subscriber.

#[cfg(not(unix))]
compile_error!("daemon_context only supports Unix platforms");

mod daemon;
mod detach;
mod error;
mod pidfile;
mod resource;
mod signal;
mod stdio;
mod sys;
mod types;

// Re-export public types to keeping the API flat
pub use daemon::{ApplicationDefaults, DaemonContext};
pub use detach::{
    detach, detach_process_required, Detachment, ForkStage, EXIT_FAILURE, EXIT_PARENT,
};
pub use error::{DaemonError, DaemonResult};
pub use pidfile::PidFile;
pub use resource::{core_dump_supported, prevent_core_dump};
pub use signal::{install as install_signal_map, SignalAction, SignalMap};
pub use stdio::{redirect_stream, StdStream, Stdio};
pub use sys::{Fork, RLimit, System, Unix};
pub use types::{Group, User};
