//! Core-dump suppression through `RLIMIT_CORE`.

use tracing::debug;

use crate::error::{DaemonError, DaemonResult};
use crate::sys::{RLimit, System};

/// Reads the current core-dump limit, failing with
/// [`DaemonError::CoreDumpUnsupported`] if the platform has none.
///
/// This is the read-only half of [`prevent_core_dump`]; it never changes
/// anything, so it is safe to call before forking.
pub fn core_dump_supported<S: System + ?Sized>(sys: &S) -> DaemonResult<RLimit> {
    sys.get_core_limit().map_err(|err| match err.raw_os_error() {
        Some(libc::EINVAL) | Some(libc::ENOSYS) => DaemonError::CoreDumpUnsupported,
        _ => DaemonError::syscall("getrlimit", err),
    })
}

/// Sets both the soft and hard core-dump limits to zero.
///
/// The current limit is always read first, so a platform without the
/// resource is reported instead of silently accepted.
pub fn prevent_core_dump<S: System + ?Sized>(sys: &S) -> DaemonResult<()> {
    let previous = core_dump_supported(sys)?;
    sys.set_core_limit(RLimit::ZERO)
        .map_err(|err| DaemonError::syscall("setrlimit", err))?;
    debug!(
        previous_soft = previous.soft,
        previous_hard = previous.hard,
        "core dumps disabled"
    );
    Ok(())
}
