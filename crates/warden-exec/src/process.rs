use std::{
    io,
    os::fd::{FromRawFd, OwnedFd, RawFd},
    time::Duration,
};

use nix::{
    errno::Errno,
    sys::signal::kill,
    unistd::{Pid, getpgid},
};
use tokio::io::{Interest, unix::AsyncFd};
use tracing::{trace, warn};

use crate::{ExecError, ExecResult};

/// Poll interval of the degraded exit-wait path (kernels without pidfd).
const LIVENESS_POLL: Duration = Duration::from_millis(200);

/// Returns `true` if a process with this PID exists and has not exited.
///
/// A zombie (exited, not yet reaped) counts as dead.
pub fn is_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    match kill(Pid::from_raw(pid), None) {
        Ok(()) | Err(Errno::EPERM) => !is_zombie(pid),
        Err(_) => false,
    }
}

fn is_zombie(pid: i32) -> bool {
    // The command name may contain spaces and parens; the state follows the last ')'.
    std::fs::read_to_string(format!("/proc/{pid}/stat"))
        .ok()
        .and_then(|stat| {
            stat.rsplit_once(')')
                .map(|(_, rest)| rest.trim_start().starts_with('Z'))
        })
        .unwrap_or(false)
}

/// Process group of `pid`, if the process exists.
pub fn process_group_of(pid: i32) -> Option<i32> {
    if pid <= 0 {
        return None;
    }
    getpgid(Some(Pid::from_raw(pid))).ok().map(Pid::as_raw)
}

/// Wait until the process `pid` has exited.
///
/// The process does not have to be a child of the caller. Uses a pidfd, which
/// becomes readable when the process terminates; falls back to liveness
/// polling when the kernel lacks `pidfd_open`.
pub async fn wait_for_exit(pid: i32) -> ExecResult<()> {
    if pid <= 0 {
        return Err(ExecError::InvalidPid(pid));
    }

    let fd = match pidfd_open(pid) {
        Ok(fd) => fd,
        Err(e) if e.raw_os_error() == Some(libc::ESRCH) => return Ok(()),
        Err(e) => {
            warn!(pid, error = %e, "pidfd unavailable, polling for process exit");
            while is_alive(pid) {
                tokio::time::sleep(LIVENESS_POLL).await;
            }
            return Ok(());
        }
    };

    let fd = AsyncFd::with_interest(fd, Interest::READABLE)?;
    let _ready = fd.readable().await?;
    trace!(pid, "process exited");
    Ok(())
}

fn pidfd_open(pid: i32) -> io::Result<OwnedFd> {
    let fd = unsafe { libc::syscall(libc::SYS_pidfd_open, pid, 0) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(unsafe { OwnedFd::from_raw_fd(fd as RawFd) })
}
