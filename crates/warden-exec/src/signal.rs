//! Supervisor-level signal translation.
//!
//! A controller never simply forwards what it receives: stop requests are
//! escalated one step (a graceful request to the controller becomes `TERM` for
//! the service, a forceful one becomes `KILL`), job-control signals are
//! swallowed, and `HUP` is reserved for restarts.
use nix::{
    errno::Errno,
    sys::signal::{Signal, kill, killpg},
    unistd::Pid,
};

use crate::{ExecError, ExecResult};

/// What a controller does when it receives a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// Look at child state; nothing is sent.
    Inspect,
    /// Restart the service.
    Restart,
    /// Stop the service by sending it the given signal.
    Stop(Signal),
    /// Pass the signal to the service unchanged.
    Forward(Signal),
    /// Do nothing.
    Ignore,
}

/// Signals a controller installs handlers for.
///
/// `KILL` and `STOP` cannot be caught; every other entry maps through [`signal_action`].
pub const SUPERVISED_SIGNALS: [Signal; 13] = [
    Signal::SIGHUP,
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGTERM,
    Signal::SIGUSR1,
    Signal::SIGUSR2,
    Signal::SIGALRM,
    Signal::SIGWINCH,
    Signal::SIGCHLD,
    Signal::SIGCONT,
    Signal::SIGTSTP,
    Signal::SIGTTIN,
    Signal::SIGTTOU,
];

/// Translation table from a signal received by the controller to its action.
pub fn signal_action(sig: Signal) -> SignalAction {
    match sig {
        Signal::SIGCHLD => SignalAction::Inspect,
        Signal::SIGHUP => SignalAction::Restart,
        Signal::SIGQUIT | Signal::SIGINT => SignalAction::Stop(Signal::SIGTERM),
        Signal::SIGTERM => SignalAction::Stop(Signal::SIGKILL),
        Signal::SIGSTOP | Signal::SIGTSTP | Signal::SIGCONT => SignalAction::Ignore,
        other => SignalAction::Forward(other),
    }
}

fn checked_pid(pid: i32) -> ExecResult<Pid> {
    if pid <= 1 {
        return Err(ExecError::InvalidPid(pid));
    }
    Ok(Pid::from_raw(pid))
}

/// Send `sig` to a single process. A process that is already gone is not an error.
pub fn send_signal(pid: i32, sig: Signal) -> ExecResult<()> {
    match kill(checked_pid(pid)?, sig) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(ExecError::Signal {
            pid,
            reason: e.to_string(),
        }),
    }
}

/// Send `sig` to every process of group `pgid`. An empty group is not an error.
pub fn kill_group(pgid: i32, sig: Signal) -> ExecResult<()> {
    match killpg(checked_pid(pgid)?, sig) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(ExecError::Signal {
            pid: pgid,
            reason: e.to_string(),
        }),
    }
}
