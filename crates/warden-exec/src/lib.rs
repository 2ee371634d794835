//! Process primitives of the warden controller.
//!
//! Everything here talks to the kernel directly: building a closed exec
//! invocation, detaching into a new session, translating and delivering
//! signals, and waiting for arbitrary (non-child) processes to exit.
mod error;
pub use error::{ExecError, ExecResult};

mod plan;
pub use plan::ExecPlan;

mod spawn;
pub use spawn::{spawn_detached, spawn_gated};

mod signal;
pub use signal::{SUPERVISED_SIGNALS, SignalAction, kill_group, send_signal, signal_action};

mod process;
pub use process::{is_alive, process_group_of, wait_for_exit};

mod bootid;
pub use bootid::{boot_id, boot_id_from_stat};

pub use nix::sys::signal::Signal;
