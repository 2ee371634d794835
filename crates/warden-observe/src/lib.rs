//! Logging setup shared by every warden process.
//!
//! All output goes to stderr: stdout belongs to command results (`status`
//! reports, `monitor` records), and the detached controller loop has its
//! stderr appended to the per-state-directory log file.
mod logger;
pub use logger::*;
