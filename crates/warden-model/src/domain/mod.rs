mod env;
pub use env::{BASELINE_PATH, Env};

mod constants;
pub use constants::*;

/// Timeout value in seconds.
///
/// Used by service definitions and monitor configuration; `0` means "no timeout".
pub type TimeoutSecs = u64;
