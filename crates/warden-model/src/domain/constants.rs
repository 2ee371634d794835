//! Well-known KV keys of a controller record.

/// Stable controller identifier.
pub const KEY_NAME: &str = "name";
/// Current [`crate::ControllerStatus`], the single source of truth.
pub const KEY_STATUS: &str = "status";
/// Boot id recorded by the controller loop.
pub const KEY_BOOTID: &str = "bootid";
/// PID of the controller loop.
pub const KEY_CNTRLPID: &str = "cntrlpid";
/// Process group of the controller loop.
pub const KEY_CNTRLPGID: &str = "cntrlpgid";
/// PID of the managed service. Its creation means "service has spawned".
pub const KEY_SVCPID: &str = "svcpid";
/// Human-readable cause, present only in the `error` state.
pub const KEY_ERROR: &str = "error";
/// Exit code of the service, present only in `complete,fail`.
pub const KEY_RC: &str = "rc";

/// Keys written by a running controller loop.
///
/// Cleared before every (re)spawn so that watchers never act on a previous run's PIDs.
pub const RUNTIME_KEYS: [&str; 5] = [KEY_CNTRLPID, KEY_CNTRLPGID, KEY_SVCPID, KEY_RC, KEY_ERROR];
