//! File-backed coordination primitives shared by every warden process.
//!
//! - [`KvStore`]: one file per key, no locking, last write wins.
//! - [`Gate`]: one-shot barrier released by unlinking a sentinel file.
//! - [`KvWatch`]: live stream of mutations of a [`KvStore`] directory.
mod error;
pub use error::{StoreError, StoreResult};

mod kv;
pub use kv::KvStore;

mod gate;
pub use gate::{Gate, await_gate};

mod watch;
pub use watch::{KvChange, KvWatch};
