//! Caller-facing operations on one controller: `up`, `down`, `status`, `purge`.
//!
//! Every operation runs in the caller's process and talks to the controller
//! loop only through the state directory and signals.
mod down;
pub use down::DownOutcome;

mod purge;

mod status;
pub use status::{Condition, StatusReport};

mod up;
pub use up::UpOutcome;

use warden_exec::boot_id;
use warden_model::{ControllerRecord, ControllerStatus, KEY_STATUS};
use warden_store::KvStore;

use crate::{config::WardenConfig, error::CoreResult, paths::StateDir};

/// Handle on one controller's state directory.
#[derive(Debug, Clone)]
pub struct Controller {
    state: StateDir,
    config: WardenConfig,
}

impl Controller {
    pub fn new(state: StateDir, config: WardenConfig) -> Self {
        Self { state, config }
    }

    pub fn state(&self) -> &StateDir {
        &self.state
    }

    pub fn config(&self) -> &WardenConfig {
        &self.config
    }

    fn store(&self) -> KvStore {
        self.state.store()
    }

    /// Current KV contents as a typed record.
    pub fn record(&self) -> CoreResult<ControllerRecord> {
        let snapshot = self.store().snapshot()?;
        Ok(ControllerRecord::from_entries(
            snapshot.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        )?)
    }

    fn current_status(&self) -> CoreResult<Option<ControllerStatus>> {
        Ok(self
            .store()
            .get_opt(KEY_STATUS)?
            .map(|s| s.parse())
            .transpose()?)
    }

    fn current_boot(&self) -> CoreResult<String> {
        Ok(boot_id()?)
    }
}
