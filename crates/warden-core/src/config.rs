use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use warden_model::Delimiters;
use warden_observe::LoggerConfig;

use crate::error::{CoreError, CoreResult};

/// Runtime configuration shared by every warden subcommand.
///
/// Loaded from an optional JSON file; command-line flags override it field by field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    /// How long `up` waits for the service to be spawned.
    pub up_wait_secs: u64,
    /// How long `down` waits after the graceful stop request.
    pub down_timeout_secs: u64,
    /// How long `down` waits after the forceful stop request.
    pub kill_grace_secs: u64,
    /// Record format of the standalone monitor.
    pub delimiters: Delimiters,
    pub logger: LoggerConfig,
    /// Executable spawned for the controller loop; the running binary when unset.
    pub program: Option<PathBuf>,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            up_wait_secs: 10,
            down_timeout_secs: 10,
            kill_grace_secs: 2,
            delimiters: Delimiters::default(),
            logger: LoggerConfig::default(),
            program: None,
        }
    }
}

impl WardenConfig {
    /// Read a configuration file, or the defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> CoreResult<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("{}: {e}", path.display())))?;
        let cfg: Self = serde_json::from_str(&raw)
            .map_err(|e| CoreError::Config(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), "config loaded");
        Ok(cfg)
    }

    /// Executable to spawn as the controller loop.
    pub fn program(&self) -> CoreResult<PathBuf> {
        match &self.program {
            Some(p) => Ok(p.clone()),
            None => Ok(std::env::current_exe()?),
        }
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_secs(self.kill_grace_secs)
    }
}
