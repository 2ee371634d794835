//! Service definition: the immutable descriptor of the command a controller supervises.
//!
//! The document is plain JSON:
//!
//! ```json
//! {
//!   "cmd": "/bin/sleep",
//!   "argv": ["2"],
//!   "env": {"LANG": "C"},
//!   "cwd": "/",
//!   "stdin": "/dev/null",
//!   "stdout": "/var/log/svc.out",
//!   "stderr": "/var/log/svc.err",
//!   "uid": 1000,
//!   "gid": 1000,
//!   "timeout": 0
//! }
//! ```
mod loader;

use std::path::PathBuf;

use serde::Serialize;

use crate::{Env, ModelResult, TimeoutSecs};

/// Declarative description of the managed service.
///
/// Built only through [`ServiceDefinition::from_json`], which validates every field.
/// Once recorded in a controller's state directory it is never replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceDefinition {
    /// Absolute path of the program to execute.
    pub cmd: PathBuf,
    /// Arguments passed after the program name.
    pub argv: Vec<String>,
    /// Closed environment of the service.
    ///
    /// An absent or empty `env` resolves to [`Env::baseline`].
    pub env: Env,
    /// Working directory of the service.
    pub cwd: PathBuf,
    /// File connected to the service's standard input.
    pub stdin: PathBuf,
    /// File the service's standard output is appended to.
    pub stdout: PathBuf,
    /// File the service's standard error is appended to.
    pub stderr: PathBuf,
    /// User id the service runs as.
    pub uid: u32,
    /// Group id the service runs as.
    pub gid: u32,
    /// Runtime limit in seconds; `0` means none.
    pub timeout: TimeoutSecs,
}

impl ServiceDefinition {
    /// Parse and validate a definition document.
    pub fn from_json(raw: &str) -> ModelResult<Self> {
        loader::load(raw)
    }

    /// Serialize the definition for storage next to the controller state.
    pub fn to_json(&self) -> String {
        // Every field is a plain string/number/map; serialization cannot fail.
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}
