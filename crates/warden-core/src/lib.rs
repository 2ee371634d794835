pub mod config;
pub mod controller;
pub mod error;
pub mod interface;
pub mod monitor;
pub mod paths;

mod transition;

pub mod prelude {
    pub use crate::config::WardenConfig;
    pub use crate::controller::{ControllerLoop, LoopExit, LoopPhase, run_shim};
    pub use crate::error::{CoreError, CoreResult};
    pub use crate::interface::{Condition, Controller, DownOutcome, StatusReport, UpOutcome};
    pub use crate::monitor::{Monitor, run_to_sink};
    pub use crate::paths::StateDir;
}
