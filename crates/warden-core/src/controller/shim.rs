use std::path::Path;

use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use warden_exec::ExecPlan;
use warden_store::await_gate;

use crate::error::CoreResult;

/// Body of the gated launcher process.
///
/// Reads an [`ExecPlan`] from stdin, waits until the controller loop has
/// recorded our PID and released the gate, then replaces the process image.
/// Only returns on failure.
pub async fn run_shim(gate: &Path) -> CoreResult<()> {
    let mut raw = String::new();
    tokio::io::stdin().read_to_string(&mut raw).await?;
    let plan = ExecPlan::from_json(&raw)?;
    debug!(plan = %plan, "plan received");

    await_gate(gate).await?;
    info!(program = %plan.program.display(), "exec service");
    Err(plan.exec().into())
}
