use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("invalid pid: {0}")]
    InvalidPid(i32),

    #[error("spawn failed: {0}")]
    SpawnFailed(String),

    #[error("failed to signal pid {pid}: {reason}")]
    Signal { pid: i32, reason: String },

    #[error("boot id unavailable: {0}")]
    BootId(String),

    #[error("invalid exec plan: {0}")]
    InvalidPlan(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ExecResult<T> = Result<T, ExecError>;
