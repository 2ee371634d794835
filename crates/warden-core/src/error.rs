use thiserror::Error;

use warden_exec::ExecError;
use warden_model::ModelError;
use warden_store::StoreError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error("no service spawned within {0}s")]
    Timeout(u64),

    #[error("controller died: {0}")]
    Dead(String),

    #[error("runtime error: {0}")]
    Runtime(String),

    #[error("state was recorded under boot {recorded}, current boot is {current}")]
    StaleState { recorded: String, current: String },

    #[error("refused: {0}")]
    Refused(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("interrupted by {0}")]
    Interrupted(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;
