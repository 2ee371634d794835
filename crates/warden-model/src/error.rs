use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid service definition: {0}")]
    InvalidDefinition(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("unknown controller status: {0}")]
    UnknownStatus(String),

    #[error("unrecognized event record: {0}")]
    UnknownEvent(String),
}

pub type ModelResult<T> = Result<T, ModelError>;
