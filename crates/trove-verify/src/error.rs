use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("hash worker could not be started: {0}")]
    WorkerSpawn(String),

    #[error("hash worker dropped the request")]
    WorkerGone,

    #[error("verification cancelled")]
    Cancelled,
}

pub type VerifyResult<T> = Result<T, VerifyError>;
