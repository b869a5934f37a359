use thiserror::Error;

/// Transfer failures.
///
/// `Clone` because one deduplicated transfer reports its result to every
/// waiting caller.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransferError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("data was null")]
    NullPayload,

    #[error("I/O error: {0}")]
    Io(String),

    #[error("transfer cancelled")]
    Cancelled,

    #[error("transfer queue closed")]
    QueueClosed,
}

impl TransferError {
    /// Connection, protocol and local I/O failures are retried; decode
    /// failures and cancellation are surfaced immediately.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            TransferError::Transport(_) | TransferError::Status { .. } | TransferError::Io(_)
        )
    }
}

impl From<std::io::Error> for TransferError {
    fn from(e: std::io::Error) -> Self {
        TransferError::Io(e.to_string())
    }
}

pub type TransferResult<T> = Result<T, TransferError>;
