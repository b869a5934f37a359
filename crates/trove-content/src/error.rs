use thiserror::Error;
use trove_transfer::TransferError;
use trove_types::{ContentGuid, EntryKind};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ContentError {
    #[error("content guid is empty")]
    EmptyGuid,

    #[error("entry {guid} is a {actual}, expected {expected}")]
    KindMismatch {
        guid: ContentGuid,
        expected: EntryKind,
        actual: EntryKind,
    },

    #[error(transparent)]
    Transfer(#[from] TransferError),
}

impl ContentError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ContentError::Transfer(TransferError::Cancelled))
    }
}

pub type ContentResult<T> = Result<T, ContentError>;
