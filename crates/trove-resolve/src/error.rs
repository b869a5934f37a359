use thiserror::Error;
use trove_content::ContentError;
use trove_transfer::TransferError;
use trove_types::{ContentGuid, Platform};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("environment {guid} unavailable: {source}")]
    Environment {
        guid: ContentGuid,
        #[source]
        source: ContentError,
    },

    #[error("no {platform} asset path published for {payload}")]
    NoPlatformAsset { payload: String, platform: Platform },

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("resolution cancelled")]
    Cancelled,
}

pub type ResolveResult<T> = Result<T, ResolveError>;
