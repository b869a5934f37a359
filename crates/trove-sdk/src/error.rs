use thiserror::Error;
use trove_types::ContentGuid;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("entry {0} is not media")]
    NotMedia(ContentGuid),

    #[error("media {0} is streamed and has no local bundle")]
    NoLocalBundle(ContentGuid),

    #[error("content error: {0}")]
    Content(#[from] trove_content::ContentError),

    #[error("resolve error: {0}")]
    Resolve(#[from] trove_resolve::ResolveError),

    #[error("bundle error: {0}")]
    Bundle(#[from] trove_bundle::BundleError),

    #[error("transfer error: {0}")]
    Transfer(#[from] trove_transfer::TransferError),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for SdkError {
    fn from(e: std::io::Error) -> Self {
        SdkError::Io(e.to_string())
    }
}

pub type SdkResult<T> = Result<T, SdkError>;
