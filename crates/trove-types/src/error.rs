use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("unknown platform: {0}")]
    UnknownPlatform(String),

    #[error("unknown entry kind: {0}")]
    UnknownKind(String),

    #[error("cannot infer entry kind from payload shape")]
    UnrecognizedShape,

    #[error("serialization error: {0}")]
    Serialization(String),
}
