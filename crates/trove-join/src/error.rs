use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BarrierError {
    #[error("barrier incremented past its target of {target}")]
    Overflow { target: usize },

    #[error("barrier dropped before reaching its target")]
    Abandoned,
}

pub type BarrierResult<T> = Result<T, BarrierError>;
