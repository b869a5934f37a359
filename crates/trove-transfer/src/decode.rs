use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;

use crate::error::{TransferError, TransferResult};

/// Bounded pool for JSON decoding off the async workers.
#[derive(Clone, Debug)]
pub struct DecodePool {
    permits: Arc<Semaphore>,
}

impl DecodePool {
    pub fn new(concurrency: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Decode `bytes` as `T`. A literal `null` body is an error, not a value.
    pub async fn decode<T>(&self, bytes: Vec<u8>) -> TransferResult<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| TransferError::QueueClosed)?;
        let decoded = tokio::task::spawn_blocking(move || serde_json::from_slice::<Option<T>>(&bytes))
            .await
            .map_err(|e| TransferError::Decode(e.to_string()))?;
        match decoded {
            Ok(Some(value)) => Ok(value),
            Ok(None) => Err(TransferError::NullPayload),
            Err(e) => Err(TransferError::Decode(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        name: String,
    }

    #[tokio::test]
    async fn decodes_object() {
        let pool = DecodePool::new(2);
        let item: Item = pool.decode(br#"{"name":"a"}"#.to_vec()).await.unwrap();
        assert_eq!(item.name, "a");
    }

    #[tokio::test]
    async fn null_body_is_rejected() {
        let pool = DecodePool::new(1);
        let err = pool.decode::<Item>(b"null".to_vec()).await.unwrap_err();
        assert_eq!(err, TransferError::NullPayload);
        assert_eq!(err.to_string(), "data was null");
    }

    #[tokio::test]
    async fn malformed_body_is_decode_error() {
        let pool = DecodePool::new(1);
        let err = pool.decode::<Item>(b"{oops".to_vec()).await.unwrap_err();
        assert!(matches!(err, TransferError::Decode(_)));
        assert!(!err.is_retriable());
    }
}
