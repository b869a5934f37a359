use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{TransferError, TransferResult};
use crate::transport::{FileUpload, SendMethod, Transport};

/// A request body recorded by [`MemoryTransport`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentRequest {
    pub method: &'static str,
    pub url: String,
    pub body: Vec<u8>,
}

/// In-memory, URL-keyed [`Transport`].
///
/// Intended for tests and offline embedding. Supports injected failures and
/// per-URL latency, and records every call.
#[derive(Default)]
pub struct MemoryTransport {
    routes: RwLock<HashMap<String, Vec<u8>>>,
    failures: Mutex<HashMap<String, u32>>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: Mutex<HashMap<String, u32>>,
    sent: Mutex<Vec<SentRequest>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, url: impl Into<String>, body: impl Into<Vec<u8>>) {
        self.routes
            .write()
            .expect("lock poisoned")
            .insert(url.into(), body.into());
    }

    pub fn insert_json<T: Serialize>(&self, url: impl Into<String>, value: &T) {
        let body = serde_json::to_vec(value).unwrap_or_default();
        self.insert(url, body);
    }

    pub fn remove(&self, url: &str) {
        self.routes.write().expect("lock poisoned").remove(url);
    }

    /// Fail the next `times` requests to `url` with a transport error.
    pub fn fail_next(&self, url: impl Into<String>, times: u32) {
        self.failures
            .lock()
            .expect("lock poisoned")
            .insert(url.into(), times);
    }

    pub fn set_delay(&self, url: impl Into<String>, delay: Duration) {
        self.delays
            .lock()
            .expect("lock poisoned")
            .insert(url.into(), delay);
    }

    /// Requests seen for `url`, including failed attempts.
    pub fn calls(&self, url: &str) -> u32 {
        self.calls
            .lock()
            .expect("lock poisoned")
            .get(url)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.calls.lock().expect("lock poisoned").values().sum()
    }

    pub fn sent(&self) -> Vec<SentRequest> {
        self.sent.lock().expect("lock poisoned").clone()
    }

    async fn attempt(&self, url: &str) -> TransferResult<()> {
        *self
            .calls
            .lock()
            .expect("lock poisoned")
            .entry(url.to_string())
            .or_insert(0) += 1;

        let delay = self.delays.lock().expect("lock poisoned").get(url).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut failures = self.failures.lock().expect("lock poisoned");
        if let Some(remaining) = failures.get_mut(url) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(TransferError::Transport(format!(
                    "injected failure for {url}"
                )));
            }
        }
        Ok(())
    }

    fn lookup(&self, url: &str) -> TransferResult<Vec<u8>> {
        self.routes
            .read()
            .expect("lock poisoned")
            .get(url)
            .cloned()
            .ok_or_else(|| TransferError::Status {
                status: 404,
                url: url.to_string(),
            })
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn fetch(&self, url: &str) -> TransferResult<Vec<u8>> {
        self.attempt(url).await?;
        self.lookup(url)
    }

    async fn download(&self, url: &str, dest: &Path) -> TransferResult<u64> {
        self.attempt(url).await?;
        let body = self.lookup(url)?;
        tokio::fs::write(dest, &body).await?;
        Ok(body.len() as u64)
    }

    /// Echoes the body back. A `PUT` also replaces the route at `url`.
    async fn send(&self, method: SendMethod, url: &str, body: Vec<u8>) -> TransferResult<Vec<u8>> {
        self.attempt(url).await?;
        self.sent.lock().expect("lock poisoned").push(SentRequest {
            method: method.as_str(),
            url: url.to_string(),
            body: body.clone(),
        });
        if method == SendMethod::Put {
            self.insert(url, body.clone());
        }
        Ok(body)
    }

    async fn upload(&self, url: &str, upload: &FileUpload) -> TransferResult<Vec<u8>> {
        self.attempt(url).await?;
        let body = tokio::fs::read(&upload.path).await?;
        self.sent.lock().expect("lock poisoned").push(SentRequest {
            method: "POST",
            url: url.to_string(),
            body,
        });
        Ok(b"{}".to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn injected_failures_run_out() {
        let t = MemoryTransport::new();
        t.insert("u", b"ok".to_vec());
        t.fail_next("u", 1);
        assert!(t.fetch("u").await.is_err());
        assert_eq!(t.fetch("u").await.unwrap(), b"ok");
        assert_eq!(t.calls("u"), 2);
    }

    #[tokio::test]
    async fn missing_route_is_404() {
        let t = MemoryTransport::new();
        let err = t.fetch("nope").await.unwrap_err();
        assert!(matches!(err, TransferError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn put_replaces_route() {
        let t = MemoryTransport::new();
        t.send(SendMethod::Put, "u", b"v2".to_vec()).await.unwrap();
        assert_eq!(t.fetch("u").await.unwrap(), b"v2");
        assert_eq!(t.sent()[0].method, "PUT");
    }
}
