use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::TransferResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendMethod {
    Post,
    Put,
}

impl SendMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SendMethod::Post => "POST",
            SendMethod::Put => "PUT",
        }
    }
}

/// A local file sent as a multipart form, with extra text fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileUpload {
    pub path: PathBuf,
    pub file_name: String,
    pub fields: Vec<(String, String)>,
}

impl FileUpload {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path: PathBuf = path.into();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.bin".to_string());
        Self {
            path,
            file_name,
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }
}

/// One network attempt. Retry, queuing and deduplication live above this
/// trait in [`crate::TransferQueue`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch a body into memory.
    async fn fetch(&self, url: &str) -> TransferResult<Vec<u8>>;

    /// Stream a body to `dest`. Returns bytes written. `dest` must not be
    /// left half-written on failure.
    async fn download(&self, url: &str, dest: &Path) -> TransferResult<u64>;

    /// Send a JSON body and return the response body.
    async fn send(&self, method: SendMethod, url: &str, body: Vec<u8>) -> TransferResult<Vec<u8>>;

    /// Multipart file upload. Returns the response body.
    async fn upload(&self, url: &str, upload: &FileUpload) -> TransferResult<Vec<u8>>;
}
