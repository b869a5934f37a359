use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, multipart, Client, Method, RequestBuilder, Response};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::config::TransferConfig;
use crate::error::{TransferError, TransferResult};
use crate::transport::{FileUpload, SendMethod, Transport};

/// [`Transport`] over HTTP(S), with an optional bearer token on every request.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
    auth_token: Option<String>,
}

impl HttpTransport {
    pub fn new(config: &TransferConfig, auth_token: Option<String>) -> TransferResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(transport_error)?;
        Ok(Self { client, auth_token })
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let req = self.client.request(method, url);
        match &self.auth_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn body_of(&self, req: RequestBuilder, url: &str) -> TransferResult<Vec<u8>> {
        let resp = check_status(req.send().await.map_err(transport_error)?, url)?;
        let bytes = resp.bytes().await.map_err(transport_error)?;
        Ok(bytes.to_vec())
    }

    async fn stream_to(&self, url: &str, part: &Path) -> TransferResult<u64> {
        let mut resp = check_status(
            self.request(Method::GET, url)
                .send()
                .await
                .map_err(transport_error)?,
            url,
        )?;
        let mut file = tokio::fs::File::create(part).await?;
        let mut written = 0u64;
        while let Some(chunk) = resp.chunk().await.map_err(transport_error)? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, url: &str) -> TransferResult<Vec<u8>> {
        self.body_of(self.request(Method::GET, url), url).await
    }

    async fn download(&self, url: &str, dest: &Path) -> TransferResult<u64> {
        let part = part_path(dest);
        match self.stream_to(url, &part).await {
            Ok(written) => {
                tokio::fs::rename(&part, dest).await?;
                debug!(url, bytes = written, dest = %dest.display(), "download complete");
                Ok(written)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&part).await;
                Err(e)
            }
        }
    }

    async fn send(&self, method: SendMethod, url: &str, body: Vec<u8>) -> TransferResult<Vec<u8>> {
        let method = match method {
            SendMethod::Post => Method::POST,
            SendMethod::Put => Method::PUT,
        };
        let req = self
            .request(method, url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body);
        self.body_of(req, url).await
    }

    async fn upload(&self, url: &str, upload: &FileUpload) -> TransferResult<Vec<u8>> {
        let data = tokio::fs::read(&upload.path).await?;
        let mut form = multipart::Form::new();
        for (key, value) in &upload.fields {
            form = form.text(key.clone(), value.clone());
        }
        form = form.part(
            "file",
            multipart::Part::bytes(data).file_name(upload.file_name.clone()),
        );
        self.body_of(self.request(Method::POST, url).multipart(form), url)
            .await
    }
}

fn check_status(resp: Response, url: &str) -> TransferResult<Response> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        Err(TransferError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        })
    }
}

fn transport_error(e: reqwest::Error) -> TransferError {
    TransferError::Transport(e.to_string())
}

/// Sibling path a download is streamed into before being renamed over `dest`.
pub(crate) fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}
