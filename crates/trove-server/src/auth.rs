use std::collections::HashSet;

use async_trait::async_trait;
use axum::http::{header, HeaderMap};

use crate::error::{ServerError, ServerResult};

#[derive(Clone, Debug)]
pub struct Identity {
    pub name: String,
    pub can_write: bool,
}

impl Identity {
    pub fn anonymous() -> Self { Self { name: "anonymous".into(), can_write: false } }
    pub fn publisher(name: impl Into<String>) -> Self { Self { name: name.into(), can_write: true } }
}

#[derive(Clone, Debug)]
pub enum Credentials {
    Bearer(String),
    Anonymous,
}

impl Credentials {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|t| Credentials::Bearer(t.trim().to_string()))
            .unwrap_or(Credentials::Anonymous)
    }
}

#[derive(Clone, Debug)]
pub enum Action {
    Read,
    WriteEntry { guid: String },
    UploadBundle { guid: String, platform: String },
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::WriteEntry { guid } => write!(f, "write:{guid}"),
            Self::UploadBundle { guid, platform } => write!(f, "upload:{guid}/{platform}"),
        }
    }
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn authenticate(&self, credentials: &Credentials) -> ServerResult<Identity>;
    async fn authorize(&self, identity: &Identity, action: &Action) -> ServerResult<bool>;

    /// Authenticate and authorize in one step, failing with the matching error.
    async fn check(&self, credentials: &Credentials, action: &Action) -> ServerResult<Identity> {
        let identity = self.authenticate(credentials).await?;
        if self.authorize(&identity, action).await? {
            Ok(identity)
        } else {
            Err(ServerError::AuthorizationDenied { action: action.to_string() })
        }
    }
}

pub struct AllowAllAuth;

#[async_trait]
impl AuthProvider for AllowAllAuth {
    async fn authenticate(&self, credentials: &Credentials) -> ServerResult<Identity> {
        match credentials {
            Credentials::Bearer(token) => Ok(Identity::publisher(token_label(token))),
            Credentials::Anonymous => Ok(Identity::publisher("anonymous")),
        }
    }

    async fn authorize(&self, _identity: &Identity, _action: &Action) -> ServerResult<bool> {
        Ok(true)
    }
}

/// Static bearer tokens. Reads are always allowed; writes need a listed token.
pub struct TokenAuth {
    tokens: HashSet<String>,
}

impl TokenAuth {
    pub fn new(tokens: impl IntoIterator<Item = String>) -> Self {
        Self { tokens: tokens.into_iter().collect() }
    }
}

#[async_trait]
impl AuthProvider for TokenAuth {
    async fn authenticate(&self, credentials: &Credentials) -> ServerResult<Identity> {
        match credentials {
            Credentials::Bearer(token) if self.tokens.contains(token) => {
                Ok(Identity::publisher(token_label(token)))
            }
            Credentials::Bearer(_) => Err(ServerError::AuthFailed("unknown token".into())),
            Credentials::Anonymous => Ok(Identity::anonymous()),
        }
    }

    async fn authorize(&self, identity: &Identity, action: &Action) -> ServerResult<bool> {
        Ok(matches!(action, Action::Read) || identity.can_write)
    }
}

fn token_label(token: &str) -> String {
    format!("bearer:{}", token.chars().take(8).collect::<String>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn credentials_from_headers() {
        let mut headers = HeaderMap::new();
        assert!(matches!(Credentials::from_headers(&headers), Credentials::Anonymous));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert!(matches!(Credentials::from_headers(&headers), Credentials::Bearer(t) if t == "abc"));
    }

    #[test]
    fn action_display() {
        assert_eq!(Action::WriteEntry { guid: "g".into() }.to_string(), "write:g");
        assert_eq!(
            Action::UploadBundle { guid: "g".into(), platform: "ios".into() }.to_string(),
            "upload:g/ios"
        );
    }

    #[tokio::test]
    async fn allow_all_auth() {
        let auth = AllowAllAuth;
        let id = auth.check(&Credentials::Anonymous, &Action::WriteEntry { guid: "g".into() }).await.unwrap();
        assert_eq!(id.name, "anonymous");
    }

    #[tokio::test]
    async fn token_auth_gates_writes() {
        let auth = TokenAuth::new(["secret-token".to_string()]);
        let write = Action::WriteEntry { guid: "g".into() };

        assert!(auth.check(&Credentials::Anonymous, &Action::Read).await.is_ok());
        let denied = auth.check(&Credentials::Anonymous, &write).await.unwrap_err();
        assert!(matches!(denied, ServerError::AuthorizationDenied { .. }));
        let bad = auth.check(&Credentials::Bearer("nope".into()), &write).await.unwrap_err();
        assert!(matches!(bad, ServerError::AuthFailed(_)));

        let id = auth.check(&Credentials::Bearer("secret-token".into()), &write).await.unwrap();
        assert!(id.name.starts_with("bearer:"));
    }
}
