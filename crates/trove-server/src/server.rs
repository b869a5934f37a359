use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::auth::{AllowAllAuth, AuthProvider, TokenAuth};
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::router::{build_router, AppState};
use crate::store::DirStore;

/// Trove development origin server.
pub struct TroveServer {
    config: ServerConfig,
    state: AppState,
}

impl TroveServer {
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        let store = Arc::new(DirStore::open(config.data_root.clone())?);
        let auth: Arc<dyn AuthProvider> = if config.auth_tokens.is_empty() {
            Arc::new(AllowAllAuth)
        } else {
            Arc::new(TokenAuth::new(config.auth_tokens.iter().cloned()))
        };
        Ok(Self {
            config,
            state: AppState { store, auth },
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone(), self.config.max_upload_size)
    }

    /// Bind `config.bind_addr` and serve until the task is dropped.
    pub async fn serve(self) -> ServerResult<()> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve_on(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve_on(self, listener: TcpListener) -> ServerResult<()> {
        let addr: SocketAddr = listener.local_addr()?;
        tracing::info!("Trove server listening on {addr}");
        axum::serve(listener, self.router())
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}
