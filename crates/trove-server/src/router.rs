use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::AuthProvider;
use crate::handler;
use crate::store::DirStore;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<DirStore>,
    pub auth: Arc<dyn AuthProvider>,
}

/// Build the axum router with all Trove endpoints.
pub fn build_router(state: AppState, max_upload_size: usize) -> Router {
    Router::new()
        .route("/health", get(handler::health_handler))
        .route(
            "/ContentData",
            get(handler::list_entries)
                .post(handler::create_entry)
                .put(handler::update_entry_from_body),
        )
        .route(
            "/ContentData/:guid",
            get(handler::get_entry).put(handler::update_entry),
        )
        .route("/Asset/:guid", get(handler::get_asset_map))
        .route("/Asset/:guid/:platform", post(handler::upload_bundle))
        .route("/files/:name", get(handler::get_file))
        .layer(DefaultBodyLimit::max(max_upload_size))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
