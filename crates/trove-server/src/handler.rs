use std::collections::BTreeMap;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};
use trove_types::{ContentEntry, ContentGuid, EntryKind, Platform};

use crate::auth::{Action, Credentials};
use crate::error::{ServerError, ServerResult};
use crate::router::AppState;

/// Health check handler.
pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "name": "trove-server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// Comma-separated entry kinds.
    pub types: Option<String>,
}

pub async fn list_entries(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ServerResult<Json<Vec<Value>>> {
    let kinds = query
        .types
        .as_deref()
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse::<EntryKind>)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(state.store.list_entries(&kinds).await?))
}

pub async fn get_entry(
    State(state): State<AppState>,
    Path(guid): Path<String>,
) -> ServerResult<Json<Value>> {
    Ok(Json(state.store.get_entry(&guid).await?))
}

pub async fn create_entry(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> ServerResult<impl IntoResponse> {
    let entry = ContentEntry::from_value(body)?;
    authorize(&state, &headers, Action::WriteEntry { guid: entry.guid().to_string() }).await?;
    let stored = state.store.put_entry(entry).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

pub async fn update_entry(
    State(state): State<AppState>,
    Path(guid): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> ServerResult<Json<Value>> {
    let mut entry = ContentEntry::from_value(body)?;
    if entry.guid().is_empty() {
        entry.meta_mut().guid = ContentGuid::new(guid.as_str());
    } else if entry.guid().as_str() != guid {
        return Err(ServerError::BadRequest(format!(
            "body guid {} does not match path {guid}",
            entry.guid()
        )));
    }
    authorize(&state, &headers, Action::WriteEntry { guid }).await?;
    Ok(Json(state.store.put_entry(entry).await?))
}

/// `PUT /ContentData` with the GUID carried in the body.
pub async fn update_entry_from_body(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> ServerResult<Json<Value>> {
    let entry = ContentEntry::from_value(body)?;
    if entry.guid().is_empty() {
        return Err(ServerError::BadRequest("update requires a guid".into()));
    }
    authorize(&state, &headers, Action::WriteEntry { guid: entry.guid().to_string() }).await?;
    Ok(Json(state.store.put_entry(entry).await?))
}

pub async fn get_asset_map(
    State(state): State<AppState>,
    Path(guid): Path<String>,
) -> ServerResult<Json<BTreeMap<String, String>>> {
    Ok(Json(state.store.asset_map(&guid).await?))
}

/// Multipart bundle upload. The `file` part carries the bundle; an optional
/// `hash` field is compared with the digest computed here.
pub async fn upload_bundle(
    State(state): State<AppState>,
    Path((guid, platform)): Path<(String, String)>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> ServerResult<Json<Value>> {
    let platform: Platform = platform.parse()?;
    authorize(
        &state,
        &headers,
        Action::UploadBundle { guid: guid.clone(), platform: platform.to_string() },
    )
    .await?;

    let mut data = None;
    let mut claimed_hash = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(e.to_string()))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let bytes = field.bytes().await.map_err(|e| ServerError::BadRequest(e.to_string()))?;
                data = Some(bytes.to_vec());
            }
            Some("hash") => {
                claimed_hash = Some(field.text().await.map_err(|e| ServerError::BadRequest(e.to_string()))?);
            }
            _ => {}
        }
    }
    let data = data.ok_or_else(|| ServerError::BadRequest("missing file part".into()))?;

    let stored = state.store.put_bundle(&guid, platform, data).await?;
    if let Some(claimed) = claimed_hash.filter(|h| *h != stored.hash) {
        warn!(guid = %guid, claimed = %claimed, actual = %stored.hash, "uploaded bundle hash differs from client hash");
    }
    info!(guid = %guid, %platform, bytes = stored.bytes, "bundle uploaded");
    Ok(Json(json!({
        "guid": stored.guid,
        "platform": stored.platform,
        "hash": stored.hash,
        "assetPath": stored.asset_path,
        "bytes": stored.bytes,
        "missingPlatforms": stored.missing_platforms,
    })))
}

pub async fn get_file(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ServerResult<impl IntoResponse> {
    let data = state.store.read_file(&name).await?;
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], data))
}

async fn authorize(state: &AppState, headers: &HeaderMap, action: Action) -> ServerResult<()> {
    let identity = state
        .auth
        .check(&Credentials::from_headers(headers), &action)
        .await?;
    tracing::debug!(identity = %identity.name, %action, "authorized");
    Ok(())
}
