use crate::{error::AppError, models::Link, AppState};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

// ── Request / response types ───────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateLinkRequest {
    destination: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLinkResponse {
    pub id: String,
    pub destination: String,
    pub short_url: String,
}

// ── Handlers ───────────────────────────────────────────────────────────────

/// POST /links
pub async fn create_link(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateLinkRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateLinkResponse>), AppError> {
    let Json(request) = payload.map_err(|e| AppError::Validation(e.body_text()))?;

    let link = state.store.create(request.destination.as_deref()).await?;
    let short_url = format!("{}/l/{}", state.config.base_url, link.id);

    Ok((
        StatusCode::CREATED,
        Json(CreateLinkResponse {
            id: link.id,
            destination: link.destination,
            short_url,
        }),
    ))
}

/// GET /links
/// Every link with its full click history, for the admin dashboard.
pub async fn list_links(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Link>>, AppError> {
    Ok(Json(state.store.list_all().await?))
}

/// GET /links/:id
pub async fn get_link(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Link>, AppError> {
    Ok(Json(state.store.find_by_id(&id).await?))
}

/// DELETE /links/:id
pub async fn delete_link(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    state.store.delete_by_id(&id).await?;
    Ok(Json(json!({ "ok": true, "message": format!("link {id} deleted") })))
}
