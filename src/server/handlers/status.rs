//! Operator status surface (§4.8, §6): `GET /status/{channel}`.

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};

use crate::coordinator::CoordinatorSnapshot;
use crate::error::Result;
use crate::server::auth;
use crate::server::state::AppState;

/// `GET /status/{channel}` — `channel` is the `channel_id`.
pub async fn channel_status(
    Path(channel_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<CoordinatorSnapshot>> {
    let cfg = state.config_cache.get_by_id(&channel_id).await?;

    let resource = format!("status:{channel_id}");
    auth::authorize(&state.config, &headers, &query, &resource, cfg.sign_host.as_deref())?;

    let snapshot = state.coordinator.status(&channel_id).await?;
    Ok(Json(snapshot))
}
