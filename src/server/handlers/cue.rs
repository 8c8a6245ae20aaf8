//! Cue Control API (§4.8): `POST /cue` starts or stops an ad break through
//! the Coordinator's write path.

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::server::auth;
use crate::server::state::AppState;
use crate::types::AdBreakState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CueType {
    Start,
    Stop,
}

#[derive(Debug, Deserialize)]
pub struct CueRequest {
    pub channel: String,
    #[serde(rename = "type")]
    pub cue_type: CueType,
    pub duration: Option<f32>,
    pub pod_id: Option<String>,
    pub pod_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CueResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<AdBreakState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `POST /cue` (§4.8, §6). `channel` is the stable `channel_id`, not the
/// `(org, slug)` pair — the control plane is assumed to already know it.
pub async fn cue_control(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(req): Json<CueRequest>,
) -> Result<Response> {
    let cfg = state.config_cache.get_by_id(&req.channel).await?;

    let resource = format!("cue:{}", cfg.channel_id);
    auth::authorize(&state.config, &headers, &query, &resource, cfg.sign_host.as_deref())?;

    let result: Result<Option<AdBreakState>> = match req.cue_type {
        CueType::Start => {
            state
                .coordinator
                .cue_start(&cfg, req.duration, req.pod_id, req.pod_url)
                .await
                .map(Some)
        }
        CueType::Stop => state.coordinator.cue_stop(&cfg.channel_id).await.map(|_| None),
    };

    match result {
        Ok(state) => Ok(Json(CueResponse {
            ok: true,
            state,
            error: None,
        })
        .into_response()),
        Err(e) => Ok(Json(CueResponse {
            ok: false,
            state: None,
            error: Some(e.to_string()),
        })
        .into_response()),
    }
}
