use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Domain-specific error types for the gateway (§7).
///
/// Every viewer-facing handler maps these to 502/503/504 with `no-store`
/// cache control; the structured code/message never reaches the viewer.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("origin fetch failed: {0}")]
    OriginUnavailable(String),

    #[error("malformed manifest: {0}")]
    MalformedManifest(String),

    #[error("invalid SCTE-35 payload: {0}")]
    InvalidScte35(String),

    #[error("content PDT not present in playlist window")]
    PdtMissing,

    #[error("no matching variant for requested bitrate ladder")]
    NoMatchingVariant,

    #[error("ad decision waterfall exceeded its time budget")]
    DecisionTimeout,

    #[error("durable storage operation failed: {0}")]
    StorageFailure(String),

    #[error("per-channel lock not acquired within budget")]
    LockTimeout,

    #[error("channel not found: {0}")]
    ChannelNotFound(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl GatewayError {
    /// Stable operator-facing code, logged but never sent to viewers.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::OriginUnavailable(_) => "ORIGIN_UNAVAILABLE",
            GatewayError::MalformedManifest(_) => "MALFORMED_MANIFEST",
            GatewayError::InvalidScte35(_) => "INVALID_SCTE35",
            GatewayError::PdtMissing => "PDT_MISSING",
            GatewayError::NoMatchingVariant => "NO_MATCHING_VARIANT",
            GatewayError::DecisionTimeout => "DECISION_TIMEOUT",
            GatewayError::StorageFailure(_) => "STORAGE_FAILURE",
            GatewayError::LockTimeout => "LOCK_TIMEOUT",
            GatewayError::ChannelNotFound(_) => "CHANNEL_NOT_FOUND",
            GatewayError::Unauthorized => "UNAUTHORIZED",
            GatewayError::BadRequest(_) => "BAD_REQUEST",
            GatewayError::ConfigError(_) => "CONFIG_ERROR",
        }
    }

    /// HTTP status this error maps to. Exposed so the control-plane
    /// handlers can build their own `{ok:false, error}` envelopes instead
    /// of the viewer path's plain-text body.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::OriginUnavailable(_) => StatusCode::BAD_GATEWAY,
            GatewayError::MalformedManifest(_) => StatusCode::BAD_GATEWAY,
            GatewayError::InvalidScte35(_) => StatusCode::BAD_GATEWAY,
            GatewayError::PdtMissing => StatusCode::BAD_GATEWAY,
            GatewayError::NoMatchingVariant => StatusCode::BAD_GATEWAY,
            GatewayError::DecisionTimeout => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::StorageFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::LockTimeout => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::ChannelNotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        tracing::error!(code = self.code(), "{}", self);

        let mut response = (status, self.to_string()).into_response();
        response
            .headers_mut()
            .insert(axum::http::header::CACHE_CONTROL, "no-store".parse().unwrap());
        if status == StatusCode::SERVICE_UNAVAILABLE {
            response
                .headers_mut()
                .insert(axum::http::header::RETRY_AFTER, "1".parse().unwrap());
        }
        response
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
