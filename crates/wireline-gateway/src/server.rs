// SPDX-FileCopyrightText: 2026 Wireline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook HTTP server built on axum.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};
use wireline_config::model::WebhookConfig;
use wireline_core::{NotificationSource, WirelineError};
use wireline_notify::NotificationPipeline;

use crate::auth;

/// Shared state for the webhook handler.
#[derive(Clone)]
pub struct WebhookState {
    pub secret: String,
    pub pipeline: Arc<NotificationPipeline>,
}

impl std::fmt::Debug for WebhookState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookState")
            .field("secret", &"[redacted]")
            .finish()
    }
}

/// Binds and serves the ingress until `cancel` fires.
pub async fn serve(
    config: &WebhookConfig,
    state: WebhookState,
    cancel: CancellationToken,
) -> Result<(), WirelineError> {
    let app = router(config, state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| WirelineError::Config(format!("failed to bind webhook to {addr}: {e}")))?;

    info!(addr = addr.as_str(), path = config.path.as_str(), "webhook ingress listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| WirelineError::Internal(format!("webhook server error: {e}")))
}

/// Builds the router: one POST route on the configured path, body-limited;
/// everything else 404s (and non-POST on the path 405s).
pub fn router(config: &WebhookConfig, state: WebhookState) -> Router {
    Router::new()
        .route(&config.path, post(handle_webhook))
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
        .with_state(state)
}

async fn handle_webhook(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !auth::authorized(&headers, &state.secret) {
        warn!("webhook request rejected: bad or missing secret");
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "ok": false })),
        )
            .into_response();
    }

    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "webhook body is not valid JSON");
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "ok": false, "error": "invalid JSON body" })),
            )
                .into_response();
        }
    };

    let source_account = header_str(&headers, "x-source-account");
    let source_event_id = header_str(&headers, "x-event-id");

    match state
        .pipeline
        .ingest(
            &payload,
            NotificationSource::Webhook,
            source_account,
            source_event_id,
        )
        .await
    {
        Ok(receipt) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "ok": true,
                "notificationId": receipt.notification_id,
                "duplicate": receipt.duplicate,
            })),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "webhook ingest failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "ok": false })),
            )
                .into_response()
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}
