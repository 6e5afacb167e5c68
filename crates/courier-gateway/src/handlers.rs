// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the gateway.

use std::collections::BTreeMap;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use courier_core::CommunicationDraft;
use courier_core::CourierError;
use courier_core::types::WebhookPayload;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::server::GatewayState;

/// Request body for POST /v1/communications/schedule.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRequest {
    #[serde(flatten)]
    pub draft: CommunicationDraft,
    pub scheduled_for: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Caller-facing error: a status code and a reason string, never internals.
fn error_response(err: CourierError) -> Response {
    let (status, message) = match &err {
        CourierError::Validation(_) | CourierError::Config(_) => {
            (StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
        }
        CourierError::NotFound { .. } => (StatusCode::NOT_FOUND, err.to_string()),
        _ => {
            error!(error = %err, "request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_string(),
            )
        }
    };
    (status, Json(ErrorResponse { error: message })).into_response()
}

/// POST /v1/communications
///
/// Persists the draft and queues it; the response acknowledges the enqueue.
pub async fn post_communication(
    State(state): State<GatewayState>,
    Json(draft): Json<CommunicationDraft>,
) -> Response {
    match state.courier.send(draft).await {
        Ok(result) => (StatusCode::ACCEPTED, Json(result)).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /v1/communications/schedule
pub async fn post_schedule(
    State(state): State<GatewayState>,
    Json(body): Json<ScheduleRequest>,
) -> Response {
    match state.courier.schedule(&body.draft, body.scheduled_for).await {
        Ok(scheduled) => (StatusCode::CREATED, Json(scheduled)).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /v1/communications/{id}/cancel
pub async fn post_cancel(State(state): State<GatewayState>, Path(id): Path<i64>) -> Response {
    match state.courier.cancel(id).await {
        Ok(cancelled) => Json(CancelResponse { cancelled }).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /v1/communications/{id}
pub async fn get_communication(
    State(state): State<GatewayState>,
    Path(id): Path<i64>,
) -> Response {
    match state.courier.communication(id).await {
        Ok(view) => Json(view).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /webhooks/{provider}
///
/// Always answers 200 so providers do not retry payloads we cannot use;
/// problems are logged instead.
pub async fn post_webhook(
    State(state): State<GatewayState>,
    Path(provider): Path<String>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let body = match String::from_utf8(body.to_vec()) {
        Ok(body) => body,
        Err(e) => {
            warn!(%provider, "webhook body is not valid UTF-8, decoding lossily");
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        }
    };
    let headers: BTreeMap<String, String> = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect();
    let url = state.public_base_url.as_ref().map(|base| {
        let path = uri.path_and_query().map_or(uri.path(), |pq| pq.as_str());
        format!("{base}{path}")
    });
    let payload = WebhookPayload {
        content_type: headers.get("content-type").cloned(),
        body,
        headers,
        url,
    };

    match state.courier.ingest_webhook(&provider, &payload).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => {
            warn!(%provider, error = %e, "webhook payload rejected");
            StatusCode::OK.into_response()
        }
    }
}

/// GET /unsubscribe/{token}
///
/// Idempotent. The page never names the recipient.
pub async fn get_unsubscribe(
    State(state): State<GatewayState>,
    Path(token): Path<String>,
    headers: HeaderMap,
) -> Response {
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim);

    match state.courier.preferences().unsubscribe(&token, ip).await {
        Ok(Some(_)) => (
            StatusCode::OK,
            "You have been unsubscribed and will no longer receive these messages.",
        )
            .into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "This unsubscribe link is not valid.").into_response(),
        Err(e) => {
            error!(error = %e, "unsubscribe failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Something went wrong, please try again later.",
            )
                .into_response()
        }
    }
}

/// GET /health
pub async fn get_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}
