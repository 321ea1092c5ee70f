use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::audit;
use crate::error::ApiError;
use crate::events::NotificationEnvelope;
use crate::metrics::render_store_gauges;
use crate::service::{Decision, DecisionRequest, DenyReason};

use super::AppState;
use super::types::*;

pub const DENY_REASON_HEADER: &str = "x-turnstile-deny-reason";
pub const APPLICATION_ID_HEADER: &str = "x-turnstile-application-id";
pub const API_ID_RESPONSE_HEADER: &str = "x-turnstile-api-id";
pub const SUBSCRIPTION_TIER_HEADER: &str = "x-turnstile-subscription-tier";
pub const APPLICATION_POLICY_HEADER: &str = "x-turnstile-application-policy";
pub const API_POLICY_HEADER: &str = "x-turnstile-api-policy";

fn api_error_to_response(err: ApiError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &err {
        ApiError::Enqueue(_) => StatusCode::SERVICE_UNAVAILABLE,
    };

    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}

fn header_value(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn decision_response(decision: &Decision) -> Response {
    let Some(metadata) = &decision.metadata else {
        let reason = decision
            .reason
            .unwrap_or(DenyReason::Internal)
            .as_str();
        return (
            StatusCode::FORBIDDEN,
            [(
                HeaderName::from_static(DENY_REASON_HEADER),
                HeaderValue::from_static(reason),
            )],
        )
            .into_response();
    };

    let mut headers = HeaderMap::new();
    let mut put = |name: &'static str, value: &str| match HeaderValue::from_str(value) {
        Ok(v) => {
            headers.insert(HeaderName::from_static(name), v);
        }
        Err(_) => {
            tracing::debug!(header = name, "value not representable as a header, omitted");
        }
    };

    put(APPLICATION_ID_HEADER, &metadata.application_id);
    put(API_ID_RESPONSE_HEADER, &metadata.api_id);
    put(SUBSCRIPTION_TIER_HEADER, &metadata.subscription_tier);
    if let Some(policy) = &metadata.application_policy {
        put(APPLICATION_POLICY_HEADER, policy);
    }
    if let Some(policy) = &metadata.api_policy {
        put(API_POLICY_HEADER, policy);
    }

    (StatusCode::OK, headers).into_response()
}

/// External authorization check. The proxy forwards the original request's
/// headers; only the status code and `x-turnstile-*` headers matter.
pub async fn authorize(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let request = DecisionRequest {
        authorization: header_value(&headers, &AUTHORIZATION),
        api_id: header_value(&headers, &state.api_id_header),
    };
    let requested_api = request.api_id.clone();

    // Only the evaluation runs on the blocking pool. An abandoned evaluation
    // finishes unobserved; the verdict sent to the proxy is the one recorded.
    let service = Arc::clone(&state.service);
    let task = tokio::task::spawn_blocking(move || service.evaluate(&request));

    let decision = match tokio::time::timeout(state.decision_timeout, task).await {
        Ok(Ok(decision)) => {
            state.service.record(&decision, requested_api.as_deref());
            decision
        }
        Ok(Err(e)) => {
            tracing::error!(error = %e, "decision task failed");
            let decision = Decision::deny(DenyReason::Internal);
            state.service.record(&decision, requested_api.as_deref());
            decision
        }
        Err(_) => {
            let timeout_ms = u64::try_from(state.decision_timeout.as_millis()).unwrap_or(u64::MAX);
            audit::audit_decision_timeout(requested_api.as_deref(), timeout_ms);
            let decision = Decision::deny(DenyReason::TimedOut);
            state.service.record(&decision, requested_api.as_deref());
            decision
        }
    };

    decision_response(&decision)
}

pub async fn notify(
    State(state): State<AppState>,
    Json(envelope): Json<NotificationEnvelope>,
) -> impl IntoResponse {
    let destination = envelope.destination.clone();

    match state.notifications.try_send(envelope) {
        Ok(()) => (StatusCode::ACCEPTED, Json(QueuedResponse { status: "queued" })).into_response(),
        Err(e) => {
            state.metrics.record_notification_rejected();
            audit::audit_notification_rejected(&destination, &e.to_string());
            api_error_to_response(e.into()).into_response()
        }
    }
}

pub async fn entitlement_stats(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(StoreStatsResponse::from(state.store.stats())),
    )
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let mut body = state.metrics.render_prometheus();
    body.push_str(&render_store_gauges(&state.store.stats()));
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({"status": "ok"})))
}
