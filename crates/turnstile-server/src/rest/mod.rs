mod handlers;
mod types;

pub use handlers::{
    API_ID_RESPONSE_HEADER, API_POLICY_HEADER, APPLICATION_ID_HEADER, APPLICATION_POLICY_HEADER,
    DENY_REASON_HEADER, SUBSCRIPTION_TIER_HEADER,
};

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::HeaderName;
use axum::middleware;
use axum::response::Response;
use axum::routing::{any, get, post};
use turnstile_storage::EntitlementStore;

use crate::config::DEFAULT_API_ID_HEADER;
use crate::events::NotificationSender;
use crate::metrics::Metrics;
use crate::service::AuthorizationDecisionService;

const MAX_REQUEST_BODY_SIZE: usize = 1024 * 1024; // 1 MB

pub type DecisionService = AuthorizationDecisionService<Arc<EntitlementStore>>;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<DecisionService>,
    pub store: Arc<EntitlementStore>,
    pub notifications: NotificationSender,
    pub metrics: Arc<Metrics>,
    pub api_id_header: HeaderName,
    pub decision_timeout: Duration,
}

impl AppState {
    pub fn new(
        service: Arc<DecisionService>,
        store: Arc<EntitlementStore>,
        notifications: NotificationSender,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            service,
            store,
            notifications,
            metrics,
            api_id_header: HeaderName::from_static(DEFAULT_API_ID_HEADER),
            decision_timeout: Duration::from_millis(250),
        }
    }

    pub fn with_api_id_header(mut self, header: HeaderName) -> Self {
        self.api_id_header = header;
        self
    }

    pub fn with_decision_timeout(mut self, timeout: Duration) -> Self {
        self.decision_timeout = timeout;
        self
    }
}

async fn metrics_middleware(
    State(state): State<AppState>,
    request: axum::http::Request<axum::body::Body>,
    next: middleware::Next,
) -> Response {
    state.metrics.record_request();

    let response = next.run(request).await;

    if response.status().is_success() {
        state.metrics.record_success();
    } else {
        state.metrics.record_error();
    }

    response
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/authorize", any(handlers::authorize))
        .route("/v1/authorize/{*path}", any(handlers::authorize))
        .route("/v1/notifications", post(handlers::notify))
        .route("/v1/entitlements/stats", get(handlers::entitlement_stats))
        .route("/healthz", get(handlers::healthz))
        .route("/metrics", get(handlers::metrics))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_SIZE))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            metrics_middleware,
        ))
        .with_state(state)
}
