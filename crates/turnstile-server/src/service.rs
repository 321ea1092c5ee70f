use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use turnstile_core::{
    Api, ApiPolicy, Application, ApplicationKeyMapping, ApplicationPolicy, Claims, InvalidReason,
    Subscription, SubscriptionKey, SubscriptionPolicy, TokenValidator, TokenVerdict,
};
use turnstile_storage::EntitlementReader;

use crate::audit;
use crate::metrics::Metrics;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecisionRequest {
    /// Raw `Authorization` header value.
    pub authorization: Option<String>,
    /// Target API id supplied by the proxy.
    pub api_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Deny,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Allow => "allow",
            Verdict::Deny => "deny",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    MissingToken,
    InvalidToken(InvalidReason),
    MissingApiContext,
    UnknownApplication,
    ApiNotServable,
    NoSubscription,
    TimedOut,
    Internal,
}

impl DenyReason {
    pub const COUNT: usize = 13;

    /// Every reason, ordered by [`DenyReason::index`].
    pub const ALL: [DenyReason; Self::COUNT] = [
        DenyReason::MissingToken,
        DenyReason::InvalidToken(InvalidReason::NoVerificationKey),
        DenyReason::InvalidToken(InvalidReason::MalformedStructure),
        DenyReason::InvalidToken(InvalidReason::MalformedEncoding),
        DenyReason::InvalidToken(InvalidReason::UnsupportedAlgorithm),
        DenyReason::InvalidToken(InvalidReason::SignatureInvalid),
        DenyReason::InvalidToken(InvalidReason::Expired),
        DenyReason::MissingApiContext,
        DenyReason::UnknownApplication,
        DenyReason::ApiNotServable,
        DenyReason::NoSubscription,
        DenyReason::TimedOut,
        DenyReason::Internal,
    ];

    pub fn index(&self) -> usize {
        match self {
            DenyReason::MissingToken => 0,
            DenyReason::InvalidToken(reason) => match reason {
                InvalidReason::NoVerificationKey => 1,
                InvalidReason::MalformedStructure => 2,
                InvalidReason::MalformedEncoding => 3,
                InvalidReason::UnsupportedAlgorithm => 4,
                InvalidReason::SignatureInvalid => 5,
                InvalidReason::Expired => 6,
            },
            DenyReason::MissingApiContext => 7,
            DenyReason::UnknownApplication => 8,
            DenyReason::ApiNotServable => 9,
            DenyReason::NoSubscription => 10,
            DenyReason::TimedOut => 11,
            DenyReason::Internal => 12,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::MissingToken => "missing bearer token",
            DenyReason::InvalidToken(reason) => reason.as_str(),
            DenyReason::MissingApiContext => "missing api context",
            DenyReason::UnknownApplication => "unknown application",
            DenyReason::ApiNotServable => "api not servable",
            DenyReason::NoSubscription => "no subscription",
            DenyReason::TimedOut => "decision timed out",
            DenyReason::Internal => "internal error",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an ALLOW hands back to the proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionMetadata {
    pub application_id: String,
    pub api_id: String,
    pub subscription_id: String,
    pub subscription_tier: String,
    pub subscription_policy: Option<String>,
    pub application_policy: Option<String>,
    pub api_policy: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub verdict: Verdict,
    pub reason: Option<DenyReason>,
    pub metadata: Option<DecisionMetadata>,
}

impl Decision {
    pub fn allow(metadata: DecisionMetadata) -> Self {
        Self {
            verdict: Verdict::Allow,
            reason: None,
            metadata: Some(metadata),
        }
    }

    pub fn deny(reason: DenyReason) -> Self {
        Self {
            verdict: Verdict::Deny,
            reason: Some(reason),
            metadata: None,
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.verdict == Verdict::Allow
    }
}

/// Answers "may this caller invoke this API?" from the token and the local
/// entitlement mirror. Never blocks on event ingestion.
pub struct AuthorizationDecisionService<R> {
    store: R,
    validator: TokenValidator,
    metrics: Option<Arc<Metrics>>,
}

impl<R: EntitlementReader> AuthorizationDecisionService<R> {
    pub fn new(store: R, validator: TokenValidator) -> Self {
        Self {
            store,
            validator,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Evaluates the request, then audits and counts the verdict.
    pub fn decide(&self, request: &DecisionRequest) -> Decision {
        let decision = self.evaluate(request);
        self.record(&decision, request.api_id.as_deref());
        decision
    }

    /// Audits and counts a verdict. Call once per answered request.
    pub fn record(&self, decision: &Decision, requested_api: Option<&str>) {
        audit::audit_decision(decision, requested_api);
        if let Some(metrics) = &self.metrics {
            metrics.record_decision(decision);
        }
    }

    /// Computes the verdict without side effects. A caller that may abandon
    /// the evaluation records the verdict it actually returns via [`Self::record`].
    pub fn evaluate(&self, request: &DecisionRequest) -> Decision {
        let Some(token) = request.authorization.as_deref().and_then(bearer_token) else {
            return Decision::deny(DenyReason::MissingToken);
        };

        let claims = match self.validator.validate(token) {
            TokenVerdict::Valid { claims } => claims,
            TokenVerdict::Invalid { reason } => {
                return Decision::deny(DenyReason::InvalidToken(reason));
            }
        };

        let Some(api_id) = request
            .api_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
        else {
            return Decision::deny(DenyReason::MissingApiContext);
        };

        let Some(application_id) = self.resolve_application(&claims) else {
            return Decision::deny(DenyReason::UnknownApplication);
        };

        let subscription = self
            .store
            .get::<Subscription>(&SubscriptionKey::new(application_id.as_str(), api_id));
        let api = self.store.get::<Api>(&api_id.to_string());

        let api = match api {
            Some(api) if api.status.is_servable() => api,
            _ => return Decision::deny(DenyReason::ApiNotServable),
        };
        let Some(subscription) = subscription else {
            return Decision::deny(DenyReason::NoSubscription);
        };

        let subscription_policy = self
            .store
            .get::<SubscriptionPolicy>(&subscription.policy)
            .map(|p| p.name.clone());
        let application_policy = self
            .store
            .get::<Application>(&application_id)
            .and_then(|app| app.policy.clone())
            .and_then(|name| self.store.get::<ApplicationPolicy>(&name))
            .map(|p| p.name.clone());
        let api_policy = api
            .policy
            .as_ref()
            .and_then(|name| self.store.get::<ApiPolicy>(name))
            .map(|p| p.name.clone());

        Decision::allow(DecisionMetadata {
            application_id,
            api_id: api.id.clone(),
            subscription_id: subscription.id.clone(),
            subscription_tier: subscription.policy.clone(),
            subscription_policy,
            application_policy,
            api_policy,
        })
    }

    fn resolve_application(&self, claims: &Claims) -> Option<String> {
        if let Some(id) = claims
            .get("application")
            .and_then(|app| app.get("id"))
            .and_then(identifier)
        {
            return Some(id);
        }
        if let Some(id) = claims.get("application_id").and_then(identifier) {
            return Some(id);
        }

        let consumer_key = claims
            .get("azp")
            .or_else(|| claims.get("client_id"))
            .and_then(Value::as_str)?;
        self.store
            .get::<ApplicationKeyMapping>(&consumer_key.to_string())
            .map(|mapping| mapping.application_id.clone())
    }
}

fn identifier(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Returns the credential of a `Bearer` authorization value.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(char::is_whitespace)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
