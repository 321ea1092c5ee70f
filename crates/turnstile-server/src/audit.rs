use crate::service::Decision;

pub fn audit_decision(decision: &Decision, requested_api: Option<&str>) {
    match (&decision.metadata, decision.reason) {
        (Some(metadata), _) => {
            tracing::info!(
                target: "audit",
                event = "decision",
                verdict = decision.verdict.as_str(),
                application_id = %metadata.application_id,
                api_id = %metadata.api_id,
                subscription_tier = %metadata.subscription_tier,
                "request allowed"
            );
        }
        (None, reason) => {
            tracing::warn!(
                target: "audit",
                event = "decision",
                verdict = decision.verdict.as_str(),
                reason = reason.map(|r| r.as_str()).unwrap_or("unspecified"),
                api_id = requested_api.unwrap_or("unknown"),
                "request denied"
            );
        }
    }
}

pub fn audit_decision_timeout(requested_api: Option<&str>, timeout_ms: u64) {
    tracing::warn!(
        target: "audit",
        event = "decision_timeout",
        api_id = requested_api.unwrap_or("unknown"),
        timeout_ms = timeout_ms,
        "decision did not complete in time, request denied"
    );
}

pub fn audit_notification_rejected(destination: &str, reason: &str) {
    tracing::warn!(
        target: "audit",
        event = "notification_rejected",
        destination = destination,
        reason = reason,
        "notification not queued"
    );
}
