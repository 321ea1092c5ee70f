use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};
use turnstile_core::{
    Api, ApiPolicy, ApiStatus, Application, ApplicationKeyMapping, ApplicationPolicy, PolicyType,
    Subscription, SubscriptionPolicy, TierLimits,
};

/// Upstream identifiers arrive either as JSON strings or as integers.
fn identifier<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Text(s) => Ok(s),
        Raw::Number(n) => Ok(n.to_string()),
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationEvent {
    #[serde(deserialize_with = "identifier")]
    pub application_id: String,
    #[serde(default)]
    pub application_name: String,
    #[serde(default)]
    pub subscriber: String,
    #[serde(default)]
    pub application_policy: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl From<ApplicationEvent> for Application {
    fn from(event: ApplicationEvent) -> Self {
        Application {
            id: event.application_id,
            name: event.application_name,
            owner: event.subscriber,
            policy: event.application_policy,
            token_type: event.token_type,
            group_id: event.group_id,
            attributes: event.attributes,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionEvent {
    #[serde(default, deserialize_with = "identifier")]
    pub subscription_id: String,
    #[serde(deserialize_with = "identifier")]
    pub application_id: String,
    #[serde(deserialize_with = "identifier")]
    pub api_id: String,
    #[serde(default)]
    pub policy_id: String,
    #[serde(default)]
    pub subscription_state: String,
}

impl From<SubscriptionEvent> for Subscription {
    fn from(event: SubscriptionEvent) -> Self {
        Subscription {
            id: event.subscription_id,
            application_id: event.application_id,
            api_id: event.api_id,
            policy: event.policy_id,
            status: event.subscription_state,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEvent {
    #[serde(deserialize_with = "identifier")]
    pub api_id: String,
    #[serde(default)]
    pub api_name: String,
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub api_context: String,
    #[serde(default)]
    pub api_provider: Option<String>,
    #[serde(default)]
    pub api_type: Option<String>,
    #[serde(default)]
    pub api_status: String,
    #[serde(default)]
    pub api_tier: Option<String>,
}

impl ApiEvent {
    pub fn status(&self) -> ApiStatus {
        ApiStatus::from_label(&self.api_status)
    }
}

impl From<ApiEvent> for Api {
    fn from(event: ApiEvent) -> Self {
        let status = event.status();
        Api {
            id: event.api_id,
            name: event.api_name,
            context: event.api_context,
            version: event.api_version,
            provider: event.api_provider,
            api_type: event.api_type,
            status,
            policy: event.api_tier,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationRegistrationEvent {
    #[serde(deserialize_with = "identifier")]
    pub application_id: String,
    pub consumer_key: String,
    #[serde(default)]
    pub key_type: String,
    #[serde(default)]
    pub key_manager: String,
}

impl From<ApplicationRegistrationEvent> for ApplicationKeyMapping {
    fn from(event: ApplicationRegistrationEvent) -> Self {
        ApplicationKeyMapping {
            consumer_key: event.consumer_key,
            application_id: event.application_id,
            key_type: event.key_type,
            key_manager: event.key_manager,
        }
    }
}

/// Only the discriminator; the full payload is decoded once the kind is known.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDiscriminator {
    pub policy_type: PolicyType,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitFields {
    #[serde(default)]
    pub quota_type: Option<String>,
    #[serde(default)]
    pub request_count: Option<i64>,
    #[serde(default)]
    pub unit_time: Option<i64>,
    #[serde(default)]
    pub time_unit: Option<String>,
}

impl From<LimitFields> for TierLimits {
    fn from(fields: LimitFields) -> Self {
        TierLimits {
            quota_type: fields.quota_type,
            request_count: fields.request_count,
            unit_time: fields.unit_time,
            time_unit: fields.time_unit,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiPolicyEvent {
    #[serde(default)]
    pub policy_id: i64,
    pub policy_name: String,
    #[serde(default)]
    pub applicable_level: Option<String>,
    #[serde(flatten)]
    pub limits: LimitFields,
}

impl From<ApiPolicyEvent> for ApiPolicy {
    fn from(event: ApiPolicyEvent) -> Self {
        ApiPolicy {
            id: event.policy_id,
            name: event.policy_name,
            applicable_level: event.applicable_level,
            limits: event.limits.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionPolicyEvent {
    #[serde(default)]
    pub policy_id: i64,
    pub policy_name: String,
    #[serde(default)]
    pub rate_limit_count: Option<i64>,
    #[serde(default)]
    pub rate_limit_time_unit: Option<String>,
    #[serde(default)]
    pub stop_on_quota_reach: bool,
    #[serde(flatten)]
    pub limits: LimitFields,
}

impl From<SubscriptionPolicyEvent> for SubscriptionPolicy {
    fn from(event: SubscriptionPolicyEvent) -> Self {
        SubscriptionPolicy {
            id: event.policy_id,
            name: event.policy_name,
            rate_limit_count: event.rate_limit_count,
            rate_limit_time_unit: event.rate_limit_time_unit,
            stop_on_quota_reach: event.stop_on_quota_reach,
            limits: event.limits.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationPolicyEvent {
    #[serde(default)]
    pub policy_id: i64,
    pub policy_name: String,
    #[serde(flatten)]
    pub limits: LimitFields,
}

impl From<ApplicationPolicyEvent> for ApplicationPolicy {
    fn from(event: ApplicationPolicyEvent) -> Self {
        ApplicationPolicy {
            id: event.policy_id,
            name: event.policy_name,
            limits: event.limits.into(),
        }
    }
}
