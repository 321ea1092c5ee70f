use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Event time carried by every store mutation, in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(i64);

impl Timestamp {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn saturating_sub_millis(&self, millis: i64) -> Self {
        Self(self.0.saturating_sub(millis))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Application,
    Subscription,
    Api,
    KeyMapping,
    ApiPolicy,
    SubscriptionPolicy,
    ApplicationPolicy,
}

impl EntityKind {
    pub const ALL: [EntityKind; 7] = [
        EntityKind::Application,
        EntityKind::Subscription,
        EntityKind::Api,
        EntityKind::KeyMapping,
        EntityKind::ApiPolicy,
        EntityKind::SubscriptionPolicy,
        EntityKind::ApplicationPolicy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Application => "application",
            EntityKind::Subscription => "subscription",
            EntityKind::Api => "api",
            EntityKind::KeyMapping => "key_mapping",
            EntityKind::ApiPolicy => "api_policy",
            EntityKind::SubscriptionPolicy => "subscription_policy",
            EntityKind::ApplicationPolicy => "application_policy",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Application {
    pub id: String,
    pub name: String,
    pub owner: String,
    pub policy: Option<String>,
    pub token_type: Option<String>,
    pub group_id: Option<String>,
    pub attributes: BTreeMap<String, String>,
}

/// Subscriptions are addressed by the application/API pair a decision asks about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SubscriptionKey {
    pub application_id: String,
    pub api_id: String,
}

impl SubscriptionKey {
    pub fn new(application_id: impl Into<String>, api_id: impl Into<String>) -> Self {
        Self {
            application_id: application_id.into(),
            api_id: api_id.into(),
        }
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.application_id, self.api_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subscription {
    pub id: String,
    pub application_id: String,
    pub api_id: String,
    pub policy: String,
    pub status: String,
}

impl Subscription {
    pub fn key(&self) -> SubscriptionKey {
        SubscriptionKey::new(&self.application_id, &self.api_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum ApiStatus {
    Created,
    Prototyped,
    Published,
    Blocked,
    Deprecated,
    Retired,
    Other(String),
}

impl ApiStatus {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_uppercase().as_str() {
            "CREATED" => ApiStatus::Created,
            "PROTOTYPED" => ApiStatus::Prototyped,
            "PUBLISHED" => ApiStatus::Published,
            "BLOCKED" => ApiStatus::Blocked,
            "DEPRECATED" => ApiStatus::Deprecated,
            "RETIRED" => ApiStatus::Retired,
            _ => ApiStatus::Other(label.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ApiStatus::Created => "CREATED",
            ApiStatus::Prototyped => "PROTOTYPED",
            ApiStatus::Published => "PUBLISHED",
            ApiStatus::Blocked => "BLOCKED",
            ApiStatus::Deprecated => "DEPRECATED",
            ApiStatus::Retired => "RETIRED",
            ApiStatus::Other(label) => label,
        }
    }

    /// CREATED and RETIRED APIs are not kept in the store at all.
    pub fn is_servable(&self) -> bool {
        !matches!(self, ApiStatus::Created | ApiStatus::Retired)
    }
}

impl fmt::Display for ApiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Api {
    pub id: String,
    pub name: String,
    pub context: String,
    pub version: String,
    pub provider: Option<String>,
    pub api_type: Option<String>,
    pub status: ApiStatus,
    pub policy: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicationKeyMapping {
    pub consumer_key: String,
    pub application_id: String,
    pub key_type: String,
    pub key_manager: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PolicyType {
    Api,
    Subscription,
    Application,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TierLimits {
    pub quota_type: Option<String>,
    pub request_count: Option<i64>,
    pub unit_time: Option<i64>,
    pub time_unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiPolicy {
    pub id: i64,
    pub name: String,
    pub applicable_level: Option<String>,
    pub limits: TierLimits,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionPolicy {
    pub id: i64,
    pub name: String,
    pub rate_limit_count: Option<i64>,
    pub rate_limit_time_unit: Option<String>,
    pub stop_on_quota_reach: bool,
    pub limits: TierLimits,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicationPolicy {
    pub id: i64,
    pub name: String,
    pub limits: TierLimits,
}
