use std::fmt;

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use turnstile_core::{PolicyType, Timestamp};

use super::payload::{
    ApiEvent, ApiPolicyEvent, ApplicationEvent, ApplicationPolicyEvent,
    ApplicationRegistrationEvent, PolicyDiscriminator, SubscriptionEvent, SubscriptionPolicyEvent,
};

/// Standard alphabet, padding optional.
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

pub const EVENT_TYPE_FIELD: &str = "eventType";
pub const TIMESTAMP_FIELD: &str = "timestamp";
pub const EVENT_FIELD: &str = "event";

/// A message as delivered by the notification channel: a destination name and
/// a flat map body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEnvelope {
    pub destination: String,
    #[serde(default)]
    pub body: Option<Map<String, Value>>,
}

impl NotificationEnvelope {
    pub fn new(destination: impl Into<String>, body: Map<String, Value>) -> Self {
        Self {
            destination: destination.into(),
            body: Some(body),
        }
    }

    /// Builds a well-formed notification, encoding `payload` the way the
    /// publisher does.
    pub fn notification(
        destination: impl Into<String>,
        event_type: &str,
        timestamp: i64,
        payload: &Value,
    ) -> Self {
        let mut body = Map::new();
        body.insert(EVENT_TYPE_FIELD.to_string(), Value::from(event_type));
        body.insert(TIMESTAMP_FIELD.to_string(), Value::from(timestamp));
        body.insert(
            EVENT_FIELD.to_string(),
            Value::from(PAYLOAD_ENGINE.encode(payload.to_string())),
        );
        Self::new(destination, body)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    ApplicationCreate,
    ApplicationUpdate,
    ApplicationDelete,
    SubscriptionsCreate,
    SubscriptionsUpdate,
    SubscriptionsDelete,
    ApiUpdate,
    ApiLifecycleChange,
    ApiDelete,
    ApplicationRegistrationCreate,
    PolicyCreate,
    PolicyUpdate,
    PolicyDelete,
    Unknown(String),
}

impl EventType {
    pub fn parse(tag: &str) -> Self {
        match tag {
            "APPLICATION_CREATE" => EventType::ApplicationCreate,
            "APPLICATION_UPDATE" => EventType::ApplicationUpdate,
            "APPLICATION_DELETE" => EventType::ApplicationDelete,
            "SUBSCRIPTIONS_CREATE" => EventType::SubscriptionsCreate,
            "SUBSCRIPTIONS_UPDATE" => EventType::SubscriptionsUpdate,
            "SUBSCRIPTIONS_DELETE" => EventType::SubscriptionsDelete,
            "API_UPDATE" => EventType::ApiUpdate,
            "API_LIFECYCLE_CHANGE" => EventType::ApiLifecycleChange,
            "API_DELETE" => EventType::ApiDelete,
            "APPLICATION_REGISTRATION_CREATE" => EventType::ApplicationRegistrationCreate,
            "POLICY_CREATE" => EventType::PolicyCreate,
            "POLICY_UPDATE" => EventType::PolicyUpdate,
            "POLICY_DELETE" => EventType::PolicyDelete,
            other => EventType::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventType::ApplicationCreate => "APPLICATION_CREATE",
            EventType::ApplicationUpdate => "APPLICATION_UPDATE",
            EventType::ApplicationDelete => "APPLICATION_DELETE",
            EventType::SubscriptionsCreate => "SUBSCRIPTIONS_CREATE",
            EventType::SubscriptionsUpdate => "SUBSCRIPTIONS_UPDATE",
            EventType::SubscriptionsDelete => "SUBSCRIPTIONS_DELETE",
            EventType::ApiUpdate => "API_UPDATE",
            EventType::ApiLifecycleChange => "API_LIFECYCLE_CHANGE",
            EventType::ApiDelete => "API_DELETE",
            EventType::ApplicationRegistrationCreate => "APPLICATION_REGISTRATION_CREATE",
            EventType::PolicyCreate => "POLICY_CREATE",
            EventType::PolicyUpdate => "POLICY_UPDATE",
            EventType::PolicyDelete => "POLICY_DELETE",
            EventType::Unknown(tag) => tag,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("field '{0}' has an unexpected type")]
    InvalidField(&'static str),

    #[error("event payload is not valid base64: {0}")]
    Base64(String),

    #[error("event payload is not valid UTF-8")]
    Utf8,

    #[error("invalid {event_type} payload: {message}")]
    Payload { event_type: String, message: String },
}

#[derive(Debug, Clone)]
pub enum PolicyEvent {
    Api(ApiPolicyEvent),
    Subscription(SubscriptionPolicyEvent),
    Application(ApplicationPolicyEvent),
}

/// The closed set of events the ingestor knows how to apply.
#[derive(Debug, Clone)]
pub enum NotificationEvent {
    ApplicationUpsert(ApplicationEvent),
    ApplicationDelete(ApplicationEvent),
    SubscriptionUpsert(SubscriptionEvent),
    SubscriptionDelete(SubscriptionEvent),
    ApiUpsert(ApiEvent),
    ApiLifecycleChange(ApiEvent),
    ApiDelete(ApiEvent),
    KeyMappingCreate(ApplicationRegistrationEvent),
    PolicyUpsert(PolicyEvent),
    PolicyDelete(PolicyEvent),
}

pub fn read_event_type(body: &Map<String, Value>) -> Result<Option<EventType>, DecodeError> {
    match body.get(EVENT_TYPE_FIELD) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(tag)) => Ok(Some(EventType::parse(tag))),
        Some(_) => Err(DecodeError::InvalidField(EVENT_TYPE_FIELD)),
    }
}

pub fn read_timestamp(body: &Map<String, Value>) -> Result<Timestamp, DecodeError> {
    match body.get(TIMESTAMP_FIELD) {
        None | Some(Value::Null) => Err(DecodeError::MissingField(TIMESTAMP_FIELD)),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Timestamp::new)
            .ok_or(DecodeError::InvalidField(TIMESTAMP_FIELD)),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Timestamp::new)
            .map_err(|_| DecodeError::InvalidField(TIMESTAMP_FIELD)),
        Some(_) => Err(DecodeError::InvalidField(TIMESTAMP_FIELD)),
    }
}

pub fn read_payload(body: &Map<String, Value>) -> Result<String, DecodeError> {
    let encoded = match body.get(EVENT_FIELD) {
        None | Some(Value::Null) => return Err(DecodeError::MissingField(EVENT_FIELD)),
        Some(Value::String(s)) => s,
        Some(_) => return Err(DecodeError::InvalidField(EVENT_FIELD)),
    };

    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = PAYLOAD_ENGINE
        .decode(compact.as_bytes())
        .map_err(|e| DecodeError::Base64(e.to_string()))?;
    String::from_utf8(bytes).map_err(|_| DecodeError::Utf8)
}

/// Decodes a known event type's payload into its typed record.
///
/// Must not be called with [`EventType::Unknown`].
pub fn decode_event(event_type: &EventType, payload: &str) -> Result<NotificationEvent, DecodeError> {
    let event = match event_type {
        EventType::ApplicationCreate | EventType::ApplicationUpdate => {
            NotificationEvent::ApplicationUpsert(parse(event_type, payload)?)
        }
        EventType::ApplicationDelete => {
            NotificationEvent::ApplicationDelete(parse(event_type, payload)?)
        }
        EventType::SubscriptionsCreate | EventType::SubscriptionsUpdate => {
            NotificationEvent::SubscriptionUpsert(parse(event_type, payload)?)
        }
        EventType::SubscriptionsDelete => {
            NotificationEvent::SubscriptionDelete(parse(event_type, payload)?)
        }
        EventType::ApiUpdate => NotificationEvent::ApiUpsert(parse(event_type, payload)?),
        EventType::ApiLifecycleChange => {
            NotificationEvent::ApiLifecycleChange(parse(event_type, payload)?)
        }
        EventType::ApiDelete => NotificationEvent::ApiDelete(parse(event_type, payload)?),
        EventType::ApplicationRegistrationCreate => {
            NotificationEvent::KeyMappingCreate(parse(event_type, payload)?)
        }
        EventType::PolicyCreate | EventType::PolicyUpdate => {
            NotificationEvent::PolicyUpsert(decode_policy(event_type, payload)?)
        }
        EventType::PolicyDelete => {
            NotificationEvent::PolicyDelete(decode_policy(event_type, payload)?)
        }
        EventType::Unknown(tag) => {
            return Err(DecodeError::Payload {
                event_type: tag.clone(),
                message: "unknown event type".to_string(),
            });
        }
    };
    Ok(event)
}

fn decode_policy(event_type: &EventType, payload: &str) -> Result<PolicyEvent, DecodeError> {
    let discriminator: PolicyDiscriminator = parse(event_type, payload)?;
    let policy = match discriminator.policy_type {
        PolicyType::Api => PolicyEvent::Api(parse(event_type, payload)?),
        PolicyType::Subscription => PolicyEvent::Subscription(parse(event_type, payload)?),
        PolicyType::Application => PolicyEvent::Application(parse(event_type, payload)?),
    };
    Ok(policy)
}

fn parse<T: DeserializeOwned>(event_type: &EventType, payload: &str) -> Result<T, DecodeError> {
    serde_json::from_str(payload).map_err(|e| DecodeError::Payload {
        event_type: event_type.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn event_type_round_trips_known_tags() {
        for tag in [
            "APPLICATION_CREATE",
            "SUBSCRIPTIONS_DELETE",
            "API_LIFECYCLE_CHANGE",
            "APPLICATION_REGISTRATION_CREATE",
            "POLICY_UPDATE",
        ] {
            let parsed = EventType::parse(tag);
            assert!(!matches!(parsed, EventType::Unknown(_)), "{tag}");
            assert_eq!(parsed.as_str(), tag);
        }
    }

    #[test]
    fn unlisted_tag_is_unknown() {
        assert_eq!(
            EventType::parse("API_CREATE"),
            EventType::Unknown("API_CREATE".to_string())
        );
        assert_eq!(
            EventType::parse("application_create"),
            EventType::Unknown("application_create".to_string())
        );
    }

    #[test]
    fn missing_event_type_is_none() {
        let map = body(json!({ "timestamp": 1 }));
        assert_eq!(read_event_type(&map), Ok(None));
    }

    #[test]
    fn non_string_event_type_is_invalid() {
        let map = body(json!({ "eventType": 7 }));
        assert_eq!(
            read_event_type(&map),
            Err(DecodeError::InvalidField(EVENT_TYPE_FIELD))
        );
    }

    #[test]
    fn timestamp_accepts_integer_and_numeric_string() {
        let map = body(json!({ "timestamp": 1_700_000_000_000_i64 }));
        assert_eq!(read_timestamp(&map), Ok(Timestamp::new(1_700_000_000_000)));

        let map = body(json!({ "timestamp": " 42 " }));
        assert_eq!(read_timestamp(&map), Ok(Timestamp::new(42)));
    }

    #[test]
    fn timestamp_rejects_missing_and_fractional() {
        let map = body(json!({}));
        assert_eq!(
            read_timestamp(&map),
            Err(DecodeError::MissingField(TIMESTAMP_FIELD))
        );

        let map = body(json!({ "timestamp": 1.5 }));
        assert_eq!(
            read_timestamp(&map),
            Err(DecodeError::InvalidField(TIMESTAMP_FIELD))
        );
    }

    #[test]
    fn payload_accepts_unpadded_and_wrapped_base64() {
        // {"a":1} is eyJhIjoxfQ== when padded
        let map = body(json!({ "event": "eyJhIjox\nfQ" }));
        assert_eq!(read_payload(&map).unwrap(), r#"{"a":1}"#);
    }

    #[test]
    fn payload_rejects_bad_base64() {
        let map = body(json!({ "event": "not*base64" }));
        assert!(matches!(read_payload(&map), Err(DecodeError::Base64(_))));
    }

    #[test]
    fn notification_builder_encodes_payload() {
        let envelope = NotificationEnvelope::notification(
            "notification",
            "API_DELETE",
            10,
            &json!({ "apiId": "api-1" }),
        );
        let map = envelope.body.unwrap();
        assert_eq!(read_timestamp(&map), Ok(Timestamp::new(10)));
        let payload: Value = serde_json::from_str(&read_payload(&map).unwrap()).unwrap();
        assert_eq!(payload, json!({ "apiId": "api-1" }));
    }

    #[test]
    fn decode_event_selects_policy_kind_from_discriminator() {
        let payload = json!({
            "policyId": 2,
            "policyName": "Bronze",
            "policyType": "APPLICATION",
        })
        .to_string();

        let event = decode_event(&EventType::PolicyCreate, &payload).unwrap();
        match event {
            NotificationEvent::PolicyUpsert(PolicyEvent::Application(p)) => {
                assert_eq!(p.policy_name, "Bronze");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn decode_event_reports_payload_errors_with_event_type() {
        let err = decode_event(&EventType::ApiDelete, "{}").unwrap_err();
        match err {
            DecodeError::Payload { event_type, .. } => assert_eq!(event_type, "API_DELETE"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn policy_payload_without_discriminator_is_rejected() {
        let payload = json!({ "policyName": "Gold" }).to_string();
        assert!(decode_event(&EventType::PolicyDelete, &payload).is_err());
    }
}
