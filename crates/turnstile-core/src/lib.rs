pub mod model;
pub mod token;

pub use model::{
    Api, ApiPolicy, ApiStatus, Application, ApplicationKeyMapping, ApplicationPolicy, EntityKind,
    PolicyType, Subscription, SubscriptionKey, SubscriptionPolicy, TierLimits, Timestamp,
};
pub use token::{Claims, InvalidReason, KeyError, TokenValidator, TokenVerdict, VerificationKey};
