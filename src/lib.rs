pub mod entitlements;
pub mod error;

pub use entitlements::{
    compute_status, resolve_across_customer, resolve_value, EntitlementService, Feature,
    FeatureOverride, FeatureStatus, FeatureStore, FeatureValueType, MemoryStore, OverrideKind,
    Plan, PlanFeatureValue, PlanStore, StatusDates, Subscription, SubscriptionStatus,
    SubscriptionStore,
};
pub use error::{EntitlementError, EntitlementResult};
