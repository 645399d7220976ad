pub mod models;
pub mod resolver;
pub mod service;
pub mod status;
pub mod store;

pub use models::{
    Feature, FeatureOverride, FeatureStatus, FeatureValueType, OverrideKind, Plan,
    PlanFeatureValue, Subscription,
};
pub use resolver::{resolve_across_customer, resolve_value};
pub use service::EntitlementService;
pub use status::{compute_status, StatusDates, SubscriptionStatus};
pub use store::{FeatureStore, MemoryStore, PlanStore, SubscriptionStore};
