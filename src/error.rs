use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EntitlementError {
    #[error("subscription `{key}` is archived and cannot be mutated")]
    SubscriptionArchived { key: String },
    #[error("subscription `{key}` not found")]
    SubscriptionNotFound { key: String },
    #[error("value `{value}` does not satisfy `{value_type}` syntax")]
    InvalidValue {
        value_type: &'static str,
        value: String,
    },
}

pub type EntitlementResult<T> = Result<T, EntitlementError>;
