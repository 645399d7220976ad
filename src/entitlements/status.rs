use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// key: entitlement-status -> date-derived lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Pending,
    Trial,
    Active,
    CancellationPending,
    Cancelled,
    Expired,
}

impl SubscriptionStatus {
    /// Statuses that qualify a subscription for customer-level resolution.
    pub fn is_qualifying(self) -> bool {
        matches!(self, SubscriptionStatus::Active | SubscriptionStatus::Trial)
    }
}

/// Date fields a status is derived from. Status is never stored; it is
/// recomputed from these on every read.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StatusDates {
    pub activation_date: Option<DateTime<Utc>>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub cancellation_date: Option<DateTime<Utc>>,
    pub trial_end_date: Option<DateTime<Utc>>,
}

/// Maps a subscription's date fields and an injected `now` to its current
/// status. First match wins, top to bottom: an explicit cancellation
/// decision outranks every time-derived state, expiry outranks trial and
/// pending, and a future activation is reported before trial so unstarted
/// subscriptions never read as trialing.
pub fn compute_status(now: DateTime<Utc>, dates: &StatusDates) -> SubscriptionStatus {
    if let Some(cancellation) = dates.cancellation_date {
        if cancellation > now {
            return SubscriptionStatus::CancellationPending;
        }
        return SubscriptionStatus::Cancelled;
    }
    if let Some(expiration) = dates.expiration_date {
        if expiration <= now {
            return SubscriptionStatus::Expired;
        }
    }
    if let Some(activation) = dates.activation_date {
        if activation > now {
            return SubscriptionStatus::Pending;
        }
    }
    if let Some(trial_end) = dates.trial_end_date {
        if trial_end > now {
            return SubscriptionStatus::Trial;
        }
    }
    SubscriptionStatus::Active
}
