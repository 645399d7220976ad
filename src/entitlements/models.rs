use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EntitlementError, EntitlementResult};

use super::status::{compute_status, StatusDates, SubscriptionStatus};

/// key: entitlement-value-type -> toggle,numeric,text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureValueType {
    Toggle,
    Numeric,
    Text,
}

impl FeatureValueType {
    pub fn as_str(self) -> &'static str {
        match self {
            FeatureValueType::Toggle => "toggle",
            FeatureValueType::Numeric => "numeric",
            FeatureValueType::Text => "text",
        }
    }

    /// Write-path syntax check. The read path never calls this: stored
    /// values are returned as-is even when malformed.
    pub fn validate(self, value: &str) -> EntitlementResult<()> {
        let ok = match self {
            FeatureValueType::Toggle => value.eq_ignore_ascii_case("true")
                || value.eq_ignore_ascii_case("false"),
            FeatureValueType::Numeric => value
                .parse::<f64>()
                .map(|parsed| parsed.is_finite())
                .unwrap_or(false),
            FeatureValueType::Text => true,
        };
        if ok {
            Ok(())
        } else {
            Err(EntitlementError::InvalidValue {
                value_type: self.as_str(),
                value: value.to_string(),
            })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureStatus {
    Active,
    Archived,
}

/// key: entitlement-feature -> typed capability with default
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    pub id: Uuid,
    pub key: String,
    pub value_type: FeatureValueType,
    pub default_value: String,
    pub status: FeatureStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Feature {
    /// Validates `default_value` against `value_type`; this is the write
    /// path, so malformed defaults are rejected here and nowhere else.
    pub fn new(
        key: impl Into<String>,
        value_type: FeatureValueType,
        default_value: impl Into<String>,
        now: DateTime<Utc>,
    ) -> EntitlementResult<Self> {
        let default_value = default_value.into();
        value_type.validate(&default_value)?;
        Ok(Self {
            id: Uuid::new_v4(),
            key: key.into(),
            value_type,
            default_value,
            status: FeatureStatus::Active,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Per-feature value carried by a plan. The surrounding map is keyed by
/// feature id, which makes the one-entry-per-feature invariant structural.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanFeatureValue {
    pub value: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// key: entitlement-plan -> feature-value bundle under a product
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: Uuid,
    pub key: String,
    pub product_key: String,
    pub feature_values: BTreeMap<Uuid, PlanFeatureValue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Plan {
    pub fn new(
        key: impl Into<String>,
        product_key: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            key: key.into(),
            product_key: product_key.into(),
            feature_values: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn set_feature_value(
        &mut self,
        feature: &Feature,
        value: impl Into<String>,
        now: DateTime<Utc>,
    ) -> EntitlementResult<()> {
        let value = value.into();
        feature.value_type.validate(&value)?;
        match self.feature_values.entry(feature.id) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                entry.value = value;
                entry.updated_at = now;
            }
            Entry::Vacant(vacant) => {
                vacant.insert(PlanFeatureValue {
                    value,
                    created_at: now,
                    updated_at: now,
                });
            }
        }
        self.updated_at = now;
        Ok(())
    }

    pub fn feature_value(&self, feature_id: Uuid) -> Option<&str> {
        self.feature_values
            .get(&feature_id)
            .map(|entry| entry.value.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideKind {
    /// Survives renewal.
    Permanent,
    /// Cleared when the subscription renews.
    Temporary,
}

/// key: entitlement-override -> subscription-scoped plan exception
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureOverride {
    pub value: String,
    pub kind: OverrideKind,
    pub created_at: DateTime<Utc>,
}

/// key: entitlement-subscription -> customer/plan binding with dates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub key: String,
    pub customer_id: Uuid,
    pub plan_id: Uuid,
    pub billing_cycle_id: Uuid,
    pub activation_date: Option<DateTime<Utc>>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub cancellation_date: Option<DateTime<Utc>>,
    pub trial_end_date: Option<DateTime<Utc>>,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    /// Lifecycle gate: blocks every mutation, never changes computed status.
    pub archived: bool,
    pub feature_overrides: BTreeMap<Uuid, FeatureOverride>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn new(
        key: impl Into<String>,
        customer_id: Uuid,
        plan_id: Uuid,
        billing_cycle_id: Uuid,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            key: key.into(),
            customer_id,
            plan_id,
            billing_cycle_id,
            activation_date: None,
            expiration_date: None,
            cancellation_date: None,
            trial_end_date: None,
            current_period_start: None,
            current_period_end: None,
            archived: false,
            feature_overrides: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status_dates(&self) -> StatusDates {
        StatusDates {
            activation_date: self.activation_date,
            expiration_date: self.expiration_date,
            cancellation_date: self.cancellation_date,
            trial_end_date: self.trial_end_date,
        }
    }

    /// Current status, recomputed from the date fields on every read.
    pub fn status_at(&self, now: DateTime<Utc>) -> SubscriptionStatus {
        compute_status(now, &self.status_dates())
    }

    pub fn override_for(&self, feature_id: Uuid) -> Option<&FeatureOverride> {
        self.feature_overrides.get(&feature_id)
    }

    fn ensure_mutable(&self) -> EntitlementResult<()> {
        if self.archived {
            return Err(EntitlementError::SubscriptionArchived {
                key: self.key.clone(),
            });
        }
        Ok(())
    }

    /// Upsert: replaces any existing entry for the feature, so the map
    /// never holds two entries for one feature id.
    pub fn set_override(
        &mut self,
        feature_id: Uuid,
        value: impl Into<String>,
        kind: OverrideKind,
        now: DateTime<Utc>,
    ) -> EntitlementResult<()> {
        self.ensure_mutable()?;
        self.feature_overrides.insert(
            feature_id,
            FeatureOverride {
                value: value.into(),
                kind,
                created_at: now,
            },
        );
        self.updated_at = now;
        Ok(())
    }

    /// Silent no-op when no override exists for the feature.
    pub fn remove_override(
        &mut self,
        feature_id: Uuid,
        now: DateTime<Utc>,
    ) -> EntitlementResult<()> {
        self.ensure_mutable()?;
        if self.feature_overrides.remove(&feature_id).is_some() {
            self.updated_at = now;
        }
        Ok(())
    }

    /// Drops every temporary override, leaving permanent ones untouched.
    /// Invoked on renewal.
    pub fn clear_temporary_overrides(&mut self, now: DateTime<Utc>) -> EntitlementResult<()> {
        self.ensure_mutable()?;
        let before = self.feature_overrides.len();
        self.feature_overrides
            .retain(|_, entry| entry.kind == OverrideKind::Permanent);
        if self.feature_overrides.len() != before {
            self.updated_at = now;
        }
        Ok(())
    }

    pub fn activate(&mut self, now: DateTime<Utc>, at: DateTime<Utc>) -> EntitlementResult<()> {
        self.ensure_mutable()?;
        self.activation_date = Some(at);
        self.updated_at = now;
        tracing::info!(subscription = %self.key, activation = %at, "subscription activated");
        Ok(())
    }

    pub fn cancel(&mut self, now: DateTime<Utc>, at: DateTime<Utc>) -> EntitlementResult<()> {
        self.ensure_mutable()?;
        self.cancellation_date = Some(at);
        self.updated_at = now;
        tracing::info!(subscription = %self.key, cancellation = %at, "subscription cancelled");
        Ok(())
    }

    pub fn expire(&mut self, now: DateTime<Utc>, at: DateTime<Utc>) -> EntitlementResult<()> {
        self.ensure_mutable()?;
        self.expiration_date = Some(at);
        self.updated_at = now;
        tracing::info!(subscription = %self.key, expiration = %at, "subscription expired");
        Ok(())
    }

    /// Rolls the billing period forward and sheds temporary overrides.
    pub fn renew(
        &mut self,
        now: DateTime<Utc>,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> EntitlementResult<()> {
        self.ensure_mutable()?;
        self.current_period_start = Some(period_start);
        self.current_period_end = Some(period_end);
        self.clear_temporary_overrides(now)?;
        self.updated_at = now;
        tracing::info!(
            subscription = %self.key,
            period_start = %period_start,
            period_end = %period_end,
            "subscription renewed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn frozen_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn subscription(now: DateTime<Utc>) -> Subscription {
        Subscription::new(
            "sub-test",
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            now,
        )
    }

    #[test]
    fn toggle_validation_is_case_insensitive() {
        assert!(FeatureValueType::Toggle.validate("TRUE").is_ok());
        assert!(FeatureValueType::Toggle.validate("false").is_ok());
        let err = FeatureValueType::Toggle.validate("yes").unwrap_err();
        assert_eq!(
            err,
            EntitlementError::InvalidValue {
                value_type: "toggle",
                value: "yes".to_string(),
            }
        );
    }

    #[test]
    fn numeric_validation_requires_finite_numbers() {
        assert!(FeatureValueType::Numeric.validate("42").is_ok());
        assert!(FeatureValueType::Numeric.validate("-3.5").is_ok());
        assert!(FeatureValueType::Numeric.validate("inf").is_err());
        assert!(FeatureValueType::Numeric.validate("ten").is_err());
    }

    #[test]
    fn feature_constructor_rejects_malformed_default() {
        let err = Feature::new("seats", FeatureValueType::Numeric, "lots", frozen_now())
            .expect_err("non-numeric default should be rejected at write time");
        assert!(matches!(err, EntitlementError::InvalidValue { .. }));
    }

    #[test]
    fn repeated_set_override_keeps_a_single_entry() {
        let now = frozen_now();
        let mut sub = subscription(now);
        let feature_id = Uuid::new_v4();

        sub.set_override(feature_id, "10", OverrideKind::Permanent, now)
            .unwrap();
        sub.set_override(feature_id, "10", OverrideKind::Permanent, now)
            .unwrap();

        assert_eq!(sub.feature_overrides.len(), 1);
        assert_eq!(sub.override_for(feature_id).unwrap().value, "10");
    }

    #[test]
    fn set_override_replaces_value_and_kind() {
        let now = frozen_now();
        let mut sub = subscription(now);
        let feature_id = Uuid::new_v4();

        sub.set_override(feature_id, "10", OverrideKind::Temporary, now)
            .unwrap();
        sub.set_override(feature_id, "25", OverrideKind::Permanent, now)
            .unwrap();

        let entry = sub.override_for(feature_id).unwrap();
        assert_eq!(entry.value, "25");
        assert_eq!(entry.kind, OverrideKind::Permanent);
        assert_eq!(sub.feature_overrides.len(), 1);
    }

    #[test]
    fn remove_override_is_a_noop_when_absent() {
        let now = frozen_now();
        let mut sub = subscription(now);
        let stamped = sub.updated_at;

        sub.remove_override(Uuid::new_v4(), now + Duration::hours(1))
            .unwrap();

        assert_eq!(sub.updated_at, stamped, "absent removal must not restamp");
    }

    #[test]
    fn clear_temporary_preserves_permanent_entries() {
        let now = frozen_now();
        let mut sub = subscription(now);
        let permanent = Uuid::new_v4();
        let temporary_a = Uuid::new_v4();
        let temporary_b = Uuid::new_v4();

        sub.set_override(permanent, "keep", OverrideKind::Permanent, now)
            .unwrap();
        sub.set_override(temporary_a, "drop", OverrideKind::Temporary, now)
            .unwrap();
        sub.set_override(temporary_b, "drop", OverrideKind::Temporary, now)
            .unwrap();

        sub.clear_temporary_overrides(now).unwrap();

        assert_eq!(sub.feature_overrides.len(), 1);
        let survivor = sub.override_for(permanent).unwrap();
        assert_eq!(survivor.value, "keep");
        assert_eq!(survivor.kind, OverrideKind::Permanent);
    }

    #[test]
    fn renew_clears_temporary_overrides_and_rolls_period() {
        let now = frozen_now();
        let mut sub = subscription(now);
        let permanent = Uuid::new_v4();
        let temporary = Uuid::new_v4();
        sub.set_override(permanent, "keep", OverrideKind::Permanent, now)
            .unwrap();
        sub.set_override(temporary, "drop", OverrideKind::Temporary, now)
            .unwrap();

        let later = now + Duration::days(30);
        sub.renew(later, later, later + Duration::days(30)).unwrap();

        assert_eq!(sub.feature_overrides.len(), 1);
        assert!(sub.override_for(permanent).is_some());
        assert_eq!(sub.current_period_start, Some(later));
        assert_eq!(sub.updated_at, later);
    }

    #[test]
    fn archived_subscription_rejects_every_mutation() {
        let now = frozen_now();
        let mut sub = subscription(now);
        sub.archived = true;

        let feature_id = Uuid::new_v4();
        let archived = EntitlementError::SubscriptionArchived {
            key: "sub-test".to_string(),
        };
        assert_eq!(
            sub.set_override(feature_id, "1", OverrideKind::Permanent, now),
            Err(archived.clone())
        );
        assert_eq!(sub.remove_override(feature_id, now), Err(archived.clone()));
        assert_eq!(sub.clear_temporary_overrides(now), Err(archived.clone()));
        assert_eq!(sub.cancel(now, now), Err(archived.clone()));
        assert_eq!(
            sub.renew(now, now, now + Duration::days(30)),
            Err(archived)
        );
    }

    #[test]
    fn archived_flag_never_changes_computed_status() {
        let now = frozen_now();
        let mut sub = subscription(now);
        sub.trial_end_date = Some(now + Duration::days(3));
        sub.archived = true;
        assert_eq!(sub.status_at(now), SubscriptionStatus::Trial);
    }

    #[test]
    fn plan_feature_values_hold_one_entry_per_feature() {
        let now = frozen_now();
        let feature = Feature::new("seats", FeatureValueType::Numeric, "5", now).unwrap();
        let mut plan = Plan::new("starter", "analytics", now);

        plan.set_feature_value(&feature, "10", now).unwrap();
        plan.set_feature_value(&feature, "20", now + Duration::hours(1))
            .unwrap();

        assert_eq!(plan.feature_values.len(), 1);
        assert_eq!(plan.feature_value(feature.id), Some("20"));
        let entry = plan.feature_values.get(&feature.id).unwrap();
        assert_eq!(entry.created_at, now);
        assert_eq!(entry.updated_at, now + Duration::hours(1));
    }

    #[test]
    fn enums_serialize_as_snake_case_strings() {
        assert_eq!(
            serde_json::to_value(OverrideKind::Temporary).unwrap(),
            serde_json::json!("temporary")
        );
        assert_eq!(
            serde_json::to_value(FeatureValueType::Toggle).unwrap(),
            serde_json::json!("toggle")
        );
        assert_eq!(
            serde_json::to_value(FeatureStatus::Archived).unwrap(),
            serde_json::json!("archived")
        );
    }

    #[test]
    fn plan_rejects_value_that_fails_feature_syntax() {
        let now = frozen_now();
        let feature = Feature::new("beta", FeatureValueType::Toggle, "false", now).unwrap();
        let mut plan = Plan::new("starter", "analytics", now);
        assert!(plan.set_feature_value(&feature, "maybe", now).is_err());
    }
}
