use tracing::debug;

use super::models::{Feature, Plan, Subscription};

/// key: entitlement-resolver -> override,plan,default precedence
///
/// Resolves one feature for one subscription. `plan` may be `None` after
/// referential drift; resolution falls through to the feature default
/// instead of failing, so a dangling plan reference never blocks an
/// entitlement check. The stored string comes back untyped; interpreting
/// it against the feature's value type is the caller's job.
pub fn resolve_value(feature: &Feature, plan: Option<&Plan>, subscription: &Subscription) -> String {
    if let Some(entry) = subscription.override_for(feature.id) {
        return entry.value.clone();
    }
    if let Some(value) = plan.and_then(|plan| plan.feature_value(feature.id)) {
        return value.to_string();
    }
    feature.default_value.clone()
}

/// Resolves one feature across a customer's qualifying subscriptions,
/// already ordered by creation time ascending. An override anywhere in the
/// set wins over a non-overridden earlier subscription, so the whole set is
/// scanned for overrides before falling back to the first subscription's
/// resolved value. An empty set yields the feature default.
pub fn resolve_across_customer(
    feature: &Feature,
    qualifying: &[(&Subscription, Option<&Plan>)],
) -> String {
    for (subscription, _) in qualifying {
        if let Some(entry) = subscription.override_for(feature.id) {
            debug!(
                feature = %feature.key,
                subscription = %subscription.key,
                "override won customer-level resolution"
            );
            return entry.value.clone();
        }
    }
    match qualifying.first() {
        Some((subscription, plan)) => resolve_value(feature, *plan, subscription),
        None => feature.default_value.clone(),
    }
}
