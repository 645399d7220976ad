use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::error::EntitlementError;

use super::models::{Feature, Plan, Subscription};
use super::resolver::{resolve_across_customer, resolve_value};
use super::store::{FeatureStore, PlanStore, SubscriptionStore};

/// key: entitlement-service -> customer/batch resolution over stores
///
/// Pure resolution lifted over the repository collaborators. Callers pass
/// `now` explicitly and should read it once per request so a multi-feature
/// batch sees one consistent clock.
#[derive(Clone)]
pub struct EntitlementService {
    features: Arc<dyn FeatureStore>,
    plans: Arc<dyn PlanStore>,
    subscriptions: Arc<dyn SubscriptionStore>,
}

impl EntitlementService {
    pub fn new(
        features: Arc<dyn FeatureStore>,
        plans: Arc<dyn PlanStore>,
        subscriptions: Arc<dyn SubscriptionStore>,
    ) -> Self {
        Self {
            features,
            plans,
            subscriptions,
        }
    }

    /// Resolves one feature across the customer's qualifying subscriptions
    /// within a product: Active or Trial status, plan owned by the product,
    /// ordered by creation time ascending. First override anywhere in the
    /// set wins, then the first subscription's resolved value, then the
    /// feature default.
    pub async fn value_for_customer(
        &self,
        customer_id: Uuid,
        product_key: &str,
        feature: &Feature,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let (qualifying, plans) = self.qualifying_set(customer_id, product_key, now).await?;
        let ordered: Vec<(&Subscription, Option<&Plan>)> = qualifying
            .iter()
            .map(|sub| (sub, plans.get(&sub.plan_id)))
            .collect();
        Ok(resolve_across_customer(feature, &ordered))
    }

    /// Resolves every feature of the product for the customer. Exactly
    /// three store round trips regardless of feature count: subscriptions
    /// by customer, plans by id set, features by product.
    pub async fn all_features_for_customer(
        &self,
        customer_id: Uuid,
        product_key: &str,
        now: DateTime<Utc>,
    ) -> Result<BTreeMap<String, String>> {
        let (qualifying, plans) = self.qualifying_set(customer_id, product_key, now).await?;
        let ordered: Vec<(&Subscription, Option<&Plan>)> = qualifying
            .iter()
            .map(|sub| (sub, plans.get(&sub.plan_id)))
            .collect();

        let features = self.features.features_for_product(product_key).await?;
        let mut resolved = BTreeMap::new();
        for feature in &features {
            resolved.insert(
                feature.key.clone(),
                resolve_across_customer(feature, &ordered),
            );
        }
        Ok(resolved)
    }

    /// Resolves every feature of the subscription's plan's product against
    /// that single subscription. No status filter: an expired or cancelled
    /// subscription can still be inspected directly by key.
    pub async fn all_features_for_subscription(
        &self,
        subscription_key: &str,
    ) -> Result<BTreeMap<String, String>> {
        let Some(subscription) = self
            .subscriptions
            .subscription_by_key(subscription_key)
            .await?
        else {
            return Err(EntitlementError::SubscriptionNotFound {
                key: subscription_key.to_string(),
            }
            .into());
        };

        let Some(plan) = self.plans.plan_by_id(subscription.plan_id).await? else {
            warn!(
                subscription = %subscription.key,
                plan_id = %subscription.plan_id,
                "plan missing for subscription; no product to enumerate features from"
            );
            return Ok(BTreeMap::new());
        };

        let features = self.features.features_for_product(&plan.product_key).await?;
        let mut resolved = BTreeMap::new();
        for feature in &features {
            resolved.insert(
                feature.key.clone(),
                resolve_value(feature, Some(&plan), &subscription),
            );
        }
        Ok(resolved)
    }

    /// Loads the customer's subscriptions and their plans (one batch each),
    /// then keeps subscriptions whose plan belongs to the product and whose
    /// computed status qualifies, ordered by `(created_at, id)` ascending so
    /// resolution never depends on incidental container order.
    async fn qualifying_set(
        &self,
        customer_id: Uuid,
        product_key: &str,
        now: DateTime<Utc>,
    ) -> Result<(Vec<Subscription>, HashMap<Uuid, Plan>)> {
        let mut subscriptions = self
            .subscriptions
            .subscriptions_for_customer(customer_id)
            .await?;
        subscriptions.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));

        let plan_ids: Vec<Uuid> = subscriptions
            .iter()
            .map(|sub| sub.plan_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let plans: HashMap<Uuid, Plan> = self
            .plans
            .plans_by_ids(&plan_ids)
            .await?
            .into_iter()
            .map(|plan| (plan.id, plan))
            .collect();

        let qualifying = subscriptions
            .into_iter()
            .filter(|sub| {
                let Some(plan) = plans.get(&sub.plan_id) else {
                    warn!(
                        subscription = %sub.key,
                        plan_id = %sub.plan_id,
                        "plan missing for subscription; excluded from customer resolution"
                    );
                    return false;
                };
                plan.product_key == product_key && sub.status_at(now).is_qualifying()
            })
            .collect();

        Ok((qualifying, plans))
    }
}
