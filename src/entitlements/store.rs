use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use super::models::{Feature, Plan, Subscription};

/// key: entitlement-feature-store -> product membership reads
///
/// Product↔feature membership is owned by this collaborator; the engine
/// only ever asks for one product's features, in one batch.
#[async_trait]
pub trait FeatureStore: Send + Sync {
    async fn features_for_product(&self, product_key: &str) -> Result<Vec<Feature>>;
}

/// key: entitlement-plan-store -> batch plan reads
#[async_trait]
pub trait PlanStore: Send + Sync {
    async fn plan_by_id(&self, id: Uuid) -> Result<Option<Plan>>;
    /// Must be a single round trip: the aggregate resolver calls this once
    /// per batch, never once per feature × subscription pair.
    async fn plans_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Plan>>;
}

/// key: entitlement-subscription-store -> customer and key reads
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn subscriptions_for_customer(&self, customer_id: Uuid) -> Result<Vec<Subscription>>;
    async fn subscription_by_key(&self, key: &str) -> Result<Option<Subscription>>;
}

/// In-memory reference store backing the test suite and embedders that
/// preload state. Insertion order carries no meaning; the service orders
/// qualifying subscriptions explicitly by creation time.
#[derive(Default)]
pub struct MemoryStore {
    features: DashMap<Uuid, Feature>,
    plans: DashMap<Uuid, Plan>,
    subscriptions: DashMap<Uuid, Subscription>,
    product_features: DashMap<String, Vec<Uuid>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_feature(&self, feature: Feature) {
        self.features.insert(feature.id, feature);
    }

    pub fn insert_plan(&self, plan: Plan) {
        self.plans.insert(plan.id, plan);
    }

    pub fn insert_subscription(&self, subscription: Subscription) {
        self.subscriptions.insert(subscription.id, subscription);
    }

    pub fn remove_plan(&self, id: Uuid) {
        self.plans.remove(&id);
    }

    /// Associates a feature with a product, keeping association order.
    pub fn associate_feature(&self, product_key: &str, feature_id: Uuid) {
        let mut members = self
            .product_features
            .entry(product_key.to_string())
            .or_default();
        if !members.contains(&feature_id) {
            members.push(feature_id);
        }
    }
}

#[async_trait]
impl FeatureStore for MemoryStore {
    async fn features_for_product(&self, product_key: &str) -> Result<Vec<Feature>> {
        let members = self
            .product_features
            .get(product_key)
            .map(|entry| entry.clone())
            .unwrap_or_default();
        Ok(members
            .iter()
            .filter_map(|id| self.features.get(id).map(|entry| entry.clone()))
            .collect())
    }
}

#[async_trait]
impl PlanStore for MemoryStore {
    async fn plan_by_id(&self, id: Uuid) -> Result<Option<Plan>> {
        Ok(self.plans.get(&id).map(|entry| entry.clone()))
    }

    async fn plans_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Plan>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.plans.get(id).map(|entry| entry.clone()))
            .collect())
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn subscriptions_for_customer(&self, customer_id: Uuid) -> Result<Vec<Subscription>> {
        Ok(self
            .subscriptions
            .iter()
            .filter(|entry| entry.customer_id == customer_id)
            .map(|entry| entry.clone())
            .collect())
    }

    async fn subscription_by_key(&self, key: &str) -> Result<Option<Subscription>> {
        Ok(self
            .subscriptions
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| entry.clone()))
    }
}
