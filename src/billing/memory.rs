//! In-memory entitlement store for local runs and deterministic tests.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::contracts::PermissionSet;
use crate::error::{AppError, AppResult};

use super::models::{Plan, PlanAssignment, Subscription, SubscriptionStatus};
use super::store::EntitlementStore;

/// Subscriptions are keyed by user, so the map entry lock plays the role of the
/// row lock taken by the Postgres store.
#[derive(Default)]
pub struct InMemoryEntitlementStore {
    plans: DashMap<i64, Plan>,
    subscriptions: DashMap<i64, Subscription>,
    next_plan_id: AtomicI64,
    next_subscription_id: AtomicI64,
}

impl InMemoryEntitlementStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_plan(
        &self,
        name: &str,
        price_cents: i64,
        permissions: PermissionSet,
        is_active: bool,
    ) -> Plan {
        let now = Utc::now();
        let plan = Plan {
            id: self.next_plan_id.fetch_add(1, Ordering::SeqCst) + 1,
            name: name.to_string(),
            price_cents,
            permissions,
            is_active,
            created_at: now,
            updated_at: now,
        };
        self.plans.insert(plan.id, plan.clone());
        plan
    }

    pub fn set_plan_active(&self, plan_id: i64, is_active: bool) -> Option<Plan> {
        let mut plan = self.plans.get_mut(&plan_id)?;
        plan.is_active = is_active;
        plan.updated_at = Utc::now();
        Some(plan.value().clone())
    }

    pub fn set_subscription_status(
        &self,
        user_id: i64,
        status: SubscriptionStatus,
    ) -> Option<Subscription> {
        let mut subscription = self.subscriptions.get_mut(&user_id)?;
        subscription.status = status;
        subscription.updated_at = Utc::now();
        Some(subscription.value().clone())
    }
}

#[async_trait]
impl EntitlementStore for InMemoryEntitlementStore {
    async fn plan_by_id(&self, plan_id: i64) -> AppResult<Option<Plan>> {
        Ok(self.plans.get(&plan_id).map(|plan| plan.value().clone()))
    }

    async fn plan_by_name(&self, name: &str) -> AppResult<Option<Plan>> {
        Ok(self
            .plans
            .iter()
            .find(|plan| plan.name == name)
            .map(|plan| plan.value().clone()))
    }

    async fn active_plans(&self) -> AppResult<Vec<Plan>> {
        let mut plans: Vec<Plan> = self
            .plans
            .iter()
            .filter(|plan| plan.is_active)
            .map(|plan| plan.value().clone())
            .collect();
        plans.sort_by_key(|plan| (plan.price_cents, plan.id));
        Ok(plans)
    }

    async fn insert_subscription(
        &self,
        user_id: i64,
        assignment: PlanAssignment,
    ) -> AppResult<Subscription> {
        match self.subscriptions.entry(user_id) {
            Entry::Occupied(_) => Err(AppError::Conflict(
                "user already has a subscription".to_string(),
            )),
            Entry::Vacant(slot) => {
                let now = Utc::now();
                let subscription = Subscription {
                    id: self.next_subscription_id.fetch_add(1, Ordering::SeqCst) + 1,
                    user_id,
                    plan_id: assignment.plan_id,
                    status: SubscriptionStatus::Active,
                    starts_at: assignment.starts_at,
                    ends_at: assignment.ends_at,
                    created_at: now,
                    updated_at: now,
                };
                slot.insert(subscription.clone());
                Ok(subscription)
            }
        }
    }

    async fn assign_plan(
        &self,
        user_id: i64,
        assignment: PlanAssignment,
    ) -> AppResult<Option<Subscription>> {
        let Some(mut subscription) = self.subscriptions.get_mut(&user_id) else {
            return Ok(None);
        };
        match self.plans.get(&assignment.plan_id) {
            Some(plan) if plan.is_active => {}
            Some(_) => {
                return Err(AppError::Conflict(
                    "cannot switch to an inactive plan".to_string(),
                ))
            }
            None => return Err(AppError::NotFound("plan".to_string())),
        }
        subscription.plan_id = assignment.plan_id;
        subscription.status = SubscriptionStatus::Active;
        subscription.starts_at = assignment.starts_at;
        subscription.ends_at = assignment.ends_at;
        subscription.updated_at = Utc::now();
        Ok(Some(subscription.value().clone()))
    }

    async fn subscription_for_user(&self, user_id: i64) -> AppResult<Option<Subscription>> {
        Ok(self
            .subscriptions
            .get(&user_id)
            .map(|subscription| subscription.value().clone()))
    }

    async fn active_subscription(&self, user_id: i64) -> AppResult<Option<(Subscription, Plan)>> {
        let Some(subscription) = self
            .subscriptions
            .get(&user_id)
            .map(|subscription| subscription.value().clone())
        else {
            return Ok(None);
        };
        if !subscription.is_active() {
            return Ok(None);
        }
        let plan = self
            .plans
            .get(&subscription.plan_id)
            .map(|plan| plan.value().clone())
            .ok_or_else(|| AppError::Message(format!(
                "subscription {} references missing plan {}",
                subscription.id, subscription.plan_id
            )))?;
        Ok(Some((subscription, plan)))
    }
}
