use std::sync::Arc;

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Months, Utc};
use tracing::{info, warn};

use crate::clients::EntitlementGateway;
use crate::contracts::PermissionSet;
use crate::error::{AppError, AppResult};

use super::models::{Plan, PlanAssignment, Subscription, SubscriptionDetails};
use super::quota_sync::{QuotaSyncHandle, QuotaSyncTicket};
use super::resolver::PlanResolver;
use super::store::EntitlementStore;

/// Window granted to paid plans until the next billing event renews it.
pub const PAID_PLAN_WINDOW_DAYS: i64 = 30;
/// The free tier never lapses; 100 years stands in for "unbounded".
pub const FREE_PLAN_WINDOW_YEARS: u32 = 100;

/// Outcome of a committed plan change.
#[derive(Debug)]
pub struct PlanChange {
    pub subscription: Subscription,
    pub plan: Plan,
    /// Present when a quota sync job was queued.
    pub quota_sync: Option<QuotaSyncTicket>,
}

/// key: subscription-orchestrator -> plan changes and entitlement reads
#[derive(Clone)]
pub struct SubscriptionService {
    store: Arc<dyn EntitlementStore>,
    plans: PlanResolver,
    free_plan_name: String,
    quota_sync: Option<QuotaSyncHandle>,
}

impl SubscriptionService {
    pub fn new(
        store: Arc<dyn EntitlementStore>,
        free_plan_name: impl Into<String>,
        quota_sync: Option<QuotaSyncHandle>,
    ) -> Self {
        Self {
            plans: PlanResolver::new(store.clone()),
            store,
            free_plan_name: free_plan_name.into(),
            quota_sync,
        }
    }

    pub async fn list_plans(&self) -> AppResult<Vec<Plan>> {
        self.plans.list_active().await
    }

    pub async fn change_plan(&self, user_id: i64, new_plan_id: i64) -> AppResult<PlanChange> {
        self.change_plan_at(user_id, new_plan_id, Utc::now()).await
    }

    pub async fn change_plan_at(
        &self,
        user_id: i64,
        new_plan_id: i64,
        now: DateTime<Utc>,
    ) -> AppResult<PlanChange> {
        let plan = self.plans.find_by_id(new_plan_id).await?;
        if !plan.is_active {
            return Err(AppError::Conflict(
                "cannot switch to an inactive plan".to_string(),
            ));
        }

        let assignment = PlanAssignment {
            plan_id: plan.id,
            starts_at: now,
            ends_at: plan_window_end(&plan, &self.free_plan_name, now)?,
        };
        let subscription = self
            .store
            .assign_plan(user_id, assignment)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("subscription for user {user_id}")))?;

        info!(
            %user_id,
            plan_id = plan.id,
            plan = %plan.name,
            ends_at = %subscription.ends_at,
            "subscription plan changed"
        );

        let quota_sync = match &self.quota_sync {
            Some(handle) => handle.dispatch(user_id, plan.permissions.clone()),
            None => {
                warn!(%user_id, "quota sync disabled; external quota not updated");
                None
            }
        };

        Ok(PlanChange {
            subscription,
            plan,
            quota_sync,
        })
    }

    pub async fn create_initial_subscription(
        &self,
        user_id: i64,
        plan_name: &str,
    ) -> AppResult<Subscription> {
        self.create_initial_subscription_at(user_id, plan_name, Utc::now())
            .await
    }

    pub async fn create_initial_subscription_at(
        &self,
        user_id: i64,
        plan_name: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Subscription> {
        let plan = self.plans.find_by_name(plan_name).await?;
        if !plan.is_active {
            return Err(AppError::Conflict(format!(
                "plan '{plan_name}' is not active"
            )));
        }
        let subscription = self
            .store
            .insert_subscription(
                user_id,
                PlanAssignment {
                    plan_id: plan.id,
                    starts_at: now,
                    ends_at: free_window_end(now)?,
                },
            )
            .await?;
        info!(%user_id, plan = %plan.name, "initial subscription created");
        Ok(subscription)
    }

    /// Permissions of the user's ACTIVE subscription. No subscription is a valid
    /// low-privilege state and yields an empty set.
    pub async fn permissions(&self, user_id: i64) -> AppResult<PermissionSet> {
        Ok(self
            .store
            .active_subscription(user_id)
            .await?
            .map(|(_, plan)| plan.permissions)
            .unwrap_or_default())
    }

    pub async fn subscription_details(&self, user_id: i64) -> AppResult<SubscriptionDetails> {
        let (subscription, plan) = self
            .store
            .active_subscription(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("subscription".to_string()))?;
        Ok(SubscriptionDetails {
            plan_name: plan.name,
            status: subscription.status,
            ends_at: subscription.ends_at,
        })
    }
}

#[async_trait]
impl EntitlementGateway for SubscriptionService {
    async fn permissions_for(&self, user_id: i64) -> AnyResult<PermissionSet> {
        Ok(self.permissions(user_id).await?)
    }

    async fn bootstrap_subscription(&self, user_id: i64, plan_name: &str) -> AnyResult<()> {
        self.create_initial_subscription(user_id, plan_name).await?;
        Ok(())
    }
}

pub fn plan_window_end(
    plan: &Plan,
    free_plan_name: &str,
    now: DateTime<Utc>,
) -> AppResult<DateTime<Utc>> {
    if plan.name == free_plan_name {
        free_window_end(now)
    } else {
        now.checked_add_signed(Duration::days(PAID_PLAN_WINDOW_DAYS))
            .ok_or_else(|| window_overflow(now))
    }
}

fn free_window_end(now: DateTime<Utc>) -> AppResult<DateTime<Utc>> {
    now.checked_add_months(Months::new(FREE_PLAN_WINDOW_YEARS * 12))
        .ok_or_else(|| window_overflow(now))
}

fn window_overflow(now: DateTime<Utc>) -> AppError {
    AppError::Message(format!("subscription window starting at {now} is out of range"))
}
