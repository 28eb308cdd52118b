use std::sync::Arc;

use crate::error::{AppError, AppResult};

use super::models::Plan;
use super::store::EntitlementStore;

/// key: plan-resolver -> read-only plan lookups
#[derive(Clone)]
pub struct PlanResolver {
    store: Arc<dyn EntitlementStore>,
}

impl PlanResolver {
    pub fn new(store: Arc<dyn EntitlementStore>) -> Self {
        Self { store }
    }

    pub async fn find_by_id(&self, plan_id: i64) -> AppResult<Plan> {
        self.store
            .plan_by_id(plan_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("plan {plan_id}")))
    }

    pub async fn find_by_name(&self, name: &str) -> AppResult<Plan> {
        self.store
            .plan_by_name(name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("plan '{name}'")))
    }

    pub async fn list_active(&self) -> AppResult<Vec<Plan>> {
        self.store.active_plans().await
    }
}
