use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::contracts::PermissionSet;
use crate::error::{conflict_on, AppError, AppResult};

use super::models::{Plan, PlanAssignment, Subscription, SubscriptionStatus};

/// key: entitlement-store -> durable plans and subscriptions
///
/// `Ok(None)` is the "no rows" condition; every other storage fault is an `Err`.
#[async_trait]
pub trait EntitlementStore: Send + Sync {
    async fn plan_by_id(&self, plan_id: i64) -> AppResult<Option<Plan>>;

    async fn plan_by_name(&self, name: &str) -> AppResult<Option<Plan>>;

    /// Active plans, cheapest first.
    async fn active_plans(&self) -> AppResult<Vec<Plan>>;

    /// Creates the user's subscription row. A second row for the same user is a
    /// `Conflict`.
    async fn insert_subscription(
        &self,
        user_id: i64,
        assignment: PlanAssignment,
    ) -> AppResult<Subscription>;

    /// Rewrites plan, status and window of the user's row in one transaction.
    /// Returns `Ok(None)` when the user has no row and `Conflict` when the plan
    /// was deactivated after the caller validated it.
    async fn assign_plan(
        &self,
        user_id: i64,
        assignment: PlanAssignment,
    ) -> AppResult<Option<Subscription>>;

    async fn subscription_for_user(&self, user_id: i64) -> AppResult<Option<Subscription>>;

    async fn active_subscription(&self, user_id: i64) -> AppResult<Option<(Subscription, Plan)>>;
}

const SUBSCRIPTION_UNIQUE_USER: &str = "user_subscriptions_user_id_key";

#[derive(Clone)]
pub struct PgEntitlementStore {
    pool: PgPool,
}

impl PgEntitlementStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntitlementStore for PgEntitlementStore {
    async fn plan_by_id(&self, plan_id: i64) -> AppResult<Option<Plan>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, price_cents, permissions, is_active, created_at, updated_at
            FROM subscription_plans
            WHERE id = $1
            "#,
        )
        .bind(plan_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|row| plan_from_row(&row, "")).transpose()?)
    }

    async fn plan_by_name(&self, name: &str) -> AppResult<Option<Plan>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, price_cents, permissions, is_active, created_at, updated_at
            FROM subscription_plans
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|row| plan_from_row(&row, "")).transpose()?)
    }

    async fn active_plans(&self) -> AppResult<Vec<Plan>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, price_cents, permissions, is_active, created_at, updated_at
            FROM subscription_plans
            WHERE is_active = TRUE
            ORDER BY price_cents ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        let plans = rows
            .iter()
            .map(|row| plan_from_row(row, ""))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(plans)
    }

    async fn insert_subscription(
        &self,
        user_id: i64,
        assignment: PlanAssignment,
    ) -> AppResult<Subscription> {
        let row = sqlx::query(
            r#"
            INSERT INTO user_subscriptions (user_id, plan_id, status, starts_at, ends_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, plan_id, status, starts_at, ends_at, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(assignment.plan_id)
        .bind(SubscriptionStatus::Active.as_str())
        .bind(assignment.starts_at)
        .bind(assignment.ends_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            conflict_on(err, SUBSCRIPTION_UNIQUE_USER, "user already has a subscription")
        })?;
        Ok(subscription_from_row(&row)?)
    }

    async fn assign_plan(
        &self,
        user_id: i64,
        assignment: PlanAssignment,
    ) -> AppResult<Option<Subscription>> {
        let mut tx = self.pool.begin().await?;

        let locked: Option<i64> =
            sqlx::query_scalar("SELECT id FROM user_subscriptions WHERE user_id = $1 FOR UPDATE")
                .bind(user_id)
                .fetch_optional(&mut tx)
                .await?;
        if locked.is_none() {
            tx.rollback().await?;
            return Ok(None);
        }

        let plan_active: Option<bool> =
            sqlx::query_scalar("SELECT is_active FROM subscription_plans WHERE id = $1 FOR SHARE")
                .bind(assignment.plan_id)
                .fetch_optional(&mut tx)
                .await?;
        match plan_active {
            Some(true) => {}
            Some(false) => {
                tx.rollback().await?;
                return Err(AppError::Conflict(
                    "cannot switch to an inactive plan".to_string(),
                ));
            }
            None => {
                tx.rollback().await?;
                return Err(AppError::NotFound("plan".to_string()));
            }
        }

        let row = sqlx::query(
            r#"
            UPDATE user_subscriptions
            SET plan_id = $1,
                status = $2,
                starts_at = $3,
                ends_at = $4,
                updated_at = NOW()
            WHERE user_id = $5
            RETURNING id, user_id, plan_id, status, starts_at, ends_at, created_at, updated_at
            "#,
        )
        .bind(assignment.plan_id)
        .bind(SubscriptionStatus::Active.as_str())
        .bind(assignment.starts_at)
        .bind(assignment.ends_at)
        .bind(user_id)
        .fetch_one(&mut tx)
        .await?;
        let subscription = subscription_from_row(&row)?;

        tx.commit().await?;
        Ok(Some(subscription))
    }

    async fn subscription_for_user(&self, user_id: i64) -> AppResult<Option<Subscription>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, plan_id, status, starts_at, ends_at, created_at, updated_at
            FROM user_subscriptions
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|row| subscription_from_row(&row)).transpose()?)
    }

    async fn active_subscription(&self, user_id: i64) -> AppResult<Option<(Subscription, Plan)>> {
        let row = sqlx::query(
            r#"
            SELECT
                s.id,
                s.user_id,
                s.plan_id,
                s.status,
                s.starts_at,
                s.ends_at,
                s.created_at,
                s.updated_at,
                p.id AS p_id,
                p.name AS p_name,
                p.price_cents AS p_price_cents,
                p.permissions AS p_permissions,
                p.is_active AS p_is_active,
                p.created_at AS p_created_at,
                p.updated_at AS p_updated_at
            FROM user_subscriptions s
            JOIN subscription_plans p ON p.id = s.plan_id
            WHERE s.user_id = $1 AND s.status = 'ACTIVE'
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let subscription = subscription_from_row(&row)?;
        let plan = plan_from_row(&row, "p_")?;
        Ok(Some((subscription, plan)))
    }
}

// `prefix` selects the aliased plan columns of a joined row.
fn plan_from_row(row: &PgRow, prefix: &str) -> Result<Plan, sqlx::Error> {
    let column = |name: &str| format!("{prefix}{name}");
    let permissions: Value = row.try_get(column("permissions").as_str())?;
    Ok(Plan {
        id: row.try_get(column("id").as_str())?,
        name: row.try_get(column("name").as_str())?,
        price_cents: row.try_get(column("price_cents").as_str())?,
        permissions: PermissionSet::from_plan_value(permissions),
        is_active: row.try_get(column("is_active").as_str())?,
        created_at: row.try_get(column("created_at").as_str())?,
        updated_at: row.try_get(column("updated_at").as_str())?,
    })
}

fn subscription_from_row(row: &PgRow) -> Result<Subscription, sqlx::Error> {
    let status: String = row.try_get("status")?;
    let status = SubscriptionStatus::parse(&status)
        .ok_or_else(|| sqlx::Error::Decode(format!("unknown subscription status '{status}'").into()))?;
    Ok(Subscription {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        plan_id: row.try_get("plan_id")?,
        status,
        starts_at: row.try_get("starts_at")?,
        ends_at: row.try_get("ends_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
