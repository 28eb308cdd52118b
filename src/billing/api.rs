use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::contracts::{BootstrapSubscription, PermissionSet};
use crate::error::AppResult;
use crate::extractor::AuthUser;

use super::{Plan, Subscription, SubscriptionDetails, SubscriptionService};

/// key: billing-api -> rest endpoints
pub async fn list_plans(
    Extension(service): Extension<Arc<SubscriptionService>>,
) -> AppResult<Json<Vec<Plan>>> {
    Ok(Json(service.list_plans().await?))
}

pub async fn get_subscription(
    Extension(service): Extension<Arc<SubscriptionService>>,
    user: AuthUser,
) -> AppResult<Json<SubscriptionDetails>> {
    Ok(Json(service.subscription_details(user.user_id).await?))
}

pub async fn change_subscription(
    Extension(service): Extension<Arc<SubscriptionService>>,
    user: AuthUser,
    Json(payload): Json<ChangePlanRequest>,
) -> AppResult<Json<SubscriptionEnvelope>> {
    // The quota sync ticket is dropped here; the response never waits on it.
    let change = service.change_plan(user.user_id, payload.plan_id).await?;
    Ok(Json(SubscriptionEnvelope {
        subscription: change.subscription,
        plan: change.plan,
    }))
}

/// key: billing-internal-api -> sibling boundary endpoints
pub async fn internal_permissions(
    Extension(service): Extension<Arc<SubscriptionService>>,
    Path(user_id): Path<i64>,
) -> AppResult<Json<PermissionSet>> {
    Ok(Json(service.permissions(user_id).await?))
}

pub async fn internal_create_subscription(
    Extension(service): Extension<Arc<SubscriptionService>>,
    Json(payload): Json<BootstrapSubscription>,
) -> AppResult<(StatusCode, Json<Subscription>)> {
    let subscription = service
        .create_initial_subscription(payload.user_id, &payload.plan_name)
        .await?;
    Ok((StatusCode::CREATED, Json(subscription)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePlanRequest {
    pub plan_id: i64,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionEnvelope {
    pub subscription: Subscription,
    pub plan: Plan,
}
