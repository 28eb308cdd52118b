use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::contracts::UserDetails;
use crate::error::{AppError, AppResult};
use crate::extractor::{AdminUser, AuthUser, AUTH_COOKIE};

use super::models::User;
use super::service::AccountService;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct UpdateUserRequest {
    pub email: String,
    pub role: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// key: identity-api -> registration, login, profile
pub async fn register_user(
    Extension(accounts): Extension<Arc<AccountService>>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    let user = accounts.register(&payload.email, &payload.password).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn login_user(
    Extension(accounts): Extension<Arc<AccountService>>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<(HeaderMap, Json<LoginResponse>)> {
    let issued = accounts.login(&payload.email, &payload.password).await?;
    let cookie = HeaderValue::from_str(&format!(
        "{AUTH_COOKIE}={}; HttpOnly; Secure; SameSite=Strict; Path=/",
        issued.token
    ))
    .map_err(|e| AppError::Message(format!("invalid cookie value: {e}")))?;
    let mut headers = HeaderMap::new();
    headers.insert(header::SET_COOKIE, cookie);
    Ok((
        headers,
        Json(LoginResponse {
            token: issued.token,
            expires_at: issued.expires_at,
        }),
    ))
}

pub async fn logout_user() -> (HeaderMap, &'static str) {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_static("auth_token=deleted; HttpOnly; Path=/; Max-Age=0"),
    );
    (headers, "Logged out")
}

pub async fn current_user(
    Extension(accounts): Extension<Arc<AccountService>>,
    user: AuthUser,
) -> AppResult<Json<User>> {
    Ok(Json(accounts.profile(user.user_id).await?))
}

/// key: identity-admin-api -> user management for the ADMIN role
pub async fn list_users(
    Extension(accounts): Extension<Arc<AccountService>>,
    _admin: AdminUser,
) -> AppResult<Json<Vec<User>>> {
    Ok(Json(accounts.list_users().await?))
}

pub async fn update_user(
    Extension(accounts): Extension<Arc<AccountService>>,
    admin: AdminUser,
    Path(user_id): Path<i64>,
    Json(payload): Json<UpdateUserRequest>,
) -> AppResult<Json<User>> {
    tracing::debug!(admin_id = admin.0.user_id, %user_id, "admin user update");
    let user = accounts
        .update_user(user_id, &payload.email, &payload.role)
        .await?;
    Ok(Json(user))
}

/// key: identity-internal-api -> user lookup for the quota synchronizer
pub async fn internal_user_details(
    Extension(accounts): Extension<Arc<AccountService>>,
    Path(user_id): Path<i64>,
) -> AppResult<Json<UserDetails>> {
    Ok(Json(accounts.user_details(user_id).await?))
}
