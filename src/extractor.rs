use std::sync::Arc;

use axum::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};

use crate::contracts::{CredentialCodec, CredentialError, PermissionSet};
use crate::error::AppError;
use crate::identity::ADMIN_ROLE;

pub const AUTH_COOKIE: &str = "auth_token";

/// Caller identity and the entitlement snapshot frozen into its credential.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
    pub role: Option<String>,
    pub permissions: PermissionSet,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = token_from_cookie(parts)
            .or_else(|| token_from_bearer(parts))
            .ok_or(AppError::Unauthorized)?;
        let codec = parts
            .extensions
            .get::<Arc<CredentialCodec>>()
            .ok_or_else(|| AppError::Message("credential codec not configured".into()))?;
        let claims = codec.verify(&token).map_err(|err| {
            if matches!(err, CredentialError::Expired) {
                tracing::debug!("rejected expired credential");
            } else {
                tracing::debug!(%err, "rejected credential");
            }
            AppError::Unauthorized
        })?;
        Ok(AuthUser {
            user_id: claims.user_id,
            role: claims.role,
            permissions: claims.perms,
        })
    }
}

/// An authenticated caller whose credential carries the ADMIN role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if user.role.as_deref() != Some(ADMIN_ROLE) {
            tracing::debug!(user_id = user.user_id, "rejected non-admin caller");
            return Err(AppError::Forbidden("admin role required".into()));
        }
        Ok(AdminUser(user))
    }
}

fn token_from_cookie(parts: &Parts) -> Option<String> {
    let cookies = parts.headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|c| {
        c.trim()
            .strip_prefix(AUTH_COOKIE)
            .and_then(|rest| rest.strip_prefix('='))
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    })
}

fn token_from_bearer(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|s| s.trim().to_string())
}
