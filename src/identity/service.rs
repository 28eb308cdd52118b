use std::sync::Arc;
use std::time::Duration;

use argon2::password_hash::{PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use once_cell::sync::Lazy;
use rand_core::OsRng;
use regex::Regex;
use tokio::time::timeout;
use tracing::{error, info};

use crate::clients::EntitlementGateway;
use crate::contracts::UserDetails;
use crate::error::{AppError, AppResult};

use super::credentials::{CredentialIssuer, IssuedCredential};
use super::models::{is_known_role, User};
use super::store::UserRepository;

pub const MIN_PASSWORD_LENGTH: usize = 8;

static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email pattern"));

// Verified against when the email is unknown so both failure paths do the
// same argon2 work.
static DUMMY_HASH: Lazy<Option<String>> = Lazy::new(|| {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(b"entitlements-dummy-password", &salt)
        .map(|hash| hash.to_string())
        .ok()
});

/// key: account-service -> registration and login
#[derive(Clone)]
pub struct AccountService {
    users: Arc<dyn UserRepository>,
    gateway: Arc<dyn EntitlementGateway>,
    issuer: CredentialIssuer,
    default_plan: String,
    bootstrap_timeout: Duration,
}

impl AccountService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        gateway: Arc<dyn EntitlementGateway>,
        issuer: CredentialIssuer,
        default_plan: impl Into<String>,
        bootstrap_timeout: Duration,
    ) -> Self {
        Self {
            users,
            gateway,
            issuer,
            default_plan: default_plan.into(),
            bootstrap_timeout,
        }
    }

    pub async fn register(&self, email: &str, password: &str) -> AppResult<User> {
        let email = email.trim();
        if !EMAIL_PATTERN.is_match(email) {
            return Err(AppError::BadRequest("invalid email address".into()));
        }
        if password.len() < MIN_PASSWORD_LENGTH {
            return Err(AppError::BadRequest("Password too short".into()));
        }

        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Message(format!("Hashing failed: {}", e)))?;
        let user = self.users.create(email, &hash.to_string()).await?;
        info!(user_id = user.id, "user registered");

        self.assign_default_subscription(user.id).await;
        Ok(user)
    }

    // The account exists regardless of what the billing boundary says.
    async fn assign_default_subscription(&self, user_id: i64) {
        let bootstrap = self
            .gateway
            .bootstrap_subscription(user_id, &self.default_plan);
        match timeout(self.bootstrap_timeout, bootstrap).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => error!(
                error = %format!("{err:#}"),
                %user_id,
                plan = %self.default_plan,
                "failed to assign default subscription to new user"
            ),
            Err(_) => error!(
                %user_id,
                plan = %self.default_plan,
                "default subscription assignment timed out"
            ),
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> AppResult<IssuedCredential> {
        let Some(user) = self.users.find_by_email(email.trim()).await? else {
            if let Some(dummy) = DUMMY_HASH.as_deref() {
                let _ = verify_password(password, dummy);
            }
            return Err(AppError::InvalidCredentials);
        };
        if !verify_password(password, &user.password_hash)? {
            return Err(AppError::InvalidCredentials);
        }
        self.issuer.issue(user.id, Some(user.role.clone())).await
    }

    pub async fn profile(&self, user_id: i64) -> AppResult<User> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("user".to_string()))
    }

    pub async fn user_details(&self, user_id: i64) -> AppResult<UserDetails> {
        Ok(self.profile(user_id).await?.details())
    }

    pub async fn list_users(&self) -> AppResult<Vec<User>> {
        self.users.list().await
    }

    /// Administrative rewrite of a user's email and role. Takes effect on the
    /// user's next login; credentials already issued keep the old role.
    pub async fn update_user(&self, user_id: i64, email: &str, role: &str) -> AppResult<User> {
        let email = email.trim();
        if !EMAIL_PATTERN.is_match(email) {
            return Err(AppError::BadRequest("invalid email address".into()));
        }
        if !is_known_role(role) {
            return Err(AppError::BadRequest(format!("unknown role: {role}")));
        }
        let user = self
            .users
            .update(user_id, email, role)
            .await?
            .ok_or_else(|| AppError::NotFound("user".to_string()))?;
        info!(user_id, role, "user updated by administrator");
        Ok(user)
    }
}

fn verify_password(password: &str, stored_hash: &str) -> AppResult<bool> {
    let parsed = PasswordHash::new(stored_hash).map_err(|e| {
        error!(?e, "Hash parse error");
        AppError::Message(format!("Hash error: {}", e))
    })?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}
