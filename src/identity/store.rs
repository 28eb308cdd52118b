use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::clients::UserDirectory;
use crate::contracts::UserDetails;
use crate::error::{conflict_on, AppResult};

use super::models::User;

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Fails with `Conflict` when the email is already registered.
    async fn create(&self, email: &str, password_hash: &str) -> AppResult<User>;

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>>;

    async fn find_by_id(&self, user_id: i64) -> AppResult<Option<User>>;

    /// Every user, oldest first.
    async fn list(&self) -> AppResult<Vec<User>>;

    /// Rewrites email and role. `Ok(None)` when the user does not exist,
    /// `Conflict` when the email belongs to someone else.
    async fn update(&self, user_id: i64, email: &str, role: &str) -> AppResult<Option<User>>;
}

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, email: &str, password_hash: &str) -> AppResult<User> {
        let row = sqlx::query(
            r#"
            INSERT INTO users (email, password_hash)
            VALUES ($1, $2)
            RETURNING id, email, password_hash, role, created_at, updated_at
            "#,
        )
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| conflict_on(err, "users_email_key", "email already registered"))?;
        Ok(user_from_row(&row)?)
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let row = sqlx::query(
            "SELECT id, email, password_hash, role, created_at, updated_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|row| user_from_row(&row)).transpose()?)
    }

    async fn find_by_id(&self, user_id: i64) -> AppResult<Option<User>> {
        let row = sqlx::query(
            "SELECT id, email, password_hash, role, created_at, updated_at FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|row| user_from_row(&row)).transpose()?)
    }

    async fn list(&self) -> AppResult<Vec<User>> {
        let rows = sqlx::query(
            "SELECT id, email, password_hash, role, created_at, updated_at FROM users ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        let users = rows
            .iter()
            .map(user_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    async fn update(&self, user_id: i64, email: &str, role: &str) -> AppResult<Option<User>> {
        let row = sqlx::query(
            r#"
            UPDATE users
            SET email = $1, role = $2, updated_at = NOW()
            WHERE id = $3
            RETURNING id, email, password_hash, role, created_at, updated_at
            "#,
        )
        .bind(email)
        .bind(role)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| conflict_on(err, "users_email_key", "email already registered"))?;
        Ok(row.map(|row| user_from_row(&row)).transpose()?)
    }
}

fn user_from_row(row: &PgRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        role: row.try_get("role")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Serves user lookups from the repository when both boundaries share a
/// process.
pub struct LocalUserDirectory {
    users: Arc<dyn UserRepository>,
}

impl LocalUserDirectory {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl UserDirectory for LocalUserDirectory {
    async fn user_details(&self, user_id: i64) -> anyhow::Result<UserDetails> {
        self.users
            .find_by_id(user_id)
            .await?
            .map(|user| user.details())
            .ok_or_else(|| anyhow!("user {user_id} not found"))
    }
}
