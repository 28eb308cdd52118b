//! In-memory user repository for local runs and deterministic tests.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::{AppError, AppResult};

use super::models::{User, DEFAULT_ROLE};
use super::store::UserRepository;

#[derive(Default)]
pub struct InMemoryUserRepository {
    by_email: DashMap<String, i64>,
    users: DashMap<i64, User>,
    next_id: AtomicI64,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, email: &str, password_hash: &str) -> AppResult<User> {
        match self.by_email.entry(email.to_string()) {
            Entry::Occupied(_) => Err(AppError::Conflict("email already registered".to_string())),
            Entry::Vacant(slot) => {
                let now = Utc::now();
                let user = User {
                    id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
                    email: email.to_string(),
                    password_hash: password_hash.to_string(),
                    role: DEFAULT_ROLE.to_string(),
                    created_at: now,
                    updated_at: now,
                };
                slot.insert(user.id);
                self.users.insert(user.id, user.clone());
                Ok(user)
            }
        }
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let Some(user_id) = self.by_email.get(email).map(|id| *id.value()) else {
            return Ok(None);
        };
        self.find_by_id(user_id).await
    }

    async fn find_by_id(&self, user_id: i64) -> AppResult<Option<User>> {
        Ok(self.users.get(&user_id).map(|user| user.value().clone()))
    }

    async fn list(&self) -> AppResult<Vec<User>> {
        let mut users: Vec<User> = self.users.iter().map(|user| user.value().clone()).collect();
        users.sort_by_key(|user| user.id);
        Ok(users)
    }

    async fn update(&self, user_id: i64, email: &str, role: &str) -> AppResult<Option<User>> {
        let Some(current) = self.find_by_id(user_id).await? else {
            return Ok(None);
        };
        if current.email != email {
            match self.by_email.entry(email.to_string()) {
                Entry::Occupied(_) => {
                    return Err(AppError::Conflict("email already registered".to_string()))
                }
                Entry::Vacant(slot) => {
                    slot.insert(user_id);
                }
            }
            self.by_email.remove(&current.email);
        }
        let Some(mut user) = self.users.get_mut(&user_id) else {
            return Ok(None);
        };
        user.email = email.to_string();
        user.role = role.to_string();
        user.updated_at = Utc::now();
        Ok(Some(user.value().clone()))
    }
}
