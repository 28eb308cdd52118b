use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::contracts::UserDetails;

pub const DEFAULT_ROLE: &str = "USER";
pub const ADMIN_ROLE: &str = "ADMIN";

/// Roles an administrator may assign.
pub fn is_known_role(role: &str) -> bool {
    role == DEFAULT_ROLE || role == ADMIN_ROLE
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn details(&self) -> UserDetails {
        UserDetails {
            id: self.id,
            email: self.email.clone(),
        }
    }
}
