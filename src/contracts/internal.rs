use serde::{Deserialize, Serialize};

/// Body of `POST /internal/v1/subscriptions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapSubscription {
    pub user_id: i64,
    pub plan_name: String,
}

/// Response of `GET /internal/v1/users/:user_id`. `email` doubles as the
/// identifier of the user in the external storage provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDetails {
    pub id: i64,
    pub email: String,
}
