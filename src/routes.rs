use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Extension, Router,
};

use crate::admission::{self, AdmissionPolicy};
use crate::billing::{self, SubscriptionService};
use crate::contracts::CredentialCodec;
use crate::identity::{self, AccountService};

async fn root() -> &'static str {
    "Entitlements API"
}

pub fn api_routes() -> Router {
    Router::new()
        .route("/", get(root))
        .route("/api/v1/auth/register", post(identity::api::register_user))
        .route("/api/v1/auth/login", post(identity::api::login_user))
        .route("/api/v1/auth/logout", post(identity::api::logout_user))
        .route("/api/v1/users/me", get(identity::api::current_user))
        .route("/api/v1/plans", get(billing::api::list_plans))
        .route(
            "/api/v1/subscriptions/me",
            get(billing::api::get_subscription).put(billing::api::change_subscription),
        )
        .route("/api/v1/uploads/admission", post(admission::check_upload))
        .route("/api/v1/admin/users", get(identity::api::list_users))
        .route(
            "/api/v1/admin/users/:user_id",
            put(identity::api::update_user),
        )
}

/// Sibling-boundary endpoints. Served on their own listener and never
/// merged into the public router.
pub fn internal_routes() -> Router {
    Router::new()
        .route(
            "/internal/v1/permissions/:user_id",
            get(billing::api::internal_permissions),
        )
        .route(
            "/internal/v1/subscriptions",
            post(billing::api::internal_create_subscription),
        )
        .route(
            "/internal/v1/users/:user_id",
            get(identity::api::internal_user_details),
        )
}

/// Everything the handlers pull out of request extensions.
#[derive(Clone)]
pub struct AppServices {
    pub accounts: Arc<AccountService>,
    pub subscriptions: Arc<SubscriptionService>,
    pub codec: Arc<CredentialCodec>,
    pub admission: AdmissionPolicy,
}

impl AppServices {
    pub fn router(&self) -> Router {
        self.layered(api_routes())
    }

    pub fn internal_router(&self) -> Router {
        self.layered(internal_routes())
    }

    fn layered(&self, routes: Router) -> Router {
        routes
            .layer(Extension(self.accounts.clone()))
            .layer(Extension(self.subscriptions.clone()))
            .layer(Extension(self.codec.clone()))
            .layer(Extension(self.admission.clone()))
    }
}
