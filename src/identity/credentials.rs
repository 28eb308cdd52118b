use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::time::timeout;
use tracing::warn;

use crate::clients::EntitlementGateway;
use crate::contracts::{CredentialCodec, PermissionSet, SessionClaims};
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Serialize)]
pub struct IssuedCredential {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    #[serde(skip)]
    pub permissions: PermissionSet,
}

/// key: credential-issuer -> snapshot entitlements into a signed credential
///
/// The snapshot is frozen at issue time; a later plan change only shows up in
/// the next credential.
#[derive(Clone)]
pub struct CredentialIssuer {
    codec: Arc<CredentialCodec>,
    gateway: Arc<dyn EntitlementGateway>,
    ttl: Duration,
    lookup_timeout: StdDuration,
}

impl CredentialIssuer {
    pub fn new(
        codec: Arc<CredentialCodec>,
        gateway: Arc<dyn EntitlementGateway>,
        ttl: Duration,
        lookup_timeout: StdDuration,
    ) -> Self {
        Self {
            codec,
            gateway,
            ttl,
            lookup_timeout,
        }
    }

    pub async fn issue(&self, user_id: i64, role: Option<String>) -> AppResult<IssuedCredential> {
        self.issue_at(user_id, role, Utc::now()).await
    }

    pub async fn issue_at(
        &self,
        user_id: i64,
        role: Option<String>,
        now: DateTime<Utc>,
    ) -> AppResult<IssuedCredential> {
        let permissions = self.snapshot(user_id).await;
        let claims = SessionClaims::new(user_id, role, permissions, now, self.ttl).map_err(|err| {
            tracing::error!(%err, %user_id, ttl = %self.ttl, "credential lifetime overflow");
            AppError::Message(err.to_string())
        })?;
        let token = self.codec.sign(&claims).map_err(|err| {
            tracing::error!(?err, %user_id, "credential signing failed");
            AppError::Credential(err)
        })?;
        Ok(IssuedCredential {
            token,
            expires_at: claims.expires_at(),
            permissions: claims.perms,
        })
    }

    // Login stays available when the entitlement lookup is down; the user runs
    // with an empty snapshot until the next login.
    async fn snapshot(&self, user_id: i64) -> PermissionSet {
        match timeout(self.lookup_timeout, self.gateway.permissions_for(user_id)).await {
            Ok(Ok(permissions)) => permissions,
            Ok(Err(err)) => {
                warn!(
                    error = %format!("{err:#}"),
                    %user_id,
                    "could not fetch permissions; issuing credential with empty permissions"
                );
                PermissionSet::empty()
            }
            Err(_) => {
                warn!(
                    %user_id,
                    timeout = ?self.lookup_timeout,
                    "permission lookup timed out; issuing credential with empty permissions"
                );
                PermissionSet::empty()
            }
        }
    }
}
