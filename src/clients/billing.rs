use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use crate::contracts::{BootstrapSubscription, PermissionSet};

/// key: entitlement-gateway -> billing boundary as seen by the identity boundary
#[async_trait]
pub trait EntitlementGateway: Send + Sync {
    async fn permissions_for(&self, user_id: i64) -> Result<PermissionSet>;

    async fn bootstrap_subscription(&self, user_id: i64, plan_name: &str) -> Result<()>;
}

/// Talks to a billing boundary running in another process.
pub struct HttpEntitlementGateway {
    base: String,
    client: Client,
}

impl HttpEntitlementGateway {
    pub fn new(base: impl Into<String>, timeout: Duration) -> reqwest::Result<Self> {
        Ok(Self {
            base: base.into().trim_end_matches('/').to_string(),
            client: Client::builder().timeout(timeout).build()?,
        })
    }
}

#[async_trait]
impl EntitlementGateway for HttpEntitlementGateway {
    async fn permissions_for(&self, user_id: i64) -> Result<PermissionSet> {
        let url = format!("{}/internal/v1/permissions/{user_id}", self.base);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("failed to call billing service")?;
        if response.status() != StatusCode::OK {
            bail!("billing service returned status {}", response.status());
        }
        response
            .json::<PermissionSet>()
            .await
            .context("failed to decode permissions response")
    }

    async fn bootstrap_subscription(&self, user_id: i64, plan_name: &str) -> Result<()> {
        let url = format!("{}/internal/v1/subscriptions", self.base);
        let body = BootstrapSubscription {
            user_id,
            plan_name: plan_name.to_string(),
        };
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("failed to call billing service")?;
        if response.status() != StatusCode::CREATED {
            bail!(
                "billing service returned non-201 status: {}",
                response.status()
            );
        }
        Ok(())
    }
}
