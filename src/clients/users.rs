use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use crate::contracts::UserDetails;

/// key: user-directory -> external identifier lookup
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn user_details(&self, user_id: i64) -> Result<UserDetails>;
}

pub struct HttpUserDirectory {
    base: String,
    client: Client,
}

impl HttpUserDirectory {
    pub fn new(base: impl Into<String>, timeout: Duration) -> reqwest::Result<Self> {
        Ok(Self {
            base: base.into().trim_end_matches('/').to_string(),
            client: Client::builder().timeout(timeout).build()?,
        })
    }
}

#[async_trait]
impl UserDirectory for HttpUserDirectory {
    async fn user_details(&self, user_id: i64) -> Result<UserDetails> {
        let url = format!("{}/internal/v1/users/{user_id}", self.base);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("failed to call user service")?;
        if response.status() != StatusCode::OK {
            bail!("user service returned status {}", response.status());
        }
        response
            .json::<UserDetails>()
            .await
            .context("failed to decode user details response")
    }
}
