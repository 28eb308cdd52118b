use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use url::Url;

use crate::config::QuotaProviderConfig;

/// key: quota-provider -> external storage quota
#[async_trait]
pub trait QuotaProvider: Send + Sync {
    async fn set_user_quota(&self, identifier: &str, quota_gb: u64) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct OcsEnvelope {
    ocs: Ocs,
}

#[derive(Debug, Deserialize)]
struct Ocs {
    meta: OcsMeta,
}

#[derive(Debug, Deserialize)]
struct OcsMeta {
    #[serde(default)]
    status: String,
    statuscode: i64,
    #[serde(default)]
    message: Option<String>,
}

/// Nextcloud provisioning API client (OCS v2, JSON responses).
pub struct NextcloudClient {
    base: Url,
    api_user: String,
    api_password: String,
    client: Client,
}

impl NextcloudClient {
    pub fn new(config: &QuotaProviderConfig, timeout: Duration) -> Result<Self> {
        let base = Url::parse(&config.base_url)
            .with_context(|| format!("invalid Nextcloud base url '{}'", config.base_url))?;
        if base.cannot_be_a_base() {
            bail!("Nextcloud base url '{}' cannot carry a path", config.base_url);
        }
        Ok(Self {
            base,
            api_user: config.api_user.clone(),
            api_password: config.api_password.clone(),
            client: Client::builder().timeout(timeout).build()?,
        })
    }

    fn user_url(&self, identifier: &str) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("Nextcloud base url cannot carry a path"))?
            .pop_if_empty()
            .extend(["ocs", "v2.php", "cloud", "users", identifier]);
        Ok(url)
    }
}

#[async_trait]
impl QuotaProvider for NextcloudClient {
    async fn set_user_quota(&self, identifier: &str, quota_gb: u64) -> Result<()> {
        let url = self.user_url(identifier)?;
        let form = [("key", "quota".to_string()), ("value", format!("{quota_gb} GB"))];
        let response = self
            .client
            .put(url)
            .basic_auth(&self.api_user, Some(&self.api_password))
            .header("OCS-APIRequest", "true")
            .header(ACCEPT, "application/json")
            .form(&form)
            .send()
            .await
            .context("failed to execute nextcloud request")?;

        if response.status() != StatusCode::OK {
            bail!(
                "nextcloud API returned non-200 HTTP status: {}",
                response.status()
            );
        }

        let envelope: OcsEnvelope = response
            .json()
            .await
            .context("failed to decode nextcloud JSON response")?;
        let meta = envelope.ocs.meta;
        if meta.statuscode != 200 {
            bail!(
                "nextcloud OCS API returned an error: status={} ({}), message='{}'",
                meta.statuscode,
                meta.status,
                meta.message.unwrap_or_default()
            );
        }
        Ok(())
    }
}
