use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Router};
use axum_prometheus::PrometheusMetricLayer;
use entitlements::admission::AdmissionPolicy;
use entitlements::billing::{
    start_quota_sync_worker, EntitlementStore, PgEntitlementStore, QuotaSynchronizer,
    SubscriptionService,
};
use entitlements::clients::{
    EntitlementGateway, HttpEntitlementGateway, HttpUserDirectory, NextcloudClient, UserDirectory,
};
use entitlements::contracts::CredentialCodec;
use entitlements::identity::{
    AccountService, CredentialIssuer, LocalUserDirectory, PgUserRepository, UserRepository,
};
use entitlements::{AppConfig, AppServices};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    dotenvy::dotenv().ok();
    // Fail fast on missing secrets and malformed values
    let config = AppConfig::from_env()?;
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;

    if let Err(error) = sqlx::migrate!().run(&pool).await {
        if config.allow_migration_failure {
            tracing::warn!(
                ?error,
                "Database migrations failed but continuing due to ALLOW_MIGRATION_FAILURE"
            );
        } else {
            return Err(Box::new(error) as Box<dyn std::error::Error>);
        }
    }

    let users: Arc<dyn UserRepository> = Arc::new(PgUserRepository::new(pool.clone()));
    let store: Arc<dyn EntitlementStore> = Arc::new(PgEntitlementStore::new(pool.clone()));

    let directory: Arc<dyn UserDirectory> = match &config.user_service_url {
        Some(url) => Arc::new(HttpUserDirectory::new(url.as_str(), config.lookup_timeout)?),
        None => Arc::new(LocalUserDirectory::new(users.clone())),
    };
    let quota_sync = match &config.quota_provider {
        Some(provider_config) => {
            let provider = Arc::new(NextcloudClient::new(
                provider_config,
                config.quota_sync_timeout,
            )?);
            let synchronizer = QuotaSynchronizer::new(
                directory,
                provider,
                config.quota_attribute.as_str(),
                config.quota_sync_timeout,
            );
            let (handle, _worker) =
                start_quota_sync_worker(synchronizer, config.quota_sync_queue_depth);
            Some(handle)
        }
        None => {
            tracing::warn!("NEXTCLOUD_URL not set; plan changes will not update external quotas");
            None
        }
    };
    let subscriptions = Arc::new(SubscriptionService::new(
        store,
        config.free_plan_name.as_str(),
        quota_sync,
    ));

    let gateway: Arc<dyn EntitlementGateway> = match &config.billing_service_url {
        Some(url) => Arc::new(HttpEntitlementGateway::new(url.as_str(), config.lookup_timeout)?),
        None => subscriptions.clone(),
    };
    let codec = Arc::new(CredentialCodec::new(&config.jwt_secret));
    let issuer = CredentialIssuer::new(
        codec.clone(),
        gateway.clone(),
        config.credential_ttl,
        config.lookup_timeout,
    );
    let accounts = Arc::new(AccountService::new(
        users,
        gateway,
        issuer,
        config.free_plan_name.as_str(),
        config.lookup_timeout,
    ));

    let services = AppServices {
        accounts,
        subscriptions,
        codec,
        admission: AdmissionPolicy::new(config.upload_attribute.as_str()),
    };
    let (prometheus_layer, metrics_handle) = PrometheusMetricLayer::pair();
    let app = Router::new()
        .route(
            "/metrics",
            get(move || async move { metrics_handle.render() }),
        )
        .merge(services.router())
        .layer(prometheus_layer);

    let addr = socket_addr(&config.bind_address, config.bind_port)?;
    let internal_addr = socket_addr(&config.bind_address, config.internal_bind_port)?;
    tracing::info!(%addr, %internal_addr, "Listening for incoming connections");
    let public = axum::Server::bind(&addr).serve(app.into_make_service());
    let internal =
        axum::Server::bind(&internal_addr).serve(services.internal_router().into_make_service());
    tokio::try_join!(public, internal)?;

    Ok(())
}

fn socket_addr(host: &str, port: u16) -> Result<SocketAddr, Box<dyn std::error::Error>> {
    format!("{host}:{port}")
        .parse()
        .map_err(|error| Box::new(error) as Box<dyn std::error::Error>)
}
