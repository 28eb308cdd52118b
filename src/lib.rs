pub mod admission;
pub mod billing;
pub mod clients;
pub mod config;
pub mod contracts;
pub mod error;
pub mod extractor;
pub mod identity;
pub mod routes;

pub use config::{AppConfig, ConfigError};
pub use routes::{api_routes, internal_routes, AppServices};
