//! Collaborators reached over HTTP: sibling boundaries and the storage provider.

pub mod billing;
pub mod nextcloud;
pub mod users;

pub use billing::{EntitlementGateway, HttpEntitlementGateway};
pub use nextcloud::{NextcloudClient, QuotaProvider};
pub use users::{HttpUserDirectory, UserDirectory};
