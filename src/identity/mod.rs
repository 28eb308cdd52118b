//! Users, passwords and the credentials handed out at login.

pub mod api;
pub mod credentials;
pub mod memory;
pub mod models;
pub mod service;
pub mod store;

pub use credentials::{CredentialIssuer, IssuedCredential};
pub use memory::InMemoryUserRepository;
pub use models::{User, ADMIN_ROLE, DEFAULT_ROLE};
pub use service::AccountService;
pub use store::{LocalUserDirectory, PgUserRepository, UserRepository};
