//! Schemas shared by every boundary that reads or writes entitlements.

pub mod claims;
pub mod internal;
pub mod permissions;

pub use claims::{CredentialCodec, CredentialError, SessionClaims};
pub use internal::{BootstrapSubscription, UserDetails};
pub use permissions::{PermissionSet, PERMISSION_SCHEMA_VERSION};
