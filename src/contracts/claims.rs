use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::permissions::PermissionSet;

/// key: session-claims -> identity plus frozen entitlements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub user_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub perms: PermissionSet,
    pub iat: i64,
    pub exp: i64,
}

impl SessionClaims {
    pub fn new(
        user_id: i64,
        role: Option<String>,
        perms: PermissionSet,
        issued_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Self, CredentialError> {
        let expires_at = issued_at
            .checked_add_signed(ttl)
            .ok_or(CredentialError::LifetimeOutOfRange)?;
        Ok(Self {
            user_id,
            role,
            perms,
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        })
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential expired")]
    Expired,
    #[error("credential invalid")]
    Invalid,
    #[error("credential lifetime is out of range")]
    LifetimeOutOfRange,
}

/// Signs and verifies session credentials with a shared HS256 key.
#[derive(Clone)]
pub struct CredentialCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl CredentialCodec {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
        }
    }

    pub fn sign(&self, claims: &SessionClaims) -> Result<String, jsonwebtoken::errors::Error> {
        encode(&Header::default(), claims, &self.encoding)
    }

    pub fn verify(&self, token: &str) -> Result<SessionClaims, CredentialError> {
        decode::<SessionClaims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => CredentialError::Expired,
                _ => CredentialError::Invalid,
            })
    }
}
