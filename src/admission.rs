//! Admission checks answered from the caller's credential alone.

use axum::{extract::Extension, http::StatusCode, Json};
use serde::Deserialize;

use crate::contracts::PermissionSet;
use crate::error::{AppError, AppResult};
use crate::extractor::AuthUser;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Which permission attribute bounds an upload, in megabytes.
#[derive(Debug, Clone)]
pub struct AdmissionPolicy {
    pub attribute: String,
}

impl AdmissionPolicy {
    pub fn new(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
        }
    }
}

/// key: admission-check -> snapshot limit versus requested amount
///
/// Missing or non-numeric attributes deny. A request equal to the limit is
/// admitted.
pub fn admit(snapshot: &PermissionSet, attribute: &str, requested: u64) -> AppResult<()> {
    let Some(limit) = snapshot.numeric(attribute) else {
        return Err(AppError::Forbidden(format!(
            "your plan does not grant {attribute}"
        )));
    };
    if requested > limit {
        return Err(AppError::Forbidden(format!(
            "{requested} exceeds the {attribute} limit of {limit}"
        )));
    }
    Ok(())
}

pub fn size_bytes_to_mb(size_bytes: u64) -> u64 {
    size_bytes / BYTES_PER_MB + u64::from(size_bytes % BYTES_PER_MB != 0)
}

#[derive(Debug, Deserialize)]
pub struct UploadAdmissionRequest {
    pub size_bytes: u64,
}

pub async fn check_upload(
    Extension(policy): Extension<AdmissionPolicy>,
    user: AuthUser,
    Json(payload): Json<UploadAdmissionRequest>,
) -> AppResult<StatusCode> {
    let requested = size_bytes_to_mb(payload.size_bytes);
    admit(&user.permissions, &policy.attribute, requested).map_err(|err| {
        tracing::debug!(user_id = user.user_id, requested, "upload refused");
        err
    })?;
    Ok(StatusCode::NO_CONTENT)
}
