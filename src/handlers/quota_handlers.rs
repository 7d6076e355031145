//! HTTP handlers for the quota endpoints: the pre-upload admission check,
//! the usage read-out, and the two collection-write hooks the content
//! service fires after touching a tracked collection.

use crate::{
    errors::AppError,
    models::media::Collection,
    services::{
        alert::pct_one_decimal,
        quota_service::{AdmissionDecision, QuotaService, UsageSnapshot},
    },
};
use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

/// Body of `POST /quota/check`, matching the callable contract the admin
/// panel speaks. The size is taken as a raw JSON value so that a string or
/// fractional payload still reaches the handler's own validation instead of
/// bouncing off deserialization with a 422.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionRequest {
    pub file_size_bytes: Option<serde_json::Value>,
}

impl AdmissionRequest {
    /// The declared size as whole bytes, or `None` when it is missing,
    /// non-numeric, or not positive. Fractional sizes round up.
    fn file_size(&self) -> Option<i64> {
        let size = self.file_size_bytes.as_ref()?.as_f64()?;
        if size.is_finite() && size > 0.0 {
            Some(size.ceil() as i64)
        } else {
            None
        }
    }
}

/// Body of `GET /quota`: the stored state plus a derived percentage. This
/// reads the persisted record and does not recompute.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaReadout {
    pub total_bytes: i64,
    pub limit_bytes: i64,
    pub usage_pct: f64,
    pub last_checked: chrono::DateTime<chrono::Utc>,
}

/// `POST /quota/check` — advisory capacity check before an upload.
///
/// Rejects a missing, non-numeric, or non-positive `fileSizeBytes` with 400.
/// The check is read-only and does not reserve capacity.
pub async fn check_upload(
    State(service): State<QuotaService>,
    Json(req): Json<AdmissionRequest>,
) -> Result<Json<AdmissionDecision>, AppError> {
    let file_size_bytes = req.file_size().ok_or_else(|| {
        AppError::invalid_argument("fileSizeBytes must be a positive number")
    })?;

    let decision = service.check_admission(file_size_bytes).await?;
    Ok(Json(decision))
}

/// `GET /quota` — current persisted usage figures.
pub async fn get_usage(
    State(service): State<QuotaService>,
) -> Result<Json<QuotaReadout>, AppError> {
    let state = service.read_state().await?;
    Ok(Json(QuotaReadout {
        total_bytes: state.total_bytes,
        limit_bytes: state.limit_bytes,
        usage_pct: pct_one_decimal(state.usage_ratio()),
        last_checked: state.last_checked,
    }))
}

/// `POST /internal/hooks/gallery` — fired after any gallery write.
pub async fn on_gallery_write(
    State(service): State<QuotaService>,
) -> Result<Json<UsageSnapshot>, AppError> {
    let snapshot = service.handle_collection_write(Collection::Gallery).await?;
    Ok(Json(snapshot))
}

/// `POST /internal/hooks/media` — fired after any media-files write.
pub async fn on_media_write(
    State(service): State<QuotaService>,
) -> Result<Json<UsageSnapshot>, AppError> {
    let snapshot = service
        .handle_collection_write(Collection::MediaFiles)
        .await?;
    Ok(Json(snapshot))
}
