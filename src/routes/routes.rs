//! Route table for the quota housekeeping service.
//!
//! - `POST /quota/check`            — pre-upload admission check (callable)
//! - `GET  /quota`                  — persisted usage snapshot
//! - `POST /internal/hooks/gallery` — fired after gallery collection writes
//! - `POST /internal/hooks/media`   — fired after media-files collection writes
//! - `GET  /healthz`, `GET /readyz` — probes
//!
//! The router carries the shared `QuotaService` state into every handler.

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        quota_handlers::{check_upload, get_usage, on_gallery_write, on_media_write},
    },
    services::quota_service::QuotaService,
};
use axum::{
    Router,
    routing::{get, post},
};

pub fn routes() -> Router<QuotaService> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/quota", get(get_usage))
        .route("/quota/check", post(check_upload))
        .route("/internal/hooks/gallery", post(on_gallery_write))
        .route("/internal/hooks/media", post(on_media_write))
}
