//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks DB connectivity and blob-root I/O

use crate::services::quota_service::QuotaService;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use tokio::fs;
use uuid::Uuid;

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct CheckResult {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    sqlite: CheckResult,
    blob_root: CheckResult,
}

/// `GET /healthz`
///
/// Cheap liveness probe; never performs I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Runs `SELECT 1` against SQLite and a best-effort write/read/delete probe
/// under the blob root. 200 when both pass, 503 otherwise.
pub async fn readyz(State(service): State<QuotaService>) -> impl IntoResponse {
    let sqlite = match sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&*service.db)
        .await
    {
        Ok(1) => CheckResult {
            ok: true,
            detail: None,
        },
        Ok(other) => CheckResult {
            ok: false,
            detail: Some(format!("unexpected result: {}", other)),
        },
        Err(err) => CheckResult {
            ok: false,
            detail: Some(format!("error: {}", err)),
        },
    };

    let tmp_path = service
        .base_path
        .join(format!(".readyz-{}", Uuid::new_v4()));
    let blob_root = match fs::write(&tmp_path, b"readyz").await {
        Ok(_) => match fs::read(&tmp_path).await {
            Ok(bytes) if bytes == b"readyz" => {
                let detail = fs::remove_file(&tmp_path)
                    .await
                    .err()
                    .map(|e| format!("could not remove probe file: {}", e));
                CheckResult { ok: true, detail }
            }
            Ok(_) => {
                let _ = fs::remove_file(&tmp_path).await;
                CheckResult {
                    ok: false,
                    detail: Some("probe file content mismatch".into()),
                }
            }
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                CheckResult {
                    ok: false,
                    detail: Some(format!("read failed: {}", err)),
                }
            }
        },
        Err(err) => CheckResult {
            ok: false,
            detail: Some(format!("write failed: {}", err)),
        },
    };

    let all_ok = sqlite.ok && blob_root.ok;
    let status = if all_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(ReadyResponse {
            status: if all_ok { "ready".into() } else { "degraded".into() },
            sqlite,
            blob_root,
        }),
    )
}
