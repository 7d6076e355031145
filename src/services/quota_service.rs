//! src/services/quota_service.rs
//!
//! QuotaService — storage-usage bookkeeping backed by SQLite for metadata
//! and local disk for media payloads. The service owns the four pieces of
//! persisted state this subsystem touches: the tracked `media_items`
//! collections, the `quota_state` singleton, the `site_settings` record, and
//! the insert-only `mail_queue`.

use crate::models::{
    mail::MailMessage,
    media::Collection,
    quota::{QuotaState, ratio},
};
use crate::services::alert::{self, format_bytes};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::{io, path::PathBuf, sync::Arc};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum QuotaError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("mail payload could not be serialized: {0}")]
    MailEncoding(#[from] serde_json::Error),
}

pub type QuotaResult<T> = Result<T, QuotaError>;

/// Outcome of the pre-upload admission check. Serialized field names match
/// the callable contract the admin panel already speaks.
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionDecision {
    pub allowed: bool,
    pub current_bytes: i64,
    pub limit_bytes: i64,
    pub projected_bytes: i64,
    /// Projected usage as a percentage, rounded to one decimal (e.g. 72.3).
    pub projected_pct: f64,
    pub message: String,
}

/// Usage summary returned by the write hooks and the read-only endpoint.
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub total_bytes: i64,
    pub limit_bytes: i64,
    /// Usage percentage, one decimal.
    pub usage_pct: f64,
    pub warning_queued: bool,
}

/// QuotaService provides the housekeeping operations:
/// - Recalculate total usage across the tracked collections
/// - Read/merge-write the quota singleton
/// - Decide and queue threshold alert emails
/// - Run the daily over-quota cleanup pass (see `services::cleanup`)
/// - Answer the advisory pre-upload admission check
///
/// Decisions are made by pure helpers in `services::alert` so the thresholds
/// and cooldown logic can be tested without a database.
#[derive(Clone)]
pub struct QuotaService {
    /// Shared SQLite connection pool used for all metadata operations.
    pub db: Arc<SqlitePool>,

    /// Root directory under which media payloads live on disk.
    pub base_path: PathBuf,
}

impl QuotaService {
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            db,
            base_path: base_path.into(),
        }
    }

    /// Sum `file_size` over one tracked collection, counting NULL as zero.
    async fn sum_collection(&self, collection: Collection) -> QuotaResult<i64> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(MAX(COALESCE(file_size, 0), 0)), 0)
             FROM media_items WHERE collection = ?",
        )
        .bind(collection)
        .fetch_one(&*self.db)
        .await?;
        Ok(total)
    }

    /// Recompute total storage usage from the source of truth.
    ///
    /// Read-only; never fails because of a row with a missing size. Runs on
    /// every tracked-collection write and at the start of the scheduled
    /// cleanup, so a stale total is corrected on the next trigger.
    pub async fn recalc_total_usage(&self) -> QuotaResult<i64> {
        let (gallery, media) = tokio::try_join!(
            self.sum_collection(Collection::Gallery),
            self.sum_collection(Collection::MediaFiles),
        )?;
        Ok(gallery + media)
    }

    /// Read the quota singleton, falling back to defaults when the row has
    /// never been written.
    pub async fn read_state(&self) -> QuotaResult<QuotaState> {
        let row: Option<QuotaState> = sqlx::query_as(
            "SELECT total_bytes, limit_bytes, last_checked, warning_email_sent_at
             FROM quota_state WHERE id = 1",
        )
        .fetch_optional(&*self.db)
        .await?;
        Ok(row.unwrap_or_else(|| QuotaState::default_state(Utc::now())))
    }

    /// Merge-write the quota singleton.
    ///
    /// `limit_bytes` is carried over from the existing record (or the
    /// default) and never overwritten here; `last_checked` is refreshed on
    /// every call; `warning_sent_at` only replaces the stored timestamp when
    /// provided.
    pub async fn write_usage(
        &self,
        total_bytes: i64,
        warning_sent_at: Option<DateTime<Utc>>,
    ) -> QuotaResult<()> {
        let existing = self.read_state().await?;
        sqlx::query(
            "INSERT INTO quota_state (id, total_bytes, limit_bytes, last_checked, warning_email_sent_at)
             VALUES (1, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 total_bytes = excluded.total_bytes,
                 last_checked = excluded.last_checked,
                 warning_email_sent_at =
                     COALESCE(excluded.warning_email_sent_at, quota_state.warning_email_sent_at)",
        )
        .bind(total_bytes)
        .bind(existing.limit_bytes)
        .bind(Utc::now())
        .bind(warning_sent_at)
        .execute(&*self.db)
        .await?;
        Ok(())
    }

    /// Notification recipient from the site settings record, if configured.
    pub async fn admin_email(&self) -> QuotaResult<Option<String>> {
        let email: Option<Option<String>> =
            sqlx::query_scalar("SELECT admin_email FROM site_settings WHERE id = 1")
                .fetch_optional(&*self.db)
                .await?;
        Ok(email.flatten())
    }

    /// Queue an email for the external dispatcher.
    pub async fn enqueue_mail(&self, mail: MailMessage) -> QuotaResult<()> {
        sqlx::query(
            "INSERT INTO mail_queue (id, to_addrs, subject, html, queued_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(mail.id)
        .bind(serde_json::to_string(&mail.to_addrs)?)
        .bind(&mail.subject)
        .bind(&mail.html)
        .bind(mail.queued_at)
        .execute(&*self.db)
        .await?;
        Ok(())
    }

    /// React to a write in one of the tracked collections: recompute usage,
    /// queue a threshold warning when due, persist the new state.
    pub async fn handle_collection_write(&self, collection: Collection) -> QuotaResult<UsageSnapshot> {
        let total_bytes = self.recalc_total_usage().await?;
        let state = self.read_state().await?;
        debug!(
            collection = collection.as_str(),
            total_bytes,
            limit_bytes = state.limit_bytes,
            "recalculated usage after collection write"
        );

        let warning_sent_at = self
            .maybe_send_warning(total_bytes, state.limit_bytes, state.warning_email_sent_at)
            .await?;
        let warning_queued = warning_sent_at.is_some();
        self.write_usage(total_bytes, warning_sent_at).await?;

        if warning_queued {
            info!(
                total = %format_bytes(total_bytes),
                limit = %format_bytes(state.limit_bytes),
                "storage warning email queued"
            );
        }

        Ok(UsageSnapshot {
            total_bytes,
            limit_bytes: state.limit_bytes,
            usage_pct: alert::pct_one_decimal(ratio(total_bytes, state.limit_bytes)),
            warning_queued,
        })
    }

    /// Advisory pre-flight check before an upload.
    ///
    /// Recomputes usage freshly, projects the addition, and rejects when the
    /// projection reaches 100% of the limit (exactly full is rejected). No
    /// capacity is reserved — a race with a concurrent upload is accepted.
    pub async fn check_admission(&self, file_size_bytes: i64) -> QuotaResult<AdmissionDecision> {
        let total_bytes = self.recalc_total_usage().await?;
        let state = self.read_state().await?;
        let projected_bytes = total_bytes + file_size_bytes;
        let projected_ratio = ratio(projected_bytes, state.limit_bytes);
        let allowed = projected_ratio < 1.0;
        let projected_pct = alert::pct_one_decimal(projected_ratio);

        let message = if allowed {
            "OK".to_string()
        } else {
            format!(
                "Upload rejected: this file ({}) would push storage to {:.1}% of the limit. \
                 Please delete some files first.",
                format_bytes(file_size_bytes),
                projected_ratio * 100.0
            )
        };

        Ok(AdmissionDecision {
            allowed,
            current_bytes: total_bytes,
            limit_bytes: state.limit_bytes,
            projected_bytes,
            projected_pct,
            message,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Duration;
    use sqlx::sqlite::SqlitePoolOptions;
    use uuid::Uuid;

    /// Fresh in-memory database with the real schema applied.
    pub(crate) async fn test_pool() -> Arc<SqlitePool> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite");
        let sql = include_str!("../../migrations/0001_init.sql");
        for stmt in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(stmt).execute(&pool).await.expect("migration");
        }
        Arc::new(pool)
    }

    pub(crate) async fn test_service() -> QuotaService {
        QuotaService::new(test_pool().await, "/tmp/storage-warden-test")
    }

    pub(crate) async fn insert_item(
        service: &QuotaService,
        collection: Collection,
        file_size: Option<i64>,
        is_published: bool,
        created_at: DateTime<Utc>,
        url: Option<&str>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO media_items (id, collection, title, file_size, url, is_published, created_at)
             VALUES (?, ?, NULL, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(collection)
        .bind(file_size)
        .bind(url)
        .bind(is_published)
        .bind(created_at)
        .execute(&*service.db)
        .await
        .expect("insert media item");
        id
    }

    pub(crate) async fn set_admin_email(service: &QuotaService, email: Option<&str>) {
        sqlx::query(
            "INSERT INTO site_settings (id, admin_email) VALUES (1, ?)
             ON CONFLICT(id) DO UPDATE SET admin_email = excluded.admin_email",
        )
        .bind(email)
        .execute(&*service.db)
        .await
        .expect("set admin email");
    }

    pub(crate) async fn set_limit(service: &QuotaService, limit_bytes: i64) {
        sqlx::query(
            "INSERT INTO quota_state (id, total_bytes, limit_bytes, last_checked)
             VALUES (1, 0, ?, ?)
             ON CONFLICT(id) DO UPDATE SET limit_bytes = excluded.limit_bytes",
        )
        .bind(limit_bytes)
        .bind(Utc::now())
        .execute(&*service.db)
        .await
        .expect("set limit");
    }

    pub(crate) async fn queued_mail_count(service: &QuotaService) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM mail_queue")
            .fetch_one(&*service.db)
            .await
            .expect("count mail")
    }

    /// The migration runner splits the SQL file on `;`, so a semicolon inside
    /// a comment would leave a fragment that starts with non-SQL text and
    /// break schema creation. Every fragment must lead with a real statement.
    #[test]
    fn migration_sql_splits_into_clean_statements() {
        let sql = include_str!("../../migrations/0001_init.sql");
        for stmt in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let first_sql_line = stmt
                .lines()
                .map(str::trim)
                .find(|line| !line.is_empty() && !line.starts_with("--"))
                .unwrap_or_else(|| panic!("fragment without SQL: {stmt:?}"));
            assert!(
                first_sql_line.starts_with("CREATE"),
                "unexpected statement start: {first_sql_line}"
            );
        }
    }

    #[tokio::test]
    async fn aggregation_sums_both_collections_and_is_idempotent() {
        let service = test_service().await;
        let now = Utc::now();
        insert_item(&service, Collection::Gallery, Some(100), true, now, None).await;
        insert_item(&service, Collection::MediaFiles, Some(250), false, now, None).await;

        let first = service.recalc_total_usage().await.unwrap();
        let second = service.recalc_total_usage().await.unwrap();
        assert_eq!(first, 350);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn aggregation_treats_missing_and_negative_sizes_as_zero() {
        let service = test_service().await;
        let now = Utc::now();
        insert_item(&service, Collection::Gallery, None, true, now, None).await;
        insert_item(&service, Collection::Gallery, Some(-40), true, now, None).await;
        insert_item(&service, Collection::MediaFiles, Some(75), true, now, None).await;

        assert_eq!(service.recalc_total_usage().await.unwrap(), 75);
    }

    #[tokio::test]
    async fn read_state_returns_defaults_before_first_write() {
        let service = test_service().await;
        let state = service.read_state().await.unwrap();
        assert_eq!(state.total_bytes, 0);
        assert_eq!(state.limit_bytes, crate::models::quota::DEFAULT_LIMIT_BYTES);
        assert!(state.warning_email_sent_at.is_none());
    }

    #[tokio::test]
    async fn write_usage_preserves_limit_and_merges_warning_timestamp() {
        let service = test_service().await;
        set_limit(&service, 1_000).await;

        let sent = Utc::now() - Duration::hours(1);
        service.write_usage(700, Some(sent)).await.unwrap();
        let state = service.read_state().await.unwrap();
        assert_eq!(state.total_bytes, 700);
        assert_eq!(state.limit_bytes, 1_000);
        assert_eq!(state.warning_email_sent_at, Some(sent));

        // A write without a new warning timestamp keeps the stored one.
        service.write_usage(400, None).await.unwrap();
        let state = service.read_state().await.unwrap();
        assert_eq!(state.total_bytes, 400);
        assert_eq!(state.limit_bytes, 1_000);
        assert_eq!(state.warning_email_sent_at, Some(sent));
    }

    #[tokio::test]
    async fn admission_rejects_exactly_full() {
        let service = test_service().await;
        set_limit(&service, 1_000).await;
        insert_item(&service, Collection::Gallery, Some(600), true, Utc::now(), None).await;

        let decision = service.check_admission(400).await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.projected_bytes, 1_000);
        assert_eq!(decision.projected_pct, 100.0);
        assert!(decision.message.contains("Upload rejected"));
    }

    #[tokio::test]
    async fn admission_allows_below_full_and_rounds_percentage() {
        let service = test_service().await;
        set_limit(&service, 1_000).await;
        insert_item(&service, Collection::Gallery, Some(600), true, Utc::now(), None).await;

        let decision = service.check_admission(123).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.current_bytes, 600);
        assert_eq!(decision.projected_bytes, 723);
        assert_eq!(decision.projected_pct, 72.3);
        assert_eq!(decision.message, "OK");
    }

    #[tokio::test]
    async fn collection_write_persists_usage_and_queues_single_warning() {
        let service = test_service().await;
        set_limit(&service, 1_000).await;
        set_admin_email(&service, Some("admin@school.edu.np")).await;
        insert_item(&service, Collection::Gallery, Some(800), true, Utc::now(), None).await;

        let snapshot = service
            .handle_collection_write(Collection::Gallery)
            .await
            .unwrap();
        assert_eq!(snapshot.total_bytes, 800);
        assert!(snapshot.warning_queued);
        assert_eq!(queued_mail_count(&service).await, 1);

        let state = service.read_state().await.unwrap();
        assert_eq!(state.total_bytes, 800);
        assert!(state.warning_email_sent_at.is_some());

        // Second write inside the cooldown window stays quiet.
        let snapshot = service
            .handle_collection_write(Collection::MediaFiles)
            .await
            .unwrap();
        assert!(!snapshot.warning_queued);
        assert_eq!(queued_mail_count(&service).await, 1);
    }

    #[tokio::test]
    async fn collection_write_without_recipient_is_not_an_error() {
        let service = test_service().await;
        set_limit(&service, 1_000).await;
        insert_item(&service, Collection::Gallery, Some(990), true, Utc::now(), None).await;

        let snapshot = service
            .handle_collection_write(Collection::Gallery)
            .await
            .unwrap();
        assert!(!snapshot.warning_queued);
        assert_eq!(queued_mail_count(&service).await, 0);
    }
}
