//! Over-quota cleanup: when usage crosses the trigger threshold, delete the
//! oldest items until usage falls back under the target.
//!
//! Policy, preserved exactly from the product decision: unpublished items are
//! fully exhausted (oldest first) before any published item is touched,
//! regardless of relative age. Blob deletion is best-effort and never blocks
//! the record deletion; a failed record deletion skips that item so the pass
//! still makes forward progress.

use crate::models::{mail::MailMessage, media::MediaItem, quota::ratio};
use crate::services::{
    alert::{cleanup_email, format_bytes},
    quota_service::{QuotaResult, QuotaService},
};
use chrono::Utc;
use std::io;
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Cleanup starts once usage exceeds 95% of the limit.
pub const CLEANUP_TRIGGER: f64 = 0.95;
/// And deletes until usage is back at or under 85%.
pub const CLEANUP_TARGET: f64 = 0.85;

/// Per-victim result of a cleanup pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VictimOutcome {
    /// Record and backing file both removed (or no backing file existed).
    Deleted,
    /// Backing file could not be removed; the record was deleted anyway.
    FileDeleteFailed,
    /// Record deletion failed; the item was skipped and its bytes kept.
    RecordDeleteFailed,
}

impl VictimOutcome {
    fn record_deleted(&self) -> bool {
        !matches!(self, VictimOutcome::RecordDeleteFailed)
    }
}

#[derive(Debug)]
pub struct CleanupReport {
    pub before_bytes: i64,
    pub after_bytes: i64,
    /// Ids whose records were actually removed, in deletion order.
    pub deleted_ids: Vec<Uuid>,
    pub outcomes: Vec<(Uuid, VictimOutcome)>,
}

impl CleanupReport {
    fn untriggered(total_bytes: i64) -> Self {
        Self {
            before_bytes: total_bytes,
            after_bytes: total_bytes,
            deleted_ids: Vec::new(),
            outcomes: Vec::new(),
        }
    }

    pub fn freed_bytes(&self) -> i64 {
        self.before_bytes - self.after_bytes
    }
}

/// Derive the on-disk path (relative to the blob root) from an item URL.
///
/// Accepts absolute URLs and site-relative paths; the blob path is whatever
/// follows the `/files/` segment, percent-decoded, minus any query string.
/// Inline `data:` URLs and anything that smells like traversal yield `None`.
pub fn blob_path_from_url(url: &str) -> Option<String> {
    if url.is_empty() || url.starts_with("data:") {
        return None;
    }
    let after = url.split("/files/").nth(1)?;
    let raw = after.split('?').next().unwrap_or("");
    let path = percent_decode(raw);
    if path.is_empty() || path.starts_with('/') || path.contains("..") {
        return None;
    }
    Some(path)
}

/// Minimal `%XX` decoder; malformed escapes are kept verbatim.
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            if let Ok(value) = u8::from_str_radix(&input[i + 1..i + 3], 16) {
                out.push(value);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

impl QuotaService {
    /// Daily housekeeping pass.
    ///
    /// Recomputes usage; below the trigger threshold it just persists the
    /// fresh total. Above it, victims are deleted oldest-first (unpublished
    /// phase, then published) until usage drops to the target, the final
    /// total is persisted, and a report email is queued when anything was
    /// removed.
    pub async fn run_cleanup(&self) -> QuotaResult<CleanupReport> {
        let total_bytes = self.recalc_total_usage().await?;
        let state = self.read_state().await?;
        let pct = ratio(total_bytes, state.limit_bytes);

        info!(
            total = %format_bytes(total_bytes),
            limit = %format_bytes(state.limit_bytes),
            pct = %format!("{:.1}%", pct * 100.0),
            "storage check"
        );

        if pct < CLEANUP_TRIGGER {
            self.write_usage(total_bytes, None).await?;
            return Ok(CleanupReport::untriggered(total_bytes));
        }

        warn!(
            pct = %format!("{:.1}%", pct * 100.0),
            "storage over trigger threshold, starting auto-cleanup"
        );

        let target_bytes = (state.limit_bytes as f64 * CLEANUP_TARGET) as i64;
        let mut report = CleanupReport::untriggered(total_bytes);
        let mut current_bytes = total_bytes;

        // Phase A: unpublished items, oldest first. Phase B only runs when
        // exhausting those was not enough.
        for published in [false, true] {
            if current_bytes <= target_bytes {
                break;
            }
            let victims = self.fetch_victims(published).await?;
            for item in victims {
                if current_bytes <= target_bytes {
                    break;
                }
                let outcome = self.delete_victim(&item).await;
                if outcome.record_deleted() {
                    current_bytes -= item.size_or_zero();
                    report.deleted_ids.push(item.id);
                }
                report.outcomes.push((item.id, outcome));
            }
        }

        report.after_bytes = current_bytes;
        self.write_usage(current_bytes, None).await?;

        if !report.deleted_ids.is_empty() {
            if let Some(recipient) = self.admin_email().await? {
                let (subject, html) = cleanup_email(&report, state.limit_bytes);
                self.enqueue_mail(MailMessage::new(recipient, subject, html, Utc::now()))
                    .await?;
            }
        }

        info!(
            deleted = report.deleted_ids.len(),
            usage = %format_bytes(current_bytes),
            "cleanup complete"
        );
        Ok(report)
    }

    /// Cleanup candidates from one publish bucket, oldest first. Ties on
    /// `created_at` fall back to whatever order SQLite returns them in.
    async fn fetch_victims(&self, published: bool) -> QuotaResult<Vec<MediaItem>> {
        let items = sqlx::query_as::<_, MediaItem>(
            "SELECT id, collection, title, file_size, url, is_published, created_at
             FROM media_items
             WHERE is_published = ?
             ORDER BY created_at ASC",
        )
        .bind(published)
        .fetch_all(&*self.db)
        .await?;
        Ok(items)
    }

    /// Delete one victim: blob first (best-effort), then the record.
    async fn delete_victim(&self, item: &MediaItem) -> VictimOutcome {
        let file_removed = self.remove_blob(item).await;

        let record_result = sqlx::query("DELETE FROM media_items WHERE id = ?")
            .bind(item.id)
            .execute(&*self.db)
            .await;

        match record_result {
            Ok(done) if done.rows_affected() > 0 => {
                if file_removed {
                    VictimOutcome::Deleted
                } else {
                    VictimOutcome::FileDeleteFailed
                }
            }
            Ok(_) => {
                warn!(id = %item.id, "cleanup victim record already gone, skipping");
                VictimOutcome::RecordDeleteFailed
            }
            Err(err) => {
                warn!(id = %item.id, error = %err, "failed to delete cleanup victim record");
                VictimOutcome::RecordDeleteFailed
            }
        }
    }

    /// Remove the backing file for an item. Every failure is swallowed; the
    /// return value only feeds the per-item outcome.
    async fn remove_blob(&self, item: &MediaItem) -> bool {
        let Some(url) = item.url.as_deref() else {
            // Nothing on disk to remove (e.g. inline data), count as clean.
            return true;
        };
        if url.starts_with("data:") {
            return true;
        }
        let Some(rel) = blob_path_from_url(url) else {
            debug!(id = %item.id, url, "could not derive blob path from url");
            return false;
        };
        let path = self.base_path.join(rel);
        match fs::remove_file(&path).await {
            Ok(_) => {
                debug!("removed blob {}", path.display());
                true
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("blob {} already missing", path.display());
                false
            }
            Err(err) => {
                debug!("failed to remove blob {}: {}", path.display(), err);
                false
            }
        }
    }
}
