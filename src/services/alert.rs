//! Threshold alerting: decide when a warning email is due and compose it.
//!
//! The decision itself is a pure function over the current usage figures so
//! it can be exercised without a database; `QuotaService::maybe_send_warning`
//! wires it to the settings record and the mail queue.

use crate::models::{mail::MailMessage, quota::ratio};
use crate::services::{
    cleanup::CleanupReport,
    quota_service::{QuotaResult, QuotaService},
};
use chrono::{DateTime, Duration, Utc};

/// First email at 70% usage.
pub const WARN_THRESHOLD: f64 = 0.70;
/// Subject switches to URGENT at 90%.
pub const DANGER_THRESHOLD: f64 = 0.90;
/// Minimum gap between repeat warning emails.
pub const EMAIL_COOLDOWN_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertSeverity {
    Warning,
    Urgent,
}

impl AlertSeverity {
    pub fn label(&self) -> &'static str {
        match self {
            AlertSeverity::Warning => "WARNING",
            AlertSeverity::Urgent => "URGENT",
        }
    }
}

/// Decide whether a warning email is due right now.
///
/// Below the warning threshold nothing is sent. Above it, a missing
/// `last_sent` timestamp counts as "cooldown elapsed"; otherwise the elapsed
/// time must strictly exceed the cooldown before another email goes out.
pub fn evaluate_alert(
    total_bytes: i64,
    limit_bytes: i64,
    last_sent: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<AlertSeverity> {
    let pct = ratio(total_bytes, limit_bytes);
    if pct < WARN_THRESHOLD {
        return None;
    }
    if let Some(sent) = last_sent {
        if now - sent <= Duration::hours(EMAIL_COOLDOWN_HOURS) {
            return None;
        }
    }
    if pct >= DANGER_THRESHOLD {
        Some(AlertSeverity::Urgent)
    } else {
        Some(AlertSeverity::Warning)
    }
}

/// Round a usage ratio to a one-decimal percentage value (0.723 -> 72.3).
pub fn pct_one_decimal(usage_ratio: f64) -> f64 {
    (usage_ratio * 1000.0).round() / 10.0
}

/// Human-readable byte counts, 1024-based. Whole bytes and one decimal for
/// KB/MB; two decimals for GB where the extra precision matters.
pub fn format_bytes(bytes: i64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = 1024.0 * 1024.0;
    const GB: f64 = 1024.0 * 1024.0 * 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{} B", bytes)
    } else if b < MB {
        format!("{:.1} KB", b / KB)
    } else if b < GB {
        format!("{:.1} MB", b / MB)
    } else {
        format!("{:.2} GB", b / GB)
    }
}

/// Compose the threshold warning email.
pub fn warning_email(
    severity: AlertSeverity,
    total_bytes: i64,
    limit_bytes: i64,
) -> (String, String) {
    let pct_str = format!("{:.1}", ratio(total_bytes, limit_bytes) * 100.0);
    let subject = format!("{}: Storage at {}% capacity", severity.label(), pct_str);
    let html = format!(
        concat!(
            "<h2>{level}: Storage Usage Alert</h2>",
            "<p>The school website storage is at <strong>{pct}%</strong> of the configured limit.</p>",
            "<table style=\"border-collapse:collapse;\">",
            "<tr><td style=\"padding:4px 12px;\"><strong>Used:</strong></td><td>{used}</td></tr>",
            "<tr><td style=\"padding:4px 12px;\"><strong>Limit:</strong></td><td>{limit}</td></tr>",
            "<tr><td style=\"padding:4px 12px;\"><strong>Free:</strong></td><td>{free}</td></tr>",
            "</table>",
            "<p style=\"margin-top:16px;\">Please log in to the admin panel and delete unused ",
            "photos/videos, or older items will be automatically removed when usage exceeds 95%.</p>",
        ),
        level = severity.label(),
        pct = pct_str,
        used = format_bytes(total_bytes),
        limit = format_bytes(limit_bytes),
        free = format_bytes(limit_bytes - total_bytes),
    );
    (subject, html)
}

/// Compose the post-cleanup report email.
pub fn cleanup_email(report: &CleanupReport, limit_bytes: i64) -> (String, String) {
    let deleted = report.deleted_ids.len();
    let subject = format!("Auto-Cleanup: {} item(s) deleted", deleted);
    let html = format!(
        concat!(
            "<h2>Automatic Storage Cleanup Report</h2>",
            "<p>Storage was at <strong>{pct:.1}%</strong> capacity. The system automatically ",
            "deleted <strong>{count}</strong> item(s) to bring usage back under the target.</p>",
            "<table style=\"border-collapse:collapse;\">",
            "<tr><td style=\"padding:4px 12px;\"><strong>Before:</strong></td><td>{before}</td></tr>",
            "<tr><td style=\"padding:4px 12px;\"><strong>After:</strong></td><td>{after}</td></tr>",
            "<tr><td style=\"padding:4px 12px;\"><strong>Freed:</strong></td><td>{freed}</td></tr>",
            "</table>",
            "<p style=\"margin-top:16px;\">To prevent automatic deletion, regularly review and ",
            "delete unused media from the admin panel.</p>",
        ),
        pct = ratio(report.before_bytes, limit_bytes) * 100.0,
        count = deleted,
        before = format_bytes(report.before_bytes),
        after = format_bytes(report.after_bytes),
        freed = format_bytes(report.freed_bytes()),
    );
    (subject, html)
}

impl QuotaService {
    /// Queue a threshold warning if one is due and a recipient is configured.
    ///
    /// Returns the timestamp to persist as `warning_email_sent_at`, or `None`
    /// when nothing was queued. A missing recipient is not an error; the
    /// alert is simply skipped and the cooldown timestamp left untouched.
    pub async fn maybe_send_warning(
        &self,
        total_bytes: i64,
        limit_bytes: i64,
        last_sent: Option<DateTime<Utc>>,
    ) -> QuotaResult<Option<DateTime<Utc>>> {
        let now = Utc::now();
        let Some(severity) = evaluate_alert(total_bytes, limit_bytes, last_sent, now) else {
            return Ok(None);
        };
        let Some(recipient) = self.admin_email().await? else {
            return Ok(None);
        };

        let (subject, html) = warning_email(severity, total_bytes, limit_bytes);
        self.enqueue_mail(MailMessage::new(recipient, subject, html, now))
            .await?;
        Ok(Some(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GIB: i64 = 1024 * 1024 * 1024;
    const LIMIT: i64 = 4_831_838_208; // 4.5 GiB

    fn gib(n: f64) -> i64 {
        (n * GIB as f64) as i64
    }

    #[test]
    fn below_warning_threshold_stays_quiet() {
        // 3.0 GiB of 4.5 GiB is about 66.7%.
        assert_eq!(evaluate_alert(gib(3.0), LIMIT, None, Utc::now()), None);
    }

    #[test]
    fn warning_band_produces_warning_severity() {
        // 3.6 GiB of 4.5 GiB is exactly 80%.
        assert_eq!(
            evaluate_alert(gib(3.6), LIMIT, None, Utc::now()),
            Some(AlertSeverity::Warning)
        );
    }

    #[test]
    fn danger_band_produces_urgent_severity() {
        assert_eq!(
            evaluate_alert(gib(4.2), LIMIT, None, Utc::now()),
            Some(AlertSeverity::Urgent)
        );
    }

    #[test]
    fn cooldown_suppresses_repeat_alerts() {
        let now = Utc::now();
        let recent = now - Duration::hours(3);
        assert_eq!(evaluate_alert(gib(3.6), LIMIT, Some(recent), now), None);

        let exactly_cooldown = now - Duration::hours(EMAIL_COOLDOWN_HOURS);
        assert_eq!(
            evaluate_alert(gib(3.6), LIMIT, Some(exactly_cooldown), now),
            None
        );

        let stale = now - Duration::hours(EMAIL_COOLDOWN_HOURS) - Duration::seconds(1);
        assert_eq!(
            evaluate_alert(gib(3.6), LIMIT, Some(stale), now),
            Some(AlertSeverity::Warning)
        );
    }

    #[test]
    fn byte_formatting_matches_unit_breakpoints() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024 + 512 * 1024), "5.5 MB");
        assert_eq!(format_bytes(LIMIT), "4.50 GB");
    }

    #[test]
    fn percentage_rounds_to_one_decimal() {
        assert_eq!(pct_one_decimal(0.7234), 72.3);
        assert_eq!(pct_one_decimal(0.7236), 72.4);
        assert_eq!(pct_one_decimal(1.0), 100.0);
    }

    #[test]
    fn warning_email_names_usage_figures() {
        let (subject, html) = warning_email(AlertSeverity::Urgent, gib(4.2), LIMIT);
        assert!(subject.starts_with("URGENT"));
        assert!(html.contains("4.20 GB"));
        assert!(html.contains("4.50 GB"));
    }
}
