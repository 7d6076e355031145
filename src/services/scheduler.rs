//! Daily cleanup scheduling.
//!
//! The cleanup pass runs once per day at a fixed local hour in the school's
//! time zone (Nepal, UTC+05:45). The loop sleeps until the next occurrence,
//! runs the pass, and keeps going; a failed pass is logged and retried the
//! next day.

use crate::services::quota_service::QuotaService;
use chrono::{DateTime, Duration, FixedOffset, Utc};
use tracing::{error, info};

/// Nepal has no DST, so a fixed offset is sufficient.
const KATHMANDU_OFFSET_SECS: i32 = 5 * 3600 + 45 * 60;

/// Time until the next `run_hour`:00 in Kathmandu local time.
pub fn until_next_run(now: DateTime<Utc>, run_hour: u32) -> std::time::Duration {
    let offset = FixedOffset::east_opt(KATHMANDU_OFFSET_SECS).expect("valid fixed offset");
    let local = now.with_timezone(&offset);
    let today_run = local
        .date_naive()
        .and_hms_opt(run_hour, 0, 0)
        .expect("valid run hour")
        .and_local_timezone(offset)
        .single()
        .expect("unambiguous local time");

    let next = if today_run > local {
        today_run
    } else {
        today_run + Duration::days(1)
    };
    (next - local).to_std().unwrap_or_default()
}

/// Run the cleanup pass daily, forever.
pub async fn run_daily(service: QuotaService, run_hour: u32) {
    loop {
        let wait = until_next_run(Utc::now(), run_hour);
        info!(seconds = wait.as_secs(), "next storage cleanup scheduled");
        tokio::time::sleep(wait).await;

        match service.run_cleanup().await {
            Ok(report) => info!(
                deleted = report.deleted_ids.len(),
                freed_bytes = report.freed_bytes(),
                "scheduled cleanup finished"
            ),
            Err(err) => error!(error = %err, "scheduled cleanup failed"),
        }
    }
}
