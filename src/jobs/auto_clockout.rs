use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

use super::{JobReport, Outcome};
use crate::errors::AppError;
use crate::models::time_entry::{EntryStatus, TimeEntry};

pub const AUTO_CLOCKOUT_NOTE: &str = "Automatically clocked out after exceeding the maximum shift length.";

/// Entries clocked in at or before this instant are overdue.
pub fn cutoff(now: DateTime<Utc>, max_shift_hours: i64) -> DateTime<Utc> {
    now - Duration::hours(max_shift_hours)
}

/// Overdue shifts are closed at the cap, not at the time the job noticed them.
pub fn capped_clock_out(clock_in_at: DateTime<Utc>, max_shift_hours: i64) -> DateTime<Utc> {
    clock_in_at + Duration::hours(max_shift_hours.max(0))
}

pub fn is_overdue(entry: &TimeEntry, now: DateTime<Utc>, max_shift_hours: i64) -> bool {
    entry.is_open() && entry.clock_in_at <= cutoff(now, max_shift_hours)
}

pub async fn run(pool: &PgPool, max_shift_hours: i64) -> Result<JobReport, AppError> {
    let now = Utc::now();
    let overdue = sqlx::query_as::<_, TimeEntry>(
        "SELECT * FROM time_entries WHERE status = $1 AND clock_in_at <= $2 ORDER BY clock_in_at",
    )
    .bind(EntryStatus::ClockedIn)
    .bind(cutoff(now, max_shift_hours))
    .fetch_all(pool)
    .await?;

    let mut report = JobReport::default();
    for entry in overdue.iter().filter(|entry| is_overdue(entry, now, max_shift_hours)) {
        let outcome = match close_entry(pool, entry, max_shift_hours, now).await {
            Ok(true) => Outcome::Succeeded,
            // Clocked out by hand between the select and the update.
            Ok(false) => Outcome::Skipped,
            Err(err) => {
                log::warn!("Auto clock-out of entry {} failed: {:?}", entry.time_entry_id, err);
                Outcome::Failed
            }
        };
        report.record(outcome);
    }

    log::info!(
        "Auto clock-out: {} overdue, {} closed, {} failed, {} skipped",
        report.processed,
        report.succeeded,
        report.failed,
        report.skipped
    );
    Ok(report)
}

async fn close_entry(
    pool: &PgPool,
    entry: &TimeEntry,
    max_shift_hours: i64,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE time_entries
        SET status = $2,
            clock_out_at = $3,
            auto_clocked_out = TRUE,
            notes = CASE WHEN notes IS NULL OR notes = '' THEN $4 ELSE notes || E'\n' || $4 END,
            updated_at = $5
        WHERE time_entry_id = $1 AND status = $6
        "#,
    )
    .bind(entry.time_entry_id)
    .bind(EntryStatus::ClockedOut)
    .bind(capped_clock_out(entry.clock_in_at, max_shift_hours))
    .bind(AUTO_CLOCKOUT_NOTE)
    .bind(now)
    .bind(EntryStatus::ClockedIn)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}
