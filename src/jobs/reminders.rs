use chrono::{DateTime, Utc};
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use super::{JobReport, Outcome};
use crate::errors::AppError;
use crate::notify::{Notification, Notifier, NotifyError};

#[derive(Debug, Error)]
pub enum ReminderError {
    #[error("delivery failed: {0}")]
    Notify(#[from] NotifyError),
    #[error("recording the reminder failed: {0}")]
    Database(#[from] sqlx::Error),
}

/// An open entry with no reminder yet, joined with its employee's settings.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct ReminderCandidate {
    pub time_entry_id: Uuid,
    pub employee_id: Uuid,
    pub clock_in_at: DateTime<Utc>,
    pub name: String,
    pub email: String,
    pub reminders_enabled: Option<bool>,
    pub reminder_after_minutes: Option<i32>,
    pub notification_email: Option<String>,
}

impl ReminderCandidate {
    pub fn elapsed_minutes(&self, now: DateTime<Utc>) -> i64 {
        (now - self.clock_in_at).num_minutes()
    }

    /// Due once the employee's threshold has passed, but not for shifts the
    /// auto clock-out is about to close anyway.
    pub fn is_due(&self, now: DateTime<Utc>, default_minutes: i32, auto_clockout_hours: i64) -> bool {
        if !self.reminders_enabled.unwrap_or(true) {
            return false;
        }
        let threshold = i64::from(self.reminder_after_minutes.unwrap_or(default_minutes));
        let elapsed = self.elapsed_minutes(now);
        elapsed >= threshold && elapsed < auto_clockout_hours * 60
    }

    pub fn notification(&self, now: DateTime<Utc>) -> Notification {
        let elapsed = self.elapsed_minutes(now);
        Notification {
            employee_id: self.employee_id,
            email: self.notification_email.clone().unwrap_or_else(|| self.email.clone()),
            name: self.name.clone(),
            message: format!(
                "You have been clocked in for {}h {:02}m. Remember to clock out when you leave the site.",
                elapsed / 60,
                elapsed % 60
            ),
            time_entry_id: self.time_entry_id,
        }
    }
}

pub async fn run(
    pool: &PgPool,
    notifier: &dyn Notifier,
    default_minutes: i32,
    auto_clockout_hours: i64,
) -> Result<JobReport, AppError> {
    let now = Utc::now();
    let candidates = sqlx::query_as::<_, ReminderCandidate>(
        r#"
        SELECT t.time_entry_id, t.employee_id, t.clock_in_at, e.name, e.email,
               p.reminders_enabled, p.reminder_after_minutes, p.notification_email
        FROM time_entries t
        JOIN employees e ON e.employee_id = t.employee_id
        LEFT JOIN employee_preferences p ON p.employee_id = t.employee_id
        LEFT JOIN clock_reminders r ON r.time_entry_id = t.time_entry_id
        WHERE t.status = 'clocked_in' AND r.reminder_id IS NULL AND e.active
        ORDER BY t.clock_in_at
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut report = JobReport::default();
    for candidate in candidates
        .iter()
        .filter(|c| c.is_due(now, default_minutes, auto_clockout_hours))
    {
        let outcome = match remind(pool, notifier, candidate, now).await {
            Ok(()) => Outcome::Succeeded,
            Err(err) => {
                log::warn!("Reminder for entry {} failed: {}", candidate.time_entry_id, err);
                Outcome::Failed
            }
        };
        report.record(outcome);
    }

    log::info!(
        "Clock-out reminders: {} due, {} sent, {} failed",
        report.processed,
        report.succeeded,
        report.failed
    );
    Ok(report)
}

async fn remind(
    pool: &PgPool,
    notifier: &dyn Notifier,
    candidate: &ReminderCandidate,
    now: DateTime<Utc>,
) -> Result<(), ReminderError> {
    // Sent first so a failed delivery leaves no row and is retried next run.
    notifier.send(&candidate.notification(now)).await?;

    sqlx::query(
        r#"
        INSERT INTO clock_reminders (reminder_id, time_entry_id, employee_id, sent_at, channel, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $4, $4)
        ON CONFLICT (time_entry_id) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(candidate.time_entry_id)
    .bind(candidate.employee_id)
    .bind(now)
    .bind(notifier.channel())
    .execute(pool)
    .await?;

    Ok(())
}
