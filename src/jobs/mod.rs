//! Polling jobs run by the scheduler or through the `/v1/jobs` endpoints.

pub mod auto_clockout;
pub mod filemaker_sync;
pub mod reminders;
pub mod scheduler;

use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;

use crate::config::Config;
use crate::errors::AppError;
use crate::filemaker::FileMakerClient;
use crate::notify::Notifier;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobReport {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl JobReport {
    pub fn record(&mut self, outcome: Outcome) {
        self.processed += 1;
        match outcome {
            Outcome::Succeeded => self.succeeded += 1,
            Outcome::Failed => self.failed += 1,
            Outcome::Skipped => self.skipped += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    Failed,
    Skipped,
}

/// Everything a job run needs, shared by the HTTP triggers and the scheduler.
#[derive(Clone)]
pub struct JobContext {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub notifier: Arc<dyn Notifier>,
    pub filemaker: Option<Arc<FileMakerClient>>,
}

impl JobContext {
    pub async fn auto_clockout(&self) -> Result<JobReport, AppError> {
        auto_clockout::run(&self.pool, self.config.auto_clockout_hours).await
    }

    pub async fn reminders(&self) -> Result<JobReport, AppError> {
        reminders::run(
            &self.pool,
            self.notifier.as_ref(),
            self.config.default_reminder_minutes,
            self.config.auto_clockout_hours,
        )
        .await
    }

    pub async fn filemaker_sync(&self) -> Result<filemaker_sync::SyncReport, AppError> {
        filemaker_sync::run(&self.pool, self.filemaker.as_deref(), &self.config).await
    }
}
