use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use super::JobContext;

/// Runs auto clock-out, reminders and FileMaker sync on a fixed period.
///
/// Auto clock-out goes first so reminders are not sent for shifts it just
/// closed. A failing job is logged and the loop carries on.
pub fn spawn(context: JobContext, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        log::info!("Job scheduler started, running every {}s", period.as_secs());

        loop {
            ticker.tick().await;
            run_once(&context).await;
        }
    })
}

pub async fn run_once(context: &JobContext) {
    if let Err(err) = context.auto_clockout().await {
        log::error!("Auto clock-out job failed: {}", err);
    }
    if let Err(err) = context.reminders().await {
        log::error!("Reminder job failed: {}", err);
    }
    if let Err(err) = context.filemaker_sync().await {
        log::error!("FileMaker sync job failed: {}", err);
    }
}
