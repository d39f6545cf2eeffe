use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "entry_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    ClockedIn,
    ClockedOut,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct TimeEntry {
    pub time_entry_id: Uuid,
    pub employee_id: Uuid,
    pub project_id: Option<Uuid>,
    pub status: EntryStatus,
    pub clock_in_at: DateTime<Utc>,
    pub clock_out_at: Option<DateTime<Utc>>,
    pub clock_in_latitude: f64,
    pub clock_in_longitude: f64,
    pub clock_out_latitude: Option<f64>,
    pub clock_out_longitude: Option<f64>,
    pub clock_in_distance_m: Option<f64>,
    pub outside_geofence: bool,
    pub auto_clocked_out: bool,
    pub notes: Option<String>,
    pub filemaker_record_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TimeEntry {
    pub fn is_open(&self) -> bool {
        self.status == EntryStatus::ClockedIn
    }

    /// Worked duration; open entries are measured up to `now`.
    pub fn worked(&self, now: DateTime<Utc>) -> Duration {
        let end = self.clock_out_at.unwrap_or(now);
        (end - self.clock_in_at).max(Duration::zero())
    }
}
