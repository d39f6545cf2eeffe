use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct EmployeePreferences {
    pub employee_id: Uuid,
    pub reminders_enabled: bool,
    pub reminder_after_minutes: i32,
    pub notification_email: Option<String>,
}

impl EmployeePreferences {
    pub fn defaults(employee_id: Uuid, reminder_after_minutes: i32) -> Self {
        EmployeePreferences {
            employee_id,
            reminders_enabled: true,
            reminder_after_minutes,
            notification_email: None,
        }
    }
}
