use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct PayrollRecord {
    pub payroll_id: Uuid,
    pub employee_id: Uuid,
    pub week_start: NaiveDate,
    pub regular_hours: Decimal,
    pub overtime_hours: Decimal,
    pub hourly_rate: Decimal,
    pub regular_pay: Decimal,
    pub overtime_pay: Decimal,
    pub gross_pay: Decimal,
    pub entry_count: i32,
    pub created_at: chrono::DateTime<Utc>,
    pub updated_at: chrono::DateTime<Utc>,
}
