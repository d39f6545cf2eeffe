use chrono::{DateTime, FixedOffset, Utc};
use serde_json::{Map, Value};

use super::Record;
use crate::payroll::entry_hours;

pub const FIELD_PROJECT_NUMBER: &str = "ProjectNumber";
pub const FIELD_PROJECT_NAME: &str = "ProjectName";
pub const FIELD_ADDRESS: &str = "Address";
pub const FIELD_LATITUDE: &str = "Latitude";
pub const FIELD_LONGITUDE: &str = "Longitude";
pub const FIELD_STATUS: &str = "Status";

pub const FIELD_EMPLOYEE_ID: &str = "EmployeeID";
pub const FIELD_CLOCK_IN: &str = "ClockIn";
pub const FIELD_CLOCK_OUT: &str = "ClockOut";
pub const FIELD_HOURS: &str = "Hours";
pub const FIELD_NOTES: &str = "Notes";

const INACTIVE_STATUSES: [&str; 2] = ["closed", "inactive"];

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectRecord {
    pub record_id: String,
    pub project_number: String,
    pub name: String,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub active: bool,
}

/// FileMaker returns empty fields as `""` and numbers either as numbers or text.
pub fn field_str(fields: &Map<String, Value>, name: &str) -> Option<String> {
    match fields.get(name)? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn field_f64(fields: &Map<String, Value>, name: &str) -> Option<f64> {
    match fields.get(name)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl ProjectRecord {
    pub fn from_record(record: &Record) -> Result<Self, String> {
        let fields = &record.field_data;
        let project_number = field_str(fields, FIELD_PROJECT_NUMBER)
            .ok_or_else(|| format!("record {} has no {}", record.record_id, FIELD_PROJECT_NUMBER))?;
        let name = field_str(fields, FIELD_PROJECT_NAME)
            .ok_or_else(|| format!("record {} has no {}", record.record_id, FIELD_PROJECT_NAME))?;

        let latitude = field_f64(fields, FIELD_LATITUDE).filter(|lat| (-90.0..=90.0).contains(lat));
        let longitude = field_f64(fields, FIELD_LONGITUDE).filter(|lon| (-180.0..=180.0).contains(lon));

        let active = field_str(fields, FIELD_STATUS)
            .map(|status| !INACTIVE_STATUSES.contains(&status.to_lowercase().as_str()))
            .unwrap_or(true);

        Ok(ProjectRecord {
            record_id: record.record_id.clone(),
            project_number,
            name,
            address: field_str(fields, FIELD_ADDRESS),
            latitude,
            longitude,
            active,
        })
    }
}

/// FileMaker timestamp text, `MM/DD/YYYY HH:MM:SS`, in company local time.
pub fn format_timestamp(at: DateTime<Utc>, utc_offset: FixedOffset) -> String {
    at.with_timezone(&utc_offset).format("%m/%d/%Y %H:%M:%S").to_string()
}

pub struct TimeEntryExport<'a> {
    pub employee_filemaker_id: &'a str,
    pub project_number: Option<&'a str>,
    pub clock_in_at: DateTime<Utc>,
    pub clock_out_at: DateTime<Utc>,
    pub notes: Option<&'a str>,
}

pub fn time_entry_fields(export: &TimeEntryExport<'_>, utc_offset: FixedOffset) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert(FIELD_EMPLOYEE_ID.to_string(), Value::from(export.employee_filemaker_id));
    fields.insert(
        FIELD_PROJECT_NUMBER.to_string(),
        Value::from(export.project_number.unwrap_or_default()),
    );
    fields.insert(
        FIELD_CLOCK_IN.to_string(),
        Value::from(format_timestamp(export.clock_in_at, utc_offset)),
    );
    fields.insert(
        FIELD_CLOCK_OUT.to_string(),
        Value::from(format_timestamp(export.clock_out_at, utc_offset)),
    );
    let mut hours = entry_hours(export.clock_in_at, export.clock_out_at);
    hours.rescale(2);
    fields.insert(FIELD_HOURS.to_string(), Value::from(hours.to_string()));
    fields.insert(FIELD_NOTES.to_string(), Value::from(export.notes.unwrap_or_default()));
    fields
}
