use chrono::{FixedOffset, Offset, Utc};
use rust_decimal::Decimal;
use std::env;
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use thiserror::Error;

use crate::payroll::{utc_offset_from_hours, PayrollSettings};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{0} cannot be empty")]
    Empty(&'static str),
    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct FileMakerConfig {
    pub host: String,
    pub database: String,
    pub username: String,
    pub password: String,
    pub projects_layout: String,
    pub time_layout: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub bind_address: String,
    pub cron_secret: Option<String>,
    pub filemaker: Option<FileMakerConfig>,
    pub auto_clockout_hours: i64,
    pub default_reminder_minutes: i32,
    pub weekly_overtime_hours: Decimal,
    pub overtime_multiplier: Decimal,
    pub payroll_utc_offset: FixedOffset,
    pub enforce_geofence: bool,
    pub scheduler_enabled: bool,
    pub scheduler_interval_secs: u64,
    pub notify_webhook_url: Option<String>,
    pub s3_bucket: Option<String>,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        let jwt_secret = vars.required("JWT_SECRET")?;
        if jwt_secret.trim().is_empty() {
            return Err(ConfigError::Empty("JWT_SECRET"));
        }

        let filemaker = match vars.optional("FILEMAKER_HOST") {
            Some(host) => Some(FileMakerConfig {
                host,
                database: vars.required("FILEMAKER_DATABASE")?,
                username: vars.required("FILEMAKER_USERNAME")?,
                password: vars.required("FILEMAKER_PASSWORD")?,
                projects_layout: vars
                    .optional("FILEMAKER_PROJECTS_LAYOUT")
                    .unwrap_or_else(|| "Projects".to_string()),
                time_layout: vars
                    .optional("FILEMAKER_TIME_LAYOUT")
                    .unwrap_or_else(|| "TimeEntries".to_string()),
            }),
            None => None,
        };

        let offset_hours: i32 = vars.parsed("PAYROLL_UTC_OFFSET_HOURS", 0)?;
        let payroll_utc_offset = utc_offset_from_hours(offset_hours).ok_or(ConfigError::Invalid {
            name: "PAYROLL_UTC_OFFSET_HOURS",
            value: offset_hours.to_string(),
        })?;

        Ok(Config {
            database_url: vars.required("DATABASE_URL")?,
            jwt_secret,
            bind_address: vars
                .optional("BIND_ADDRESS")
                .unwrap_or_else(|| "127.0.0.1:8080".to_string()),
            cron_secret: vars.optional("CRON_SECRET"),
            filemaker,
            auto_clockout_hours: vars.bounded("AUTO_CLOCKOUT_HOURS", 12, 1..=72)?,
            default_reminder_minutes: vars.bounded("DEFAULT_REMINDER_MINUTES", 480, 15..=1440)?,
            weekly_overtime_hours: vars.bounded(
                "WEEKLY_OVERTIME_HOURS",
                Decimal::from(40),
                Decimal::ZERO..=Decimal::from(168),
            )?,
            overtime_multiplier: vars.bounded(
                "OVERTIME_MULTIPLIER",
                Decimal::new(15, 1),
                Decimal::ONE..=Decimal::from(10),
            )?,
            payroll_utc_offset,
            enforce_geofence: vars.parsed("ENFORCE_GEOFENCE", false)?,
            scheduler_enabled: vars.parsed("SCHEDULER_ENABLED", false)?,
            scheduler_interval_secs: vars.bounded("SCHEDULER_INTERVAL_SECS", 900, 60..=86_400)?,
            notify_webhook_url: vars.optional("NOTIFY_WEBHOOK_URL"),
            s3_bucket: vars.optional("AWS_S3_BUCKET"),
            admin_email: vars.optional("ADMIN_EMAIL"),
            admin_password: vars.optional("ADMIN_PASSWORD"),
        })
    }

    pub fn payroll_settings(&self) -> PayrollSettings {
        PayrollSettings::new(
            self.weekly_overtime_hours,
            self.overtime_multiplier,
            self.payroll_utc_offset,
        )
    }

    /// Settings for tests and local tooling; nothing is read from the environment.
    pub fn for_tests(database_url: &str, jwt_secret: &str) -> Self {
        Config {
            database_url: database_url.to_string(),
            jwt_secret: jwt_secret.to_string(),
            bind_address: "127.0.0.1:0".to_string(),
            cron_secret: None,
            filemaker: None,
            auto_clockout_hours: 12,
            default_reminder_minutes: 480,
            weekly_overtime_hours: Decimal::from(40),
            overtime_multiplier: Decimal::new(15, 1),
            payroll_utc_offset: Utc.fix(),
            enforce_geofence: false,
            scheduler_enabled: false,
            scheduler_interval_secs: 900,
            notify_webhook_url: None,
            s3_bucket: None,
            admin_email: None,
            admin_password: None,
        }
    }
}

struct Vars<F>(F);

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        (self.0)(name).ok_or(ConfigError::Missing(name))
    }

    fn optional(&self, name: &str) -> Option<String> {
        (self.0)(name).filter(|value| !value.trim().is_empty())
    }

    fn parsed<T: FromStr>(&self, name: &'static str, default: T) -> Result<T, ConfigError> {
        match self.optional(name) {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { name, value }),
            None => Ok(default),
        }
    }

    fn bounded<T>(&self, name: &'static str, default: T, range: RangeInclusive<T>) -> Result<T, ConfigError>
    where
        T: FromStr + PartialOrd + fmt::Display,
    {
        let value = self.parsed(name, default)?;
        if !range.contains(&value) {
            return Err(ConfigError::Invalid {
                name,
                value: value.to_string(),
            });
        }
        Ok(value)
    }
}
