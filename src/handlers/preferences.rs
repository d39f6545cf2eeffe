use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use sqlx::PgPool;
use validator::Validate;

use crate::config::Config;
use crate::errors::AppError;
use crate::models::preferences::EmployeePreferences;
use crate::utils::auth::AuthenticatedUser;
use crate::utils::validation::validate_payload;

#[derive(Deserialize, Validate)]
pub struct PreferencesUpdate {
    reminders_enabled: bool,
    #[validate(range(min = 15, max = 1440))]
    reminder_after_minutes: i32,
    #[validate(email)]
    notification_email: Option<String>,
}

pub async fn get_preferences(
    user: AuthenticatedUser,
    pool: web::Data<PgPool>,
    config: web::Data<Config>,
) -> Result<HttpResponse, AppError> {
    let preferences = sqlx::query_as::<_, EmployeePreferences>(
        "SELECT employee_id, reminders_enabled, reminder_after_minutes, notification_email FROM employee_preferences WHERE employee_id = $1",
    )
    .bind(user.employee_id)
    .fetch_optional(&**pool)
    .await?
    .unwrap_or_else(|| EmployeePreferences::defaults(user.employee_id, config.default_reminder_minutes));

    Ok(HttpResponse::Ok().json(preferences))
}

pub async fn update_preferences(
    user: AuthenticatedUser,
    pool: web::Data<PgPool>,
    updates: web::Json<PreferencesUpdate>,
) -> Result<HttpResponse, AppError> {
    validate_payload(&updates.0)?;
    user.ensure_active(&pool).await?;

    let preferences = sqlx::query_as::<_, EmployeePreferences>(
        r#"
        INSERT INTO employee_preferences (employee_id, reminders_enabled, reminder_after_minutes,
                                          notification_email, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $5)
        ON CONFLICT (employee_id) DO UPDATE
        SET reminders_enabled = EXCLUDED.reminders_enabled,
            reminder_after_minutes = EXCLUDED.reminder_after_minutes,
            notification_email = EXCLUDED.notification_email,
            updated_at = EXCLUDED.updated_at
        RETURNING employee_id, reminders_enabled, reminder_after_minutes, notification_email
        "#,
    )
    .bind(user.employee_id)
    .bind(updates.reminders_enabled)
    .bind(updates.reminder_after_minutes)
    .bind(&updates.notification_email)
    .bind(Utc::now())
    .fetch_one(&**pool)
    .await?;

    Ok(HttpResponse::Ok().json(preferences))
}
