use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

use crate::config::Config;
use crate::errors::AppError;
use crate::models::employee::Role;
use crate::utils::password;

pub async fn create_pool(config: &Config) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&config.database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Creates the configured admin account on first start.
pub async fn ensure_admin(pool: &PgPool, config: &Config) -> Result<(), AppError> {
    let (Some(email), Some(plain)) = (config.admin_email.as_deref(), config.admin_password.as_deref()) else {
        return Ok(());
    };

    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM employees WHERE LOWER(email) = LOWER($1))")
        .bind(email)
        .fetch_one(pool)
        .await?;
    if exists {
        return Ok(());
    }

    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO employees (employee_id, email, password_hash, name, role, active, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, TRUE, $6, $6)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(password::hash_password(plain)?)
    .bind("Administrator")
    .bind(Role::Admin)
    .bind(now)
    .execute(pool)
    .await?;

    log::info!("Created bootstrap admin {}", email);
    Ok(())
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{DateTime, Utc};
    use rust_decimal::Decimal;
    use sqlx::PgPool;
    use uuid::Uuid;

    use crate::models::employee::Role;
    use crate::models::time_entry::{EntryStatus, TimeEntry};

    pub async fn insert_employee(pool: &PgPool, role: Role, active: bool, filemaker_id: Option<&str>) -> Uuid {
        let employee_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO employees (employee_id, email, password_hash, name, role, hourly_rate, active, filemaker_id)
            VALUES ($1, $2, 'not-a-hash', 'Test Employee', $3, $4, $5, $6)
            "#,
        )
        .bind(employee_id)
        .bind(format!("{}@example.com", employee_id))
        .bind(role)
        .bind(Decimal::new(3000, 2))
        .bind(active)
        .bind(filemaker_id)
        .execute(pool)
        .await
        .unwrap();
        employee_id
    }

    pub async fn insert_project(pool: &PgPool, project_number: &str, filemaker_record_id: Option<&str>) -> Uuid {
        let project_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO projects (project_id, name, project_number, filemaker_record_id) VALUES ($1, $2, $3, $4)",
        )
        .bind(project_id)
        .bind(format!("Project {}", project_number))
        .bind(project_number)
        .bind(filemaker_record_id)
        .execute(pool)
        .await
        .unwrap();
        project_id
    }

    pub async fn insert_entry(
        pool: &PgPool,
        employee_id: Uuid,
        clock_in_at: DateTime<Utc>,
        clock_out_at: Option<DateTime<Utc>>,
    ) -> Uuid {
        let time_entry_id = Uuid::new_v4();
        let status = if clock_out_at.is_some() {
            EntryStatus::ClockedOut
        } else {
            EntryStatus::ClockedIn
        };
        sqlx::query(
            r#"
            INSERT INTO time_entries (time_entry_id, employee_id, status, clock_in_at, clock_out_at,
                                      clock_in_latitude, clock_in_longitude)
            VALUES ($1, $2, $3, $4, $5, 39.7392, -104.9903)
            "#,
        )
        .bind(time_entry_id)
        .bind(employee_id)
        .bind(status)
        .bind(clock_in_at)
        .bind(clock_out_at)
        .execute(pool)
        .await
        .unwrap();
        time_entry_id
    }

    pub async fn fetch_entry(pool: &PgPool, time_entry_id: Uuid) -> TimeEntry {
        sqlx::query_as::<_, TimeEntry>("SELECT * FROM time_entries WHERE time_entry_id = $1")
            .bind(time_entry_id)
            .fetch_one(pool)
            .await
            .unwrap()
    }
}
