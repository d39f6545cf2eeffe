//! Reconciles projects and finished time entries with FileMaker.
//!
//! FileMaker owns projects: they are pulled and upserted locally. The local
//! store owns time entries: closed ones are pushed once and stamped with the
//! FileMaker record id they received.

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use super::{JobReport, Outcome};
use crate::config::Config;
use crate::errors::AppError;
use crate::filemaker::mapping::{time_entry_fields, ProjectRecord, TimeEntryExport};
use crate::filemaker::FileMakerClient;

const PUSH_BATCH: i64 = 500;

#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct SyncReport {
    pub enabled: bool,
    pub projects: JobReport,
    pub time_entries: JobReport,
}

#[derive(sqlx::FromRow, Debug)]
struct PendingEntry {
    time_entry_id: Uuid,
    clock_in_at: DateTime<Utc>,
    clock_out_at: DateTime<Utc>,
    notes: Option<String>,
    employee_filemaker_id: String,
    project_number: Option<String>,
}

pub async fn run(
    pool: &PgPool,
    client: Option<&FileMakerClient>,
    config: &Config,
) -> Result<SyncReport, AppError> {
    let (Some(client), Some(fm)) = (client, config.filemaker.as_ref()) else {
        log::debug!("FileMaker sync skipped: not configured");
        return Ok(SyncReport::default());
    };

    let utc_offset = config.payroll_settings().utc_offset;

    // A failed pull does not hold back pushing finished entries.
    let projects = pull_projects(pool, client, &fm.projects_layout).await;
    if let Err(err) = &projects {
        log::error!("Pulling FileMaker projects failed: {}", err);
    }
    let time_entries = push_time_entries(pool, client, &fm.time_layout, utc_offset).await;

    if let Err(err) = client.logout().await {
        log::warn!("FileMaker logout failed: {}", err);
    }
    let projects = projects?;
    let time_entries = time_entries?;

    log::info!(
        "FileMaker sync: projects {} pulled ({} failed), time entries {} pushed ({} failed)",
        projects.succeeded,
        projects.failed,
        time_entries.succeeded,
        time_entries.failed
    );

    Ok(SyncReport {
        enabled: true,
        projects,
        time_entries,
    })
}

async fn pull_projects(
    pool: &PgPool,
    client: &FileMakerClient,
    layout: &str,
) -> Result<JobReport, AppError> {
    let records = client.get_all_records(layout).await?;
    let mut report = JobReport::default();

    for record in &records {
        let outcome = match ProjectRecord::from_record(record) {
            Ok(project) => match upsert_project(pool, &project).await {
                Ok(()) => Outcome::Succeeded,
                Err(err) => {
                    log::warn!("Project {} upsert failed: {:?}", project.project_number, err);
                    Outcome::Failed
                }
            },
            Err(reason) => {
                log::warn!("Skipping FileMaker project: {}", reason);
                Outcome::Failed
            }
        };
        report.record(outcome);
    }
    Ok(report)
}

async fn upsert_project(pool: &PgPool, project: &ProjectRecord) -> Result<(), sqlx::Error> {
    let now = Utc::now();
    let existing: Option<Uuid> = sqlx::query_scalar(
        r#"
        SELECT project_id FROM projects
        WHERE filemaker_record_id = $1 OR project_number = $2
        ORDER BY (filemaker_record_id IS NOT DISTINCT FROM $1) DESC
        LIMIT 1
        "#,
    )
    .bind(&project.record_id)
    .bind(&project.project_number)
    .fetch_optional(pool)
    .await?;

    match existing {
        Some(project_id) => {
            sqlx::query(
                r#"
                UPDATE projects
                SET name = $2, project_number = $3, address = COALESCE($4, address),
                    latitude = COALESCE($5, latitude), longitude = COALESCE($6, longitude),
                    active = $7, filemaker_record_id = $8, updated_at = $9
                WHERE project_id = $1
                "#,
            )
            .bind(project_id)
            .bind(&project.name)
            .bind(&project.project_number)
            .bind(&project.address)
            .bind(project.latitude)
            .bind(project.longitude)
            .bind(project.active)
            .bind(&project.record_id)
            .bind(now)
            .execute(pool)
            .await?;
        }
        None => {
            sqlx::query(
                r#"
                INSERT INTO projects (project_id, name, project_number, address, latitude, longitude,
                                      active, filemaker_record_id, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&project.name)
            .bind(&project.project_number)
            .bind(&project.address)
            .bind(project.latitude)
            .bind(project.longitude)
            .bind(project.active)
            .bind(&project.record_id)
            .bind(now)
            .execute(pool)
            .await?;
        }
    }
    Ok(())
}

async fn push_time_entries(
    pool: &PgPool,
    client: &FileMakerClient,
    layout: &str,
    utc_offset: FixedOffset,
) -> Result<JobReport, AppError> {
    let pending = sqlx::query_as::<_, PendingEntry>(
        r#"
        SELECT t.time_entry_id, t.clock_in_at, t.clock_out_at, t.notes,
               e.filemaker_id AS employee_filemaker_id, p.project_number
        FROM time_entries t
        JOIN employees e ON e.employee_id = t.employee_id
        LEFT JOIN projects p ON p.project_id = t.project_id
        WHERE t.status = 'clocked_out'
          AND t.clock_out_at IS NOT NULL
          AND t.filemaker_record_id IS NULL
          AND e.filemaker_id IS NOT NULL
        ORDER BY t.clock_in_at
        LIMIT $1
        "#,
    )
    .bind(PUSH_BATCH)
    .fetch_all(pool)
    .await?;

    let mut report = JobReport::default();
    for entry in &pending {
        let outcome = match push_entry(pool, client, layout, utc_offset, entry).await {
            Ok(()) => Outcome::Succeeded,
            Err(err) => {
                log::warn!("Pushing time entry {} failed: {}", entry.time_entry_id, err);
                Outcome::Failed
            }
        };
        report.record(outcome);
    }
    Ok(report)
}

async fn push_entry(
    pool: &PgPool,
    client: &FileMakerClient,
    layout: &str,
    utc_offset: FixedOffset,
    entry: &PendingEntry,
) -> Result<(), AppError> {
    let fields = time_entry_fields(
        &TimeEntryExport {
            employee_filemaker_id: &entry.employee_filemaker_id,
            project_number: entry.project_number.as_deref(),
            clock_in_at: entry.clock_in_at,
            clock_out_at: entry.clock_out_at,
            notes: entry.notes.as_deref(),
        },
        utc_offset,
    );
    let record_id = client.create_record(layout, fields).await?;

    sqlx::query(
        "UPDATE time_entries SET filemaker_record_id = $2, updated_at = $3 WHERE time_entry_id = $1",
    )
    .bind(entry.time_entry_id)
    .bind(&record_id)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::db::fixtures;

    fn record(record_id: &str, project_number: &str, name: &str) -> ProjectRecord {
        ProjectRecord {
            record_id: record_id.to_string(),
            project_number: project_number.to_string(),
            name: name.to_string(),
            address: None,
            latitude: Some(39.7392),
            longitude: Some(-104.9903),
            active: true,
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_local_project_adopted_by_number(pool: PgPool) {
        let project_id = fixtures::insert_project(&pool, "2291", None).await;

        upsert_project(&pool, &record("42", "2291", "Larimer Square Retrofit"))
            .await
            .unwrap();

        let rows: Vec<(Uuid, Option<String>, String)> =
            sqlx::query_as("SELECT project_id, filemaker_record_id, name FROM projects")
                .fetch_all(&pool)
                .await
                .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, project_id);
        assert_eq!(rows[0].1.as_deref(), Some("42"));
        assert_eq!(rows[0].2, "Larimer Square Retrofit");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_renumbered_project_matched_by_record_id(pool: PgPool) {
        let project_id = fixtures::insert_project(&pool, "2291", Some("42")).await;

        upsert_project(&pool, &record("42", "2291-B", "Larimer Square Retrofit"))
            .await
            .unwrap();
        upsert_project(&pool, &record("43", "3100", "Union Station Canopy"))
            .await
            .unwrap();

        let number: String = sqlx::query_scalar("SELECT project_number FROM projects WHERE project_id = $1")
            .bind(project_id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(number, "2291-B");
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM projects").fetch_one(&pool).await.unwrap();
        assert_eq!(total, 2);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_unconfigured_sync_is_disabled(pool: PgPool) {
        let config = Config::for_tests("postgres://unused", "secret");
        let report = run(&pool, None, &config).await.unwrap();
        assert!(!report.enabled);
        assert_eq!(report.projects.processed, 0);
    }
}
