use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::config::Config;
use crate::errors::{is_unique_violation, AppError};
use crate::handlers::employee::page_bounds;
use crate::models::project::Project;
use crate::models::time_entry::{EntryStatus, TimeEntry};
use crate::utils::auth::AuthenticatedUser;
use crate::utils::geo::{check_geofence, GeofenceCheck};
use crate::utils::validation::validate_payload;

#[derive(Deserialize, Validate)]
pub struct ClockInRequest {
    project_id: Option<Uuid>,
    #[validate(range(min = -90.0, max = 90.0))]
    latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    longitude: f64,
    #[validate(length(max = 1000))]
    notes: Option<String>,
}

#[derive(Deserialize, Validate)]
pub struct ClockOutRequest {
    #[validate(range(min = -90.0, max = 90.0))]
    latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    longitude: f64,
    #[validate(length(max = 1000))]
    notes: Option<String>,
}

#[derive(Serialize)]
pub struct ClockStatus {
    clocked_in: bool,
    entry: Option<TimeEntry>,
    elapsed_minutes: Option<i64>,
}

#[derive(Deserialize)]
pub struct EntryQueryParams {
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    employee_id: Option<Uuid>,
    project_id: Option<Uuid>,
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Deserialize, Validate)]
pub struct EntryCorrection {
    clock_in_at: Option<DateTime<Utc>>,
    clock_out_at: Option<DateTime<Utc>>,
    project_id: Option<Uuid>,
    #[validate(length(max = 1000))]
    notes: Option<String>,
}

/// Applies a correction to an entry's times, keeping the invariants that a
/// closed entry has a clock-out and that clock-out never precedes clock-in.
pub fn corrected_times(
    entry: &TimeEntry,
    correction_in: Option<DateTime<Utc>>,
    correction_out: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<(DateTime<Utc>, Option<DateTime<Utc>>, EntryStatus), AppError> {
    let clock_in_at = correction_in.unwrap_or(entry.clock_in_at);
    let clock_out_at = correction_out.or(entry.clock_out_at);

    if clock_in_at > now {
        return Err(AppError::BadRequest("clock_in_at cannot be in the future".to_string()));
    }
    match clock_out_at {
        Some(out) if out < clock_in_at => Err(AppError::BadRequest(
            "clock_out_at cannot be before clock_in_at".to_string(),
        )),
        Some(out) if out > now => Err(AppError::BadRequest("clock_out_at cannot be in the future".to_string())),
        Some(out) => Ok((clock_in_at, Some(out), EntryStatus::ClockedOut)),
        None => Ok((clock_in_at, None, EntryStatus::ClockedIn)),
    }
}

async fn open_entry(pool: &PgPool, employee_id: Uuid) -> Result<Option<TimeEntry>, AppError> {
    let entry = sqlx::query_as::<_, TimeEntry>(
        "SELECT * FROM time_entries WHERE employee_id = $1 AND status = $2",
    )
    .bind(employee_id)
    .bind(EntryStatus::ClockedIn)
    .fetch_optional(pool)
    .await?;
    Ok(entry)
}

pub async fn clock_in(
    user: AuthenticatedUser,
    pool: web::Data<PgPool>,
    config: web::Data<Config>,
    req: web::Json<ClockInRequest>,
) -> Result<HttpResponse, AppError> {
    validate_payload(&req.0)?;
    user.ensure_active(&pool).await?;

    if open_entry(&pool, user.employee_id).await?.is_some() {
        return Err(AppError::Conflict("Already clocked in".to_string()));
    }

    let mut geofence: Option<GeofenceCheck> = None;
    if let Some(project_id) = req.project_id {
        let project = sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE project_id = $1 AND active")
            .bind(project_id)
            .fetch_optional(&**pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Project not found".to_string()))?;

        geofence = check_geofence(
            project.latitude,
            project.longitude,
            project.geofence_radius_m,
            req.latitude,
            req.longitude,
        );
        if let Some(check) = geofence {
            if check.outside && config.enforce_geofence {
                return Err(AppError::BadRequest(format!(
                    "You are {:.0} m from the project site",
                    check.distance_m
                )));
            }
        }
    }

    let now = Utc::now();
    let inserted = sqlx::query_as::<_, TimeEntry>(
        r#"
        INSERT INTO time_entries (time_entry_id, employee_id, project_id, status, clock_in_at,
                                  clock_in_latitude, clock_in_longitude, clock_in_distance_m,
                                  outside_geofence, notes, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $5, $5)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user.employee_id)
    .bind(req.project_id)
    .bind(EntryStatus::ClockedIn)
    .bind(now)
    .bind(req.latitude)
    .bind(req.longitude)
    .bind(geofence.map(|check| check.distance_m))
    .bind(geofence.map_or(false, |check| check.outside))
    .bind(&req.notes)
    .fetch_one(&**pool)
    .await;

    let entry = match inserted {
        Ok(entry) => entry,
        Err(err) if is_unique_violation(&err) => {
            return Err(AppError::Conflict("Already clocked in".to_string()))
        }
        Err(err) => return Err(err.into()),
    };

    log::info!(
        "Employee {} clocked in (entry {}, project {:?})",
        user.employee_id,
        entry.time_entry_id,
        entry.project_id
    );
    Ok(HttpResponse::Created().json(entry))
}

pub async fn clock_out(
    user: AuthenticatedUser,
    pool: web::Data<PgPool>,
    req: web::Json<ClockOutRequest>,
) -> Result<HttpResponse, AppError> {
    validate_payload(&req.0)?;
    user.ensure_active(&pool).await?;

    let entry = open_entry(&pool, user.employee_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Not clocked in".to_string()))?;

    let now = Utc::now();
    let closed = sqlx::query_as::<_, TimeEntry>(
        r#"
        UPDATE time_entries
        SET status = $2, clock_out_at = $3, clock_out_latitude = $4, clock_out_longitude = $5,
            notes = COALESCE($6, notes), updated_at = $3
        WHERE time_entry_id = $1 AND status = $7
        RETURNING *
        "#,
    )
    .bind(entry.time_entry_id)
    .bind(EntryStatus::ClockedOut)
    .bind(now)
    .bind(req.latitude)
    .bind(req.longitude)
    .bind(&req.notes)
    .bind(EntryStatus::ClockedIn)
    .fetch_optional(&**pool)
    .await?
    // Closed by the auto clock-out job in the meantime.
    .ok_or_else(|| AppError::NotFound("Not clocked in".to_string()))?;

    log::info!("Employee {} clocked out (entry {})", user.employee_id, closed.time_entry_id);
    Ok(HttpResponse::Ok().json(closed))
}

pub async fn get_status(user: AuthenticatedUser, pool: web::Data<PgPool>) -> Result<HttpResponse, AppError> {
    let entry = open_entry(&pool, user.employee_id).await?;
    let now = Utc::now();

    Ok(HttpResponse::Ok().json(ClockStatus {
        clocked_in: entry.is_some(),
        elapsed_minutes: entry.as_ref().map(|e| e.worked(now).num_minutes()),
        entry,
    }))
}

pub async fn get_entries(
    user: AuthenticatedUser,
    pool: web::Data<PgPool>,
    query: web::Query<EntryQueryParams>,
) -> Result<HttpResponse, AppError> {
    let employee_id = match query.employee_id {
        Some(requested) if requested != user.employee_id => {
            user.require_admin()?;
            Some(requested)
        }
        Some(own) => Some(own),
        None if user.is_admin() => None,
        None => Some(user.employee_id),
    };
    if employee_id != Some(user.employee_id) {
        user.ensure_active(&pool).await?;
    }

    let mut query_builder: sqlx::QueryBuilder<'_, sqlx::Postgres> =
        sqlx::QueryBuilder::new("SELECT * FROM time_entries WHERE TRUE");

    if let Some(employee_id) = employee_id {
        query_builder.push(" AND employee_id = ");
        query_builder.push_bind(employee_id);
    }
    if let Some(project_id) = query.project_id {
        query_builder.push(" AND project_id = ");
        query_builder.push_bind(project_id);
    }
    if let Some(from) = query.from {
        query_builder.push(" AND clock_in_at >= ");
        query_builder.push_bind(from);
    }
    if let Some(to) = query.to {
        query_builder.push(" AND clock_in_at < ");
        query_builder.push_bind(to);
    }

    let (limit, offset) = page_bounds(query.limit, query.offset);
    query_builder.push(" ORDER BY clock_in_at DESC LIMIT ");
    query_builder.push_bind(limit);
    query_builder.push(" OFFSET ");
    query_builder.push_bind(offset);

    let entries = query_builder
        .build_query_as::<TimeEntry>()
        .fetch_all(&**pool)
        .await?;

    Ok(HttpResponse::Ok().json(entries))
}

pub async fn update_entry(
    user: AuthenticatedUser,
    pool: web::Data<PgPool>,
    time_entry_id: web::Path<Uuid>,
    correction: web::Json<EntryCorrection>,
) -> Result<HttpResponse, AppError> {
    user.require_admin()?;
    validate_payload(&correction.0)?;
    user.ensure_active(&pool).await?;

    let entry = sqlx::query_as::<_, TimeEntry>("SELECT * FROM time_entries WHERE time_entry_id = $1")
        .bind(time_entry_id.into_inner())
        .fetch_optional(&**pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Time entry not found".to_string()))?;

    let updated = save_correction(&pool, &entry, &correction, Utc::now()).await?;

    log::info!("Time entry {} corrected by {}", updated.time_entry_id, user.employee_id);
    Ok(HttpResponse::Ok().json(updated))
}

/// Writes a correction computed from `entry` as it was read. The update only
/// applies while the row still has that status and clock-out, so a clock-out
/// that lands in between is never undone.
async fn save_correction(
    pool: &PgPool,
    entry: &TimeEntry,
    correction: &EntryCorrection,
    now: DateTime<Utc>,
) -> Result<TimeEntry, AppError> {
    if let Some(project_id) = correction.project_id {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM projects WHERE project_id = $1)")
            .bind(project_id)
            .fetch_one(pool)
            .await?;
        if !exists {
            return Err(AppError::NotFound("Project not found".to_string()));
        }
    }

    let (clock_in_at, clock_out_at, status) =
        corrected_times(entry, correction.clock_in_at, correction.clock_out_at, now)?;

    sqlx::query_as::<_, TimeEntry>(
        r#"
        UPDATE time_entries
        SET clock_in_at = $2, clock_out_at = $3, status = $4,
            project_id = COALESCE($5, project_id), notes = COALESCE($6, notes),
            filemaker_record_id = NULL, updated_at = $7
        WHERE time_entry_id = $1 AND status = $8 AND clock_out_at IS NOT DISTINCT FROM $9
        RETURNING *
        "#,
    )
    .bind(entry.time_entry_id)
    .bind(clock_in_at)
    .bind(clock_out_at)
    .bind(status)
    .bind(correction.project_id)
    .bind(&correction.notes)
    .bind(now)
    .bind(entry.status)
    .bind(entry.clock_out_at)
    .fetch_optional(pool)
    .await
    .map_err(AppError::conflict_on_unique("Employee already has an open time entry"))?
    .ok_or_else(|| AppError::Conflict("Time entry changed while being corrected; reload and retry".to_string()))
}

pub async fn delete_entry(
    user: AuthenticatedUser,
    pool: web::Data<PgPool>,
    time_entry_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    user.require_admin()?;
    user.ensure_active(&pool).await?;

    let result = sqlx::query("DELETE FROM time_entries WHERE time_entry_id = $1")
        .bind(time_entry_id.into_inner())
        .execute(&**pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Time entry not found".to_string()));
    }

    Ok(HttpResponse::Ok().json(json!({
        "message": "Time entry deleted successfully",
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::db::fixtures;
    use crate::models::employee::Role;

    fn entry(clock_in_at: DateTime<Utc>, clock_out_at: Option<DateTime<Utc>>) -> TimeEntry {
        TimeEntry {
            time_entry_id: Uuid::new_v4(),
            employee_id: Uuid::new_v4(),
            project_id: None,
            status: if clock_out_at.is_some() {
                EntryStatus::ClockedOut
            } else {
                EntryStatus::ClockedIn
            },
            clock_in_at,
            clock_out_at,
            clock_in_latitude: 0.0,
            clock_in_longitude: 0.0,
            clock_out_latitude: None,
            clock_out_longitude: None,
            clock_in_distance_m: None,
            outside_geofence: false,
            auto_clocked_out: false,
            notes: None,
            filemaker_record_id: None,
            created_at: clock_in_at,
            updated_at: clock_in_at,
        }
    }

    #[test]
    fn test_setting_clock_out_closes_open_entry() {
        let now = Utc::now();
        let open = entry(now - Duration::hours(5), None);
        let (_, out, status) = corrected_times(&open, None, Some(now - Duration::hours(1)), now).unwrap();
        assert_eq!(out, Some(now - Duration::hours(1)));
        assert_eq!(status, EntryStatus::ClockedOut);
    }

    #[test]
    fn test_closed_entry_stays_closed() {
        let now = Utc::now();
        let closed = entry(now - Duration::hours(9), Some(now - Duration::hours(1)));
        let (clock_in, _, status) =
            corrected_times(&closed, Some(now - Duration::hours(8)), None, now).unwrap();
        assert_eq!(clock_in, now - Duration::hours(8));
        assert_eq!(status, EntryStatus::ClockedOut);
    }

    #[test]
    fn test_clock_out_before_clock_in_rejected() {
        let now = Utc::now();
        let closed = entry(now - Duration::hours(9), Some(now - Duration::hours(1)));
        assert!(corrected_times(&closed, Some(now - Duration::minutes(30)), None, now).is_err());
    }

    #[test]
    fn test_future_times_rejected() {
        let now = Utc::now();
        let open = entry(now - Duration::hours(2), None);
        assert!(corrected_times(&open, None, Some(now + Duration::hours(1)), now).is_err());
        assert!(corrected_times(&open, Some(now + Duration::hours(1)), None, now).is_err());
    }

    #[test]
    fn test_clock_in_range_validation() {
        let req: ClockInRequest = serde_json::from_value(serde_json::json!({
            "latitude": 39.74,
            "longitude": -204.99
        }))
        .unwrap();
        let errors = req.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("longitude"));
    }

    fn correction(clock_out_at: Option<DateTime<Utc>>, project_id: Option<Uuid>) -> EntryCorrection {
        EntryCorrection {
            clock_in_at: None,
            clock_out_at,
            project_id,
            notes: Some("Corrected by office".to_string()),
        }
    }

    fn clock_in_request() -> web::Json<ClockInRequest> {
        web::Json(ClockInRequest {
            project_id: None,
            latitude: 39.7392,
            longitude: -104.9903,
            notes: None,
        })
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_correction_does_not_reopen_entry_closed_meanwhile(pool: PgPool) {
        let employee_id = fixtures::insert_employee(&pool, Role::Employee, true, None).await;
        let entry_id = fixtures::insert_entry(&pool, employee_id, Utc::now() - Duration::hours(3), None).await;
        let stale = fixtures::fetch_entry(&pool, entry_id).await;

        sqlx::query("UPDATE time_entries SET status = 'clocked_out', clock_out_at = NOW() WHERE time_entry_id = $1")
            .bind(entry_id)
            .execute(&pool)
            .await
            .unwrap();

        let result = save_correction(&pool, &stale, &correction(None, None), Utc::now()).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));

        let entry = fixtures::fetch_entry(&pool, entry_id).await;
        assert_eq!(entry.status, EntryStatus::ClockedOut);
        assert!(entry.clock_out_at.is_some());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_correction_closes_current_entry(pool: PgPool) {
        let employee_id = fixtures::insert_employee(&pool, Role::Employee, true, None).await;
        let entry_id = fixtures::insert_entry(&pool, employee_id, Utc::now() - Duration::hours(3), None).await;
        let entry = fixtures::fetch_entry(&pool, entry_id).await;

        let out = Utc::now() - Duration::hours(1);
        let saved = save_correction(&pool, &entry, &correction(Some(out), None), Utc::now())
            .await
            .unwrap();
        assert_eq!(saved.status, EntryStatus::ClockedOut);
        assert_eq!(saved.notes.as_deref(), Some("Corrected by office"));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_correction_to_unknown_project_is_not_found(pool: PgPool) {
        let employee_id = fixtures::insert_employee(&pool, Role::Employee, true, None).await;
        let now = Utc::now();
        let entry_id = fixtures::insert_entry(&pool, employee_id, now - Duration::hours(9), Some(now - Duration::hours(1))).await;
        let entry = fixtures::fetch_entry(&pool, entry_id).await;

        let result = save_correction(&pool, &entry, &correction(None, Some(Uuid::new_v4())), now).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_deactivated_employee_cannot_clock_in(pool: PgPool) {
        let employee_id = fixtures::insert_employee(&pool, Role::Employee, false, None).await;
        let user = AuthenticatedUser {
            employee_id,
            role: Role::Employee,
        };
        let config = web::Data::new(Config::for_tests("postgres://unused", "secret"));

        let result = clock_in(user, web::Data::new(pool.clone()), config, clock_in_request()).await;
        assert!(matches!(result, Err(AppError::Unauthorized(_))));

        let open: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM time_entries WHERE employee_id = $1")
            .bind(employee_id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(open, 0);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_second_clock_in_conflicts(pool: PgPool) {
        let employee_id = fixtures::insert_employee(&pool, Role::Employee, true, None).await;
        let user = AuthenticatedUser {
            employee_id,
            role: Role::Employee,
        };
        let config = web::Data::new(Config::for_tests("postgres://unused", "secret"));
        let pool = web::Data::new(pool);

        let first = clock_in(user.clone(), pool.clone(), config.clone(), clock_in_request()).await;
        assert!(first.is_ok());
        let second = clock_in(user, pool, config, clock_in_request()).await;
        assert!(matches!(second, Err(AppError::Conflict(_))));
    }
}
