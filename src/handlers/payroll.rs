use actix_web::{web, HttpResponse};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::PgPool;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use crate::config::Config;
use crate::errors::AppError;
use crate::models::payroll::PayrollRecord;
use crate::payroll::{calculate_week, is_week_start, week_bounds, WeeklyPay, WorkedEntry};
use crate::utils::auth::AuthenticatedUser;

#[derive(Deserialize)]
pub struct GeneratePayroll {
    week_start: NaiveDate,
}

#[derive(Deserialize)]
pub struct PayrollQueryParams {
    week_start: Option<NaiveDate>,
    employee_id: Option<Uuid>,
}

#[derive(sqlx::FromRow)]
struct WorkedRow {
    employee_id: Uuid,
    project_id: Option<Uuid>,
    clock_in_at: DateTime<Utc>,
    clock_out_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow)]
struct RateRow {
    employee_id: Uuid,
    hourly_rate: Decimal,
}

pub async fn generate_payroll(
    user: AuthenticatedUser,
    pool: web::Data<PgPool>,
    config: web::Data<Config>,
    req: web::Json<GeneratePayroll>,
) -> Result<HttpResponse, AppError> {
    user.require_admin()?;

    let week_start = req.week_start;
    if !is_week_start(week_start) {
        return Err(AppError::BadRequest("week_start must be a Monday".to_string()));
    }
    user.ensure_active(&pool).await?;

    let settings = config.payroll_settings();
    let (start, end) = week_bounds(week_start, settings.utc_offset);

    let rows = sqlx::query_as::<_, WorkedRow>(
        r#"
        SELECT employee_id, project_id, clock_in_at, clock_out_at
        FROM time_entries
        WHERE status = 'clocked_out' AND clock_in_at >= $1 AND clock_in_at < $2
        "#,
    )
    .bind(start)
    .bind(end)
    .fetch_all(&**pool)
    .await?;

    let mut by_employee: BTreeMap<Uuid, Vec<WorkedEntry>> = BTreeMap::new();
    for row in rows {
        by_employee.entry(row.employee_id).or_default().push(WorkedEntry {
            project_id: row.project_id,
            clock_in_at: row.clock_in_at,
            clock_out_at: row.clock_out_at,
        });
    }

    let employee_ids: Vec<Uuid> = by_employee.keys().copied().collect();
    let rates: HashMap<Uuid, Decimal> = sqlx::query_as::<_, RateRow>(
        "SELECT employee_id, hourly_rate FROM employees WHERE employee_id = ANY($1)",
    )
    .bind(&employee_ids)
    .fetch_all(&**pool)
    .await?
    .into_iter()
    .map(|row| (row.employee_id, row.hourly_rate))
    .collect();

    let summaries: Vec<WeeklyPay> = by_employee
        .iter()
        .map(|(employee_id, entries)| {
            let rate = rates.get(employee_id).copied().unwrap_or(Decimal::ZERO);
            calculate_week(*employee_id, rate, entries, week_start, &settings)
        })
        .collect();

    let mut tx = pool.begin().await?;
    let now = Utc::now();
    for pay in &summaries {
        sqlx::query(
            r#"
            INSERT INTO payroll (payroll_id, employee_id, week_start, regular_hours, overtime_hours,
                                 hourly_rate, regular_pay, overtime_pay, gross_pay, entry_count,
                                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
            ON CONFLICT (employee_id, week_start) DO UPDATE
            SET regular_hours = EXCLUDED.regular_hours,
                overtime_hours = EXCLUDED.overtime_hours,
                hourly_rate = EXCLUDED.hourly_rate,
                regular_pay = EXCLUDED.regular_pay,
                overtime_pay = EXCLUDED.overtime_pay,
                gross_pay = EXCLUDED.gross_pay,
                entry_count = EXCLUDED.entry_count,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(pay.employee_id)
        .bind(pay.week_start)
        .bind(pay.regular_hours)
        .bind(pay.overtime_hours)
        .bind(pay.hourly_rate)
        .bind(pay.regular_pay)
        .bind(pay.overtime_pay)
        .bind(pay.gross_pay)
        .bind(pay.entry_count)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    log::info!(
        "Payroll for week of {} generated for {} employees by {}",
        week_start,
        summaries.len(),
        user.employee_id
    );
    Ok(HttpResponse::Ok().json(summaries))
}

pub async fn get_payroll(
    user: AuthenticatedUser,
    pool: web::Data<PgPool>,
    query: web::Query<PayrollQueryParams>,
) -> Result<HttpResponse, AppError> {
    user.require_admin()?;
    user.ensure_active(&pool).await?;
    let records = fetch_payroll(&pool, query.week_start, query.employee_id).await?;
    Ok(HttpResponse::Ok().json(records))
}

pub async fn get_my_payroll(
    user: AuthenticatedUser,
    pool: web::Data<PgPool>,
    query: web::Query<PayrollQueryParams>,
) -> Result<HttpResponse, AppError> {
    let records = fetch_payroll(&pool, query.week_start, Some(user.employee_id)).await?;
    Ok(HttpResponse::Ok().json(records))
}

async fn fetch_payroll(
    pool: &PgPool,
    week_start: Option<NaiveDate>,
    employee_id: Option<Uuid>,
) -> Result<Vec<PayrollRecord>, AppError> {
    let mut query_builder: sqlx::QueryBuilder<'_, sqlx::Postgres> =
        sqlx::QueryBuilder::new("SELECT * FROM payroll WHERE TRUE");

    if let Some(week_start) = week_start {
        query_builder.push(" AND week_start = ");
        query_builder.push_bind(week_start);
    }
    if let Some(employee_id) = employee_id {
        query_builder.push(" AND employee_id = ");
        query_builder.push_bind(employee_id);
    }
    query_builder.push(" ORDER BY week_start DESC, employee_id");

    let records = query_builder
        .build_query_as::<PayrollRecord>()
        .fetch_all(pool)
        .await?;
    Ok(records)
}
