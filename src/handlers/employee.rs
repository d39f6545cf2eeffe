use actix_web::{web, HttpResponse};
use aws_sdk_s3::Client as S3Client;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::config::Config;
use crate::errors::AppError;
use crate::models::employee::{Employee, Role};
use crate::utils::auth::AuthenticatedUser;
use crate::utils::{password, s3, validation::validate_payload};

const MAX_PHOTO_BYTES: usize = 102_400;

#[derive(Deserialize, Validate)]
pub struct NewEmployee {
    #[validate(email)]
    email: String,
    #[validate(length(min = 8, max = 64))]
    password: String,
    #[validate(length(min = 2, max = 100))]
    name: String,
    #[validate(length(min = 7, max = 32))]
    phone: Option<String>,
    role: Option<Role>,
    #[validate(custom = "validate_rate")]
    hourly_rate: Decimal,
    #[validate(length(min = 1, max = 64))]
    filemaker_id: Option<String>,
}

#[derive(Deserialize)]
pub struct EmployeeQueryParams {
    name: Option<String>,
    role: Option<Role>,
    active: Option<bool>,
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Deserialize, Validate)]
pub struct EmployeeUpdate {
    #[validate(email)]
    email: Option<String>,
    #[validate(length(min = 8, max = 64))]
    password: Option<String>,
    #[validate(length(min = 2, max = 100))]
    name: Option<String>,
    #[validate(length(min = 7, max = 32))]
    phone: Option<String>,
    role: Option<Role>,
    #[validate(custom = "validate_rate")]
    hourly_rate: Option<Decimal>,
    active: Option<bool>,
    #[validate(length(min = 1, max = 64))]
    filemaker_id: Option<String>,
}

#[derive(Serialize)]
struct PhotoUploadResponse {
    uri: String,
}

fn validate_rate(rate: &Decimal) -> Result<(), validator::ValidationError> {
    if rate.is_sign_negative() {
        return Err(validator::ValidationError::new("hourly_rate must not be negative"));
    }
    Ok(())
}

/// Escapes `ILIKE` wildcards so user text matches literally.
pub(crate) fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub(crate) fn page_bounds(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    (limit.unwrap_or(50).clamp(1, 500), offset.unwrap_or(0).max(0))
}

async fn email_taken(pool: &PgPool, email: &str, except: Option<Uuid>) -> Result<bool, AppError> {
    let taken: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM employees WHERE LOWER(email) = LOWER($1) AND employee_id IS DISTINCT FROM $2)",
    )
    .bind(email)
    .bind(except)
    .fetch_one(pool)
    .await?;
    Ok(taken)
}

pub async fn create_employee(
    user: AuthenticatedUser,
    pool: web::Data<PgPool>,
    new_employee: web::Json<NewEmployee>,
) -> Result<HttpResponse, AppError> {
    user.require_admin()?;
    validate_payload(&new_employee.0)?;
    user.ensure_active(&pool).await?;

    if email_taken(&pool, &new_employee.email, None).await? {
        return Err(AppError::Conflict("Email already exists".to_string()));
    }

    let password_hash = password::hash_password(&new_employee.password)?;
    let now = Utc::now();

    let employee = sqlx::query_as::<_, Employee>(
        r#"
        INSERT INTO employees (employee_id, email, password_hash, name, phone, role, hourly_rate,
                               active, filemaker_id, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, TRUE, $8, $9, $9)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&new_employee.email)
    .bind(&password_hash)
    .bind(&new_employee.name)
    .bind(&new_employee.phone)
    .bind(new_employee.role.unwrap_or(Role::Employee))
    .bind(new_employee.hourly_rate)
    .bind(&new_employee.filemaker_id)
    .bind(now)
    .fetch_one(&**pool)
    .await
    .map_err(AppError::conflict_on_unique("Email or FileMaker ID already exists"))?;

    log::info!("Employee {} created by {}", employee.employee_id, user.employee_id);
    Ok(HttpResponse::Created().json(employee))
}

pub async fn get_employees(
    user: AuthenticatedUser,
    pool: web::Data<PgPool>,
    query: web::Query<EmployeeQueryParams>,
) -> Result<HttpResponse, AppError> {
    user.require_admin()?;
    user.ensure_active(&pool).await?;

    let mut query_builder: sqlx::QueryBuilder<'_, sqlx::Postgres> =
        sqlx::QueryBuilder::new("SELECT * FROM employees WHERE TRUE");

    if let Some(name) = &query.name {
        query_builder.push(" AND name ILIKE ");
        query_builder.push_bind(format!("%{}%", escape_like(name)));
    }
    if let Some(role) = query.role {
        query_builder.push(" AND role = ");
        query_builder.push_bind(role);
    }
    if let Some(active) = query.active {
        query_builder.push(" AND active = ");
        query_builder.push_bind(active);
    }

    let (limit, offset) = page_bounds(query.limit, query.offset);
    query_builder.push(" ORDER BY created_at DESC LIMIT ");
    query_builder.push_bind(limit);
    query_builder.push(" OFFSET ");
    query_builder.push_bind(offset);

    let employees = query_builder
        .build_query_as::<Employee>()
        .fetch_all(&**pool)
        .await?;

    Ok(HttpResponse::Ok().json(employees))
}

pub async fn get_me(user: AuthenticatedUser, pool: web::Data<PgPool>) -> Result<HttpResponse, AppError> {
    let employee = sqlx::query_as::<_, Employee>("SELECT * FROM employees WHERE employee_id = $1 AND active")
        .bind(user.employee_id)
        .fetch_optional(&**pool)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Employee not found or unauthorized".to_string()))?;

    Ok(HttpResponse::Ok().json(employee))
}

pub async fn update_employee(
    user: AuthenticatedUser,
    pool: web::Data<PgPool>,
    employee_id: web::Path<Uuid>,
    updates: web::Json<EmployeeUpdate>,
) -> Result<HttpResponse, AppError> {
    user.require_admin()?;
    validate_payload(&updates.0)?;
    user.ensure_active(&pool).await?;
    let employee_id = employee_id.into_inner();

    if let Some(email) = &updates.email {
        if email_taken(&pool, email, Some(employee_id)).await? {
            return Err(AppError::Conflict("Email already exists".to_string()));
        }
    }
    if updates.active == Some(false) && employee_id == user.employee_id {
        return Err(AppError::BadRequest("You cannot deactivate yourself".to_string()));
    }

    let password_hash = match &updates.password {
        Some(plain) => Some(password::hash_password(plain)?),
        None => None,
    };

    let mut query = sqlx::QueryBuilder::<sqlx::Postgres>::new("UPDATE employees SET ");
    let mut separated = query.separated(", ");

    if let Some(email) = &updates.email {
        separated.push("email = ");
        separated.push_bind_unseparated(email);
    }
    if let Some(hash) = &password_hash {
        separated.push("password_hash = ");
        separated.push_bind_unseparated(hash);
    }
    if let Some(name) = &updates.name {
        separated.push("name = ");
        separated.push_bind_unseparated(name);
    }
    if let Some(phone) = &updates.phone {
        separated.push("phone = ");
        separated.push_bind_unseparated(phone);
    }
    if let Some(role) = updates.role {
        separated.push("role = ");
        separated.push_bind_unseparated(role);
    }
    if let Some(rate) = updates.hourly_rate {
        separated.push("hourly_rate = ");
        separated.push_bind_unseparated(rate);
    }
    if let Some(active) = updates.active {
        separated.push("active = ");
        separated.push_bind_unseparated(active);
    }
    if let Some(filemaker_id) = &updates.filemaker_id {
        separated.push("filemaker_id = ");
        separated.push_bind_unseparated(filemaker_id);
    }
    separated.push("updated_at = ");
    separated.push_bind_unseparated(Utc::now());
    query.push(" WHERE employee_id = ");
    query.push_bind(employee_id);
    query.push(" RETURNING *");

    let employee = query
        .build_query_as::<Employee>()
        .fetch_optional(&**pool)
        .await
        .map_err(AppError::conflict_on_unique("Email or FileMaker ID already exists"))?
        .ok_or_else(|| AppError::NotFound("Employee not found".to_string()))?;

    Ok(HttpResponse::Ok().json(employee))
}

/// Deactivates rather than deletes; time entries keep pointing at the row.
pub async fn delete_employee(
    user: AuthenticatedUser,
    pool: web::Data<PgPool>,
    employee_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    user.require_admin()?;
    let employee_id = employee_id.into_inner();

    if employee_id == user.employee_id {
        return Err(AppError::BadRequest("You cannot deactivate yourself".to_string()));
    }
    user.ensure_active(&pool).await?;

    let result = sqlx::query("UPDATE employees SET active = FALSE, updated_at = $2 WHERE employee_id = $1")
        .bind(employee_id)
        .bind(Utc::now())
        .execute(&**pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Employee not found".to_string()));
    }

    Ok(HttpResponse::Ok().json(json!({
        "message": "Employee deactivated successfully",
    })))
}

pub async fn upload_photo(
    user: AuthenticatedUser,
    pool: web::Data<PgPool>,
    config: web::Data<Config>,
    s3_client: web::Data<S3Client>,
    employee_id: web::Path<Uuid>,
    file: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let employee_id = employee_id.into_inner();
    if employee_id != user.employee_id {
        user.require_admin()?;
    }

    if file.len() > MAX_PHOTO_BYTES {
        return Err(AppError::BadRequest("File size exceeds 100KiB limit".to_string()));
    }

    let file_type = infer::get(&file).ok_or_else(|| AppError::BadRequest("Invalid file type".to_string()))?;
    if !matches!(file_type.mime_type(), "image/jpeg" | "image/png") {
        return Err(AppError::BadRequest("Only JPEG and PNG files are allowed".to_string()));
    }

    let bucket = config
        .s3_bucket
        .as_deref()
        .ok_or_else(|| AppError::InternalServerError("Photo storage is not configured".to_string()))?;
    user.ensure_active(&pool).await?;

    let key = format!("employees/{}/{}.{}", employee_id, Uuid::new_v4(), file_type.extension());
    let uri = s3::upload_object(&s3_client, bucket, &key, file_type.mime_type(), file.to_vec()).await?;

    let result = sqlx::query("UPDATE employees SET photo_uri = $2, updated_at = $3 WHERE employee_id = $1")
        .bind(employee_id)
        .bind(&uri)
        .bind(Utc::now())
        .execute(&**pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Employee not found".to_string()));
    }

    Ok(HttpResponse::Ok().json(PhotoUploadResponse { uri }))
}
