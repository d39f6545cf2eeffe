use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::errors::AppError;
use crate::handlers::employee::{escape_like, page_bounds};
use crate::models::project::Project;
use crate::utils::auth::AuthenticatedUser;
use crate::utils::validation::{validate_coordinate_pair, validate_payload};

#[derive(Deserialize, Validate)]
pub struct NewProject {
    #[validate(length(min = 2, max = 120))]
    name: String,
    #[validate(length(min = 1, max = 32))]
    project_number: String,
    #[validate(length(max = 255))]
    address: Option<String>,
    #[validate(range(min = -90.0, max = 90.0))]
    latitude: Option<f64>,
    #[validate(range(min = -180.0, max = 180.0))]
    longitude: Option<f64>,
    #[validate(range(min = 1.0, max = 100000.0))]
    geofence_radius_m: Option<f64>,
}

#[derive(Deserialize)]
pub struct ProjectQueryParams {
    name: Option<String>,
    active: Option<bool>,
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Deserialize, Validate)]
pub struct ProjectUpdate {
    #[validate(length(min = 2, max = 120))]
    name: Option<String>,
    #[validate(length(min = 1, max = 32))]
    project_number: Option<String>,
    #[validate(length(max = 255))]
    address: Option<String>,
    #[validate(range(min = -90.0, max = 90.0))]
    latitude: Option<f64>,
    #[validate(range(min = -180.0, max = 180.0))]
    longitude: Option<f64>,
    #[validate(range(min = 1.0, max = 100000.0))]
    geofence_radius_m: Option<f64>,
    active: Option<bool>,
}

async fn project_number_taken(pool: &PgPool, number: &str, except: Option<Uuid>) -> Result<bool, AppError> {
    let taken: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM projects WHERE project_number = $1 AND project_id IS DISTINCT FROM $2)",
    )
    .bind(number)
    .bind(except)
    .fetch_one(pool)
    .await?;
    Ok(taken)
}

pub async fn create_project(
    user: AuthenticatedUser,
    pool: web::Data<PgPool>,
    new_project: web::Json<NewProject>,
) -> Result<HttpResponse, AppError> {
    user.require_admin()?;
    validate_payload(&new_project.0)?;

    validate_coordinate_pair(new_project.latitude, new_project.longitude)?;
    user.ensure_active(&pool).await?;
    if project_number_taken(&pool, &new_project.project_number, None).await? {
        return Err(AppError::Conflict("Project number already exists".to_string()));
    }

    let now = Utc::now();
    let project = sqlx::query_as::<_, Project>(
        r#"
        INSERT INTO projects (project_id, name, project_number, address, latitude, longitude,
                              geofence_radius_m, active, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, TRUE, $8, $8)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&new_project.name)
    .bind(&new_project.project_number)
    .bind(&new_project.address)
    .bind(new_project.latitude)
    .bind(new_project.longitude)
    .bind(new_project.geofence_radius_m)
    .bind(now)
    .fetch_one(&**pool)
    .await
    .map_err(AppError::conflict_on_unique("Project number already exists"))?;

    Ok(HttpResponse::Created().json(project))
}

pub async fn get_projects(
    _user: AuthenticatedUser,
    pool: web::Data<PgPool>,
    query: web::Query<ProjectQueryParams>,
) -> Result<HttpResponse, AppError> {
    let mut query_builder: sqlx::QueryBuilder<'_, sqlx::Postgres> =
        sqlx::QueryBuilder::new("SELECT * FROM projects WHERE TRUE");

    if let Some(name) = &query.name {
        query_builder.push(" AND (name ILIKE ");
        query_builder.push_bind(format!("%{}%", escape_like(name)));
        query_builder.push(" OR project_number ILIKE ");
        query_builder.push_bind(format!("{}%", escape_like(name)));
        query_builder.push(")");
    }
    if let Some(active) = query.active {
        query_builder.push(" AND active = ");
        query_builder.push_bind(active);
    }

    let (limit, offset) = page_bounds(query.limit, query.offset);
    query_builder.push(" ORDER BY name ASC LIMIT ");
    query_builder.push_bind(limit);
    query_builder.push(" OFFSET ");
    query_builder.push_bind(offset);

    let projects = query_builder
        .build_query_as::<Project>()
        .fetch_all(&**pool)
        .await?;

    Ok(HttpResponse::Ok().json(projects))
}

pub async fn update_project(
    user: AuthenticatedUser,
    pool: web::Data<PgPool>,
    project_id: web::Path<Uuid>,
    updates: web::Json<ProjectUpdate>,
) -> Result<HttpResponse, AppError> {
    user.require_admin()?;
    validate_payload(&updates.0)?;
    validate_coordinate_pair(updates.latitude, updates.longitude)?;
    user.ensure_active(&pool).await?;
    let project_id = project_id.into_inner();

    if let Some(number) = &updates.project_number {
        if project_number_taken(&pool, number, Some(project_id)).await? {
            return Err(AppError::Conflict("Project number already exists".to_string()));
        }
    }

    let mut query = sqlx::QueryBuilder::<sqlx::Postgres>::new("UPDATE projects SET ");
    let mut separated = query.separated(", ");

    if let Some(name) = &updates.name {
        separated.push("name = ");
        separated.push_bind_unseparated(name);
    }
    if let Some(number) = &updates.project_number {
        separated.push("project_number = ");
        separated.push_bind_unseparated(number);
    }
    if let Some(address) = &updates.address {
        separated.push("address = ");
        separated.push_bind_unseparated(address);
    }
    if let Some(latitude) = updates.latitude {
        separated.push("latitude = ");
        separated.push_bind_unseparated(latitude);
    }
    if let Some(longitude) = updates.longitude {
        separated.push("longitude = ");
        separated.push_bind_unseparated(longitude);
    }
    if let Some(radius) = updates.geofence_radius_m {
        separated.push("geofence_radius_m = ");
        separated.push_bind_unseparated(radius);
    }
    if let Some(active) = updates.active {
        separated.push("active = ");
        separated.push_bind_unseparated(active);
    }
    separated.push("updated_at = ");
    separated.push_bind_unseparated(Utc::now());
    query.push(" WHERE project_id = ");
    query.push_bind(project_id);
    query.push(" RETURNING *");

    let project = query
        .build_query_as::<Project>()
        .fetch_optional(&**pool)
        .await
        .map_err(AppError::conflict_on_unique("Project number already exists"))?
        .ok_or_else(|| AppError::NotFound("Project not found".to_string()))?;

    Ok(HttpResponse::Ok().json(project))
}

/// Deactivates the project; its time entries stay intact.
pub async fn delete_project(
    user: AuthenticatedUser,
    pool: web::Data<PgPool>,
    project_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    user.require_admin()?;
    user.ensure_active(&pool).await?;

    let result = sqlx::query("UPDATE projects SET active = FALSE, updated_at = $2 WHERE project_id = $1")
        .bind(project_id.into_inner())
        .bind(Utc::now())
        .execute(&**pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Project not found".to_string()));
    }

    Ok(HttpResponse::Ok().json(json!({
        "message": "Project deactivated successfully",
    })))
}
