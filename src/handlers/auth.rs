use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use validator::Validate;

use crate::config::Config;
use crate::errors::AppError;
use crate::models::employee::{Employee, Role};
use crate::utils::{jwt, password, validation::validate_payload};

#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    email: String,
    #[validate(length(min = 8, max = 64))]
    password: String,
}

#[derive(Serialize)]
pub struct AuthResponse {
    email: String,
    role: Role,
    token: String,
}

pub async fn login(
    req: web::Json<LoginRequest>,
    pool: web::Data<PgPool>,
    config: web::Data<Config>,
) -> Result<HttpResponse, AppError> {
    validate_payload(&req.0)?;

    let employee = sqlx::query_as::<_, Employee>(
        "SELECT * FROM employees WHERE LOWER(email) = LOWER($1) AND active",
    )
    .bind(&req.email)
    .fetch_optional(&**pool)
    .await?
    .ok_or_else(|| AppError::Unauthorized("Invalid email or password".to_string()))?;

    if !password::verify_password(&req.password, &employee.password_hash)? {
        return Err(AppError::Unauthorized("Invalid email or password".to_string()));
    }

    let token = jwt::generate_token(&config.jwt_secret, employee.employee_id, employee.role)
        .map_err(|_| AppError::InternalServerError("Token generation error".to_string()))?;

    log::info!("Employee {} signed in", employee.employee_id);

    Ok(HttpResponse::Ok().json(AuthResponse {
        email: employee.email,
        role: employee.role,
        token,
    }))
}
