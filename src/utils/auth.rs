use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use sqlx::PgPool;
use std::future::{ready, Ready};
use uuid::Uuid;

use crate::config::Config;
use crate::errors::AppError;
use crate::models::employee::Role;
use crate::utils::jwt;

pub const CRON_SECRET_HEADER: &str = "X-Cron-Secret";

/// Caller identity taken from a `Bearer` JWT.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub employee_id: Uuid,
    pub role: Role,
}

impl AuthenticatedUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden("Admin access required".to_string()))
        }
    }

    /// Tokens outlive deactivation, so anything that writes checks the row.
    pub async fn ensure_active(&self, pool: &PgPool) -> Result<(), AppError> {
        let active: Option<bool> = sqlx::query_scalar("SELECT active FROM employees WHERE employee_id = $1")
            .bind(self.employee_id)
            .fetch_optional(pool)
            .await?;

        match active {
            Some(true) => Ok(()),
            _ => Err(AppError::Unauthorized("Account is deactivated".to_string())),
        }
    }
}

pub fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|auth| auth.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn authenticate(req: &HttpRequest) -> Result<AuthenticatedUser, AppError> {
    let config = req
        .app_data::<web::Data<Config>>()
        .ok_or_else(|| AppError::InternalServerError("Configuration missing".to_string()))?;

    let token = bearer_token(req).ok_or_else(|| AppError::Unauthorized("Missing token".to_string()))?;

    let claims = jwt::validate_token(&config.jwt_secret, token)
        .map_err(|_| AppError::Unauthorized("Invalid token".to_string()))?;

    let employee_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::Unauthorized("Invalid employee ID in token".to_string()))?;

    Ok(AuthenticatedUser {
        employee_id,
        role: claims.role,
    })
}

impl FromRequest for AuthenticatedUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(authenticate(req))
    }
}

/// Scheduler callers present the shared cron secret; people present an admin token.
///
/// Returns the admin when the caller used a token, so the handler can check
/// the account is still active.
pub fn authorize_job_caller(req: &HttpRequest, config: &Config) -> Result<Option<AuthenticatedUser>, AppError> {
    if let Some(expected) = config.cron_secret.as_deref() {
        let presented = req
            .headers()
            .get(CRON_SECRET_HEADER)
            .and_then(|value| value.to_str().ok());
        if let Some(presented) = presented {
            if presented == expected {
                return Ok(None);
            }
            return Err(AppError::Unauthorized("Invalid cron secret".to_string()));
        }
    }

    let user = authenticate(req)?;
    user.require_admin()?;
    Ok(Some(user))
}
