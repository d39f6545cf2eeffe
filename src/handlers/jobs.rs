use actix_web::{web, HttpRequest, HttpResponse};

use crate::errors::AppError;
use crate::jobs::JobContext;
use crate::utils::auth::authorize_job_caller;

async fn authorize_caller(req: &HttpRequest, context: &JobContext) -> Result<(), AppError> {
    if let Some(admin) = authorize_job_caller(req, &context.config)? {
        admin.ensure_active(&context.pool).await?;
    }
    Ok(())
}

pub async fn run_auto_clockout(
    req: HttpRequest,
    context: web::Data<JobContext>,
) -> Result<HttpResponse, AppError> {
    authorize_caller(&req, &context).await?;
    let report = context.auto_clockout().await?;
    Ok(HttpResponse::Ok().json(report))
}

pub async fn run_reminders(
    req: HttpRequest,
    context: web::Data<JobContext>,
) -> Result<HttpResponse, AppError> {
    authorize_caller(&req, &context).await?;
    let report = context.reminders().await?;
    Ok(HttpResponse::Ok().json(report))
}

pub async fn run_filemaker_sync(
    req: HttpRequest,
    context: web::Data<JobContext>,
) -> Result<HttpResponse, AppError> {
    authorize_caller(&req, &context).await?;
    let report = context.filemaker_sync().await?;
    Ok(HttpResponse::Ok().json(report))
}
