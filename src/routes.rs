use actix_web::web;

use crate::errors::AppError;
use crate::handlers;

/// Registers every route; shared by the server and the integration tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| AppError::BadRequest(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| AppError::BadRequest(err.to_string()).into()),
    )
    .app_data(
        web::PathConfig::default()
            .error_handler(|err, _req| AppError::BadRequest(err.to_string()).into()),
    )
    .service(web::resource("/health").route(web::get().to(handlers::health::health)))
    .service(web::resource("/v1/auth").route(web::post().to(handlers::auth::login)))
    .service(web::resource("/v1/me").route(web::get().to(handlers::employee::get_me)))
    .service(
        web::resource("/v1/employee")
            .route(web::post().to(handlers::employee::create_employee))
            .route(web::get().to(handlers::employee::get_employees)),
    )
    .service(
        web::resource("/v1/employee/{employee_id}")
            .route(web::patch().to(handlers::employee::update_employee))
            .route(web::delete().to(handlers::employee::delete_employee)),
    )
    .service(
        web::resource("/v1/employee/{employee_id}/photo")
            .route(web::post().to(handlers::employee::upload_photo)),
    )
    .service(
        web::resource("/v1/project")
            .route(web::post().to(handlers::project::create_project))
            .route(web::get().to(handlers::project::get_projects)),
    )
    .service(
        web::resource("/v1/project/{project_id}")
            .route(web::patch().to(handlers::project::update_project))
            .route(web::delete().to(handlers::project::delete_project)),
    )
    .service(web::resource("/v1/time/clock-in").route(web::post().to(handlers::time_entry::clock_in)))
    .service(web::resource("/v1/time/clock-out").route(web::post().to(handlers::time_entry::clock_out)))
    .service(web::resource("/v1/time/status").route(web::get().to(handlers::time_entry::get_status)))
    .service(web::resource("/v1/time/entries").route(web::get().to(handlers::time_entry::get_entries)))
    .service(
        web::resource("/v1/time/entries/{time_entry_id}")
            .route(web::patch().to(handlers::time_entry::update_entry))
            .route(web::delete().to(handlers::time_entry::delete_entry)),
    )
    .service(
        web::resource("/v1/preferences")
            .route(web::get().to(handlers::preferences::get_preferences))
            .route(web::put().to(handlers::preferences::update_preferences)),
    )
    .service(web::resource("/v1/payroll").route(web::get().to(handlers::payroll::get_payroll)))
    .service(web::resource("/v1/payroll/me").route(web::get().to(handlers::payroll::get_my_payroll)))
    .service(
        web::resource("/v1/payroll/generate").route(web::post().to(handlers::payroll::generate_payroll)),
    )
    .service(
        web::resource("/v1/jobs/auto-clockout").route(web::post().to(handlers::jobs::run_auto_clockout)),
    )
    .service(web::resource("/v1/jobs/reminders").route(web::post().to(handlers::jobs::run_reminders)))
    .service(
        web::resource("/v1/jobs/filemaker-sync").route(web::post().to(handlers::jobs::run_filemaker_sync)),
    );
}
