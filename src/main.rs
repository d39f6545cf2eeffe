use actix_web::{web, App, HttpServer};
use dotenv::dotenv;
use log::{error, info};
use std::sync::Arc;
use std::time::Duration;

use fieldclock_backend::config::Config;
use fieldclock_backend::filemaker::FileMakerClient;
use fieldclock_backend::jobs::{scheduler, JobContext};
use fieldclock_backend::{db, notify, routes, utils};

fn fail(context: &str, err: impl std::fmt::Display) -> std::io::Error {
    error!("{}: {}", context, err);
    std::io::Error::new(std::io::ErrorKind::Other, format!("{}: {}", context, err))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env().map_err(|err| fail("Invalid configuration", err))?;

    let pool = db::create_pool(&config)
        .await
        .map_err(|err| fail("Failed to connect to the database", err))?;
    db::run_migrations(&pool)
        .await
        .map_err(|err| fail("Failed to run migrations", err))?;
    db::ensure_admin(&pool, &config)
        .await
        .map_err(|err| fail("Failed to create bootstrap admin", err))?;

    let filemaker = match config.filemaker.as_ref() {
        Some(fm) => {
            let client = FileMakerClient::new(fm).map_err(|err| fail("Invalid FileMaker settings", err))?;
            info!("FileMaker sync enabled against {}", client.base_url());
            Some(Arc::new(client))
        }
        None => {
            info!("FileMaker sync disabled");
            None
        }
    };

    let notifier = notify::from_config(&config).map_err(|err| fail("Failed to set up notifications", err))?;
    let s3_client = web::Data::new(utils::s3::create_s3_client().await);

    let bind_address = config.bind_address.clone();
    let config = web::Data::new(config);
    let job_context = JobContext {
        pool: pool.clone(),
        config: config.clone().into_inner(),
        notifier,
        filemaker,
    };

    if config.scheduler_enabled {
        scheduler::spawn(
            job_context.clone(),
            Duration::from_secs(config.scheduler_interval_secs),
        );
    }

    let job_context = web::Data::new(job_context);

    info!("Starting server at {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(pool.clone()))
            .app_data(config.clone())
            .app_data(job_context.clone())
            .app_data(s3_client.clone())
            .configure(routes::configure)
    })
    .bind(bind_address)?
    .run()
    .await
}
