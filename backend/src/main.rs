mod config;
mod db;
mod fetch;
mod mq;
mod operations;
mod routes;
mod storage;
mod tasks;
#[cfg(test)]
mod test_support;

use std::io;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use config::AppConfig;
use db::StoreAccessor;
use fetch::ImageFetcher;
use mq::{AmqpPublisher, ResultPublisher};
use operations::OperationContext;
use routes::configure_routes;
use storage::ImageStorage;
use tasks::TaskService;

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = AppConfig::from_env().map_err(|e| {
        log::error!("Invalid configuration: {}", e);
        io::Error::new(io::ErrorKind::InvalidInput, e.to_string())
    })?;

    // The store must answer before any task is accepted.
    let store = web::Data::new(StoreAccessor::new(config.database.clone()));
    store.run().map_err(io::Error::other)?;
    if let Err(e) = store.check_connection().await {
        store.stop().await;
        return Err(io::Error::other(format!("Database health check failed: {}", e)));
    }

    log::info!(
        "Publishing task results to {} (queue {})",
        config.broker.redacted_url(),
        shared::RESULT_QUEUE
    );
    let publisher: Arc<dyn ResultPublisher> = Arc::new(AmqpPublisher::new(config.broker.clone()));

    let storage = ImageStorage::new(config.storage.path.clone());
    log::info!("Writing task output to {}", storage.root().display());

    let task_service = TaskService::new(
        ImageFetcher::new(config.fetch.timeout),
        OperationContext::new(storage, config.storage.preview_size),
        publisher,
    );

    let bind_address = config.server.bind_address();
    log::info!("Starting server on {}", bind_address);

    let app_store = store.clone();
    let mut server = HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(web::Data::new(task_service.clone()))
            .app_data(app_store.clone())
            .configure(configure_routes)
    });
    if let Some(workers) = config.server.workers {
        server = server.workers(workers);
    }

    let served = server.bind(&bind_address)?.run().await;

    store.stop().await;
    served
}
