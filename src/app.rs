use std::sync::Arc;
use std::time::Instant;

use actix_web::{
    middleware::{Compress, DefaultHeaders, Logger},
    web, App, HttpServer,
};
use env_logger::Env;
use log::{debug, info};

use crate::{
    config::{Config, Environment, StorageStrategy},
    db::Database,
    errors::AppError,
    middleware::{RequestLogger, UserIdentity},
    routes,
    services::{self, ShortenerServiceTrait, TokenService},
    types::AppState,
};

// Custom result type for the application
pub type AppResult<T> = Result<T, AppError>;

// Setup logging with custom format and configuration
fn setup_logging(config: &Config) -> Result<(), AppError> {
    // Configure log level based on environment and config
    let log_level = match config.app.environment {
        Environment::Development => config.app.log_level.clone(),
        Environment::Testing => "debug,actix_web=info,sqlx=warn".to_string(),
        Environment::Production => "info,actix_web=warn,sqlx=warn".to_string(),
    };

    let env = Env::default()
        .filter_or("RUST_LOG", log_level)
        .write_style_or("RUST_LOG_STYLE", "always");

    env_logger::try_init_from_env(env)
        .map_err(|e| AppError::Logger(format!("Failed to initialize logger: {}", e)))
}

pub async fn server() -> AppResult<()> {
    // Load application configuration
    let config = Config::load()?;

    // Setup enhanced logging based on configuration
    setup_logging(&config)?;

    // Capture start time for uptime calculation
    let start_time = Instant::now();

    // Log startup information
    info!("Starting {} v{}", config.app.name, config.app.version);
    info!("Environment: {:?}", config.app.environment);
    info!(
        "Binding to {}:{} with {} workers",
        config.server.host, config.server.port, config.server.workers
    );

    if config.app.environment == Environment::Development {
        debug!("Debug logging enabled");
    }

    // The pool is opened once here and handed to the store
    let db = match &config.storage.db {
        Some(db_config) if config.storage.strategy == StorageStrategy::Database => {
            Some(Database::connect(db_config).await?)
        }
        _ => None,
    };

    let store = services::build_store(&config.storage, db.clone()).await?;
    let service = web::Data::new(services::register(store, &config.server.base_url));
    let tokens = Arc::new(TokenService::from_config(&config.auth));

    // Determine if we should enable more verbose logging
    let enable_debug_logging = config.app.environment != Environment::Production;

    // Determine log format based on environment
    let log_format = if enable_debug_logging {
        // Detailed format for development/testing
        "%a \"%r\" %s %b %T \"%{Referer}i\" \"%{User-Agent}i\" %{X-Request-ID}i"
    } else {
        "%a \"%r\" %s %b %T"
    };

    let version = config.app.version.clone();
    let storage = format!("{:?}", config.storage.strategy);
    let server_service = service.clone();

    // Start the HTTP server
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(AppState {
                start_time,
                version: version.clone(),
                storage: storage.clone(),
                db: db.clone(),
            }))
            .app_data(server_service.clone())
            // Innermost, so the user identity is already resolved when it logs
            .wrap(RequestLogger::new(enable_debug_logging))
            .wrap(UserIdentity::new(Arc::clone(&tokens)))
            .wrap(Compress::default())
            .wrap(Logger::new(log_format))
            // Add request tracking ID
            .wrap(DefaultHeaders::new().add(("X-Request-ID", uuid::Uuid::new_v4().to_string())))
            .configure(routes::configure_routes)
    })
    .workers(config.server.workers)
    .bind((config.server.host.to_string(), config.server.port))?
    .run()
    .await?;

    info!("Server stopped, releasing storage");
    service.shutdown().await;

    Ok(())
}
