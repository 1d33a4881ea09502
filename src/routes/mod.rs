use actix_web::{web, HttpResponse, Responder};

use crate::db::DBHealthStatus;
use crate::handlers::ping_handler;
use crate::types::{AppState, HealthStatus};

pub mod shortener;

// Handler function for the health check endpoint
async fn health_check(data: web::Data<AppState>) -> impl Responder {
    // Calculate uptime in seconds
    let uptime = data.start_time.elapsed().as_secs();

    let db_health = match &data.db {
        Some(db) => Some(db.health_check().await),
        None => None,
    };

    let healthy = db_health
        .as_ref()
        .map_or(true, |h| matches!(h.status, DBHealthStatus::Healthy));

    let status = HealthStatus {
        status: String::from(if healthy { "OK" } else { "DEGRADED" }),
        version: data.version.clone(),
        storage: data.storage.clone(),
        db_health,
        uptime_seconds: uptime,
    };

    if healthy {
        HttpResponse::Ok().json(status)
    } else {
        HttpResponse::ServiceUnavailable().json(status)
    }
}

// Configure all routes function
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    // Fixed paths must be registered before the `/{key}` catch-all
    cfg.route("/health", web::get().to(health_check));
    cfg.route("/ping", web::get().to(ping_handler));
    shortener::configure_routes(cfg);
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Instant;

    use actix_web::{http::StatusCode, test, App};
    use serde_json::Value;

    use super::*;
    use crate::repositories::{MemoryStore, UrlStore};
    use crate::services::ShortenerService;

    #[actix_web::test]
    async fn test_health_without_database() {
        let store: Arc<dyn UrlStore> = Arc::new(MemoryStore::new());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(AppState {
                    start_time: Instant::now(),
                    version: "1.2.3".into(),
                    storage: "Memory".into(),
                    db: None,
                }))
                .app_data(web::Data::new(ShortenerService::new(
                    store,
                    "http://localhost:8080",
                )))
                .configure(configure_routes),
        )
        .await;

        let res = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = test::read_body_json(res).await;
        assert_eq!(body["status"], "OK");
        assert_eq!(body["version"], "1.2.3");
        assert!(body.get("db_health").is_none());

        // `/ping` must not be taken for a short key
        let res = test::call_service(&app, test::TestRequest::get().uri("/ping").to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
    }
}
