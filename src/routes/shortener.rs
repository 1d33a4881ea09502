use actix_web::web;

use crate::handlers::{
    delete_user_urls_handler, list_user_urls_handler, redirect_handler, shorten_batch_handler,
    shorten_json_handler, shorten_text_handler,
};

// Configure all routes function
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/shorten", web::post().to(shorten_json_handler))
            .route("/shorten/batch", web::post().to(shorten_batch_handler))
            .route("/user/urls", web::get().to(list_user_urls_handler))
            .route("/user/urls", web::delete().to(delete_user_urls_handler)),
    )
    .route("/", web::post().to(shorten_text_handler))
    // Catch-all key lookup goes last
    .route("/{key}", web::get().to(redirect_handler));
}
