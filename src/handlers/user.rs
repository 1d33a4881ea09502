use actix_web::{web, HttpResponse, Responder};
use log::{debug, error, info};

use crate::{
    errors::AppError,
    middleware::AuthenticatedUser,
    services::{ShortenerServiceTrait, ShortenerServiceType},
    types::Result,
};

/// List the URLs shortened by the current user
pub async fn list_user_urls_handler(
    user: AuthenticatedUser,
    service: web::Data<ShortenerServiceType>,
) -> Result<impl Responder> {
    // A user issued on this very request cannot own anything yet
    if user.is_new {
        return Err(AppError::Unauthorized(
            "no user identity was presented".to_string(),
        ));
    }

    let urls = service.list_by_user(&user.user_id).await?;
    if urls.is_empty() {
        return Ok(HttpResponse::NoContent().finish());
    }

    Ok(HttpResponse::Ok().json(urls))
}

/// Accept a list of short keys for deletion; the work happens in the background
pub async fn delete_user_urls_handler(
    keys: web::Json<Vec<String>>,
    user: AuthenticatedUser,
    service: web::Data<ShortenerServiceType>,
) -> Result<impl Responder> {
    let keys = keys.into_inner();
    let user_id = user.user_id;
    info!("Scheduling deletion of {} URLs for {}", keys.len(), user_id);

    let service = service.into_inner();
    actix_web::rt::spawn(async move {
        match service.mark_deleted(keys, &user_id).await {
            Ok(()) => debug!("Background deletion for {} finished", user_id),
            Err(e) => error!("Background deletion for {} failed: {}", user_id, e),
        }
    });

    Ok(HttpResponse::Accepted().finish())
}
