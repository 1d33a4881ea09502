use actix_web::{
    http::header::{ContentType, LOCATION},
    web, HttpResponse, Responder,
};
use log::{debug, info, warn};
use validator::Validate;

use crate::{
    middleware::AuthenticatedUser,
    models::{BatchShortenItemDto, ShortenRequestDto, ShortenResponseDto},
    services::{ShortenerServiceTrait, ShortenerServiceType},
    types::Result,
};

/// Shorten a URL sent as plain text
pub async fn shorten_text_handler(
    body: String,
    user: AuthenticatedUser,
    service: web::Data<ShortenerServiceType>,
) -> Result<impl Responder> {
    let outcome = service.put(&body, Some(&user.user_id)).await?;

    let mut response = if outcome.created {
        HttpResponse::Created()
    } else {
        HttpResponse::Conflict()
    };
    Ok(response
        .content_type(ContentType::plaintext())
        .body(outcome.short_url))
}

/// Shorten a URL sent as `{"url": ...}`
pub async fn shorten_json_handler(
    dto: web::Json<ShortenRequestDto>,
    user: AuthenticatedUser,
    service: web::Data<ShortenerServiceType>,
) -> Result<impl Responder> {
    let dto = dto.into_inner();
    dto.validate()?;

    let outcome = service.put(&dto.url, Some(&user.user_id)).await?;
    let payload = ShortenResponseDto {
        result: outcome.short_url,
    };

    if outcome.created {
        Ok(HttpResponse::Created().json(payload))
    } else {
        Ok(HttpResponse::Conflict().json(payload))
    }
}

/// Shorten several URLs at once, all or nothing
pub async fn shorten_batch_handler(
    items: web::Json<Vec<BatchShortenItemDto>>,
    user: AuthenticatedUser,
    service: web::Data<ShortenerServiceType>,
) -> Result<impl Responder> {
    let items = items.into_inner();
    for item in &items {
        item.validate()?;
    }

    let results = service.create_batch(Some(&user.user_id), items).await?;
    Ok(HttpResponse::Created().json(results))
}

/// Redirect route handler
pub async fn redirect_handler(
    path: web::Path<String>,
    service: web::Data<ShortenerServiceType>,
) -> Result<impl Responder> {
    let short_key = path.into_inner();
    debug!("Redirect requested for key: {}", short_key);

    let record = service.get(&short_key).await?;

    info!("Redirecting '{}' to '{}'", short_key, record.original_url);
    Ok(HttpResponse::TemporaryRedirect()
        .insert_header((LOCATION, record.original_url))
        .finish())
}

/// Store connectivity check
pub async fn ping_handler(service: web::Data<ShortenerServiceType>) -> impl Responder {
    match service.health_check().await {
        Ok(()) => HttpResponse::Ok().finish(),
        Err(e) => {
            warn!("Ping failed: {}", e);
            HttpResponse::InternalServerError().finish()
        }
    }
}
