use std::rc::Rc;
use std::sync::Arc;

use actix_web::cookie::{time::Duration as CookieDuration, Cookie};
use actix_web::dev::{Payload, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{error::ErrorInternalServerError, Error, FromRequest, HttpMessage, HttpRequest};
use futures_util::future::{ok, ready, LocalBoxFuture, Ready};
use log::{debug, error};

use crate::errors::AppError;
use crate::services::TokenService;

/// Identity of the caller, resolved from the auth cookie
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: String,
    /// Set when the request carried no valid cookie and an id was just issued
    pub is_new: bool,
}

impl FromRequest for AuthenticatedUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthenticatedUser>()
                .cloned()
                .ok_or_else(|| AppError::Unauthorized("missing user identity".to_string())),
        )
    }
}

/// Resolves the user from the signed cookie, issuing a new identity
/// (and cookie) when it is absent or invalid.
pub struct UserIdentity {
    tokens: Arc<TokenService>,
}

impl UserIdentity {
    pub fn new(tokens: Arc<TokenService>) -> Self {
        Self { tokens }
    }
}

impl<S, B> Transform<S, ServiceRequest> for UserIdentity
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = UserIdentityMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(UserIdentityMiddleware {
            service: Rc::new(service),
            tokens: Arc::clone(&self.tokens),
        })
    }
}

pub struct UserIdentityMiddleware<S> {
    service: Rc<S>,
    tokens: Arc<TokenService>,
}

impl<S> UserIdentityMiddleware<S> {
    fn known_user(tokens: &TokenService, req: &ServiceRequest) -> Option<String> {
        let cookie = req.cookie(tokens.cookie_name())?;
        match tokens.verify(cookie.value()) {
            Ok(user_id) => Some(user_id),
            Err(e) => {
                debug!("Rejected auth cookie: {}", e);
                None
            }
        }
    }
}

impl<S, B> Service<ServiceRequest> for UserIdentityMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let tokens = Arc::clone(&self.tokens);

        Box::pin(async move {
            let (user, issued_token) = match Self::known_user(&tokens, &req) {
                Some(user_id) => (
                    AuthenticatedUser {
                        user_id,
                        is_new: false,
                    },
                    None,
                ),
                None => {
                    let (user_id, token) = tokens.issue_new_user().map_err(|e| {
                        error!("Failed to sign user token: {}", e);
                        ErrorInternalServerError("failed to issue user identity")
                    })?;
                    debug!("Issued new user id {}", user_id);
                    (
                        AuthenticatedUser {
                            user_id,
                            is_new: true,
                        },
                        Some(token),
                    )
                }
            };

            req.extensions_mut().insert(user);
            let mut res = service.call(req).await?;

            if let Some(token) = issued_token {
                let cookie = Cookie::build(tokens.cookie_name().to_string(), token)
                    .path("/")
                    .http_only(true)
                    .max_age(CookieDuration::seconds(tokens.ttl().num_seconds()))
                    .finish();
                res.response_mut().add_cookie(&cookie)?;
            }

            Ok(res)
        })
    }
}
