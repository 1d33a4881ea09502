mod auth;
mod request_logger;

pub use auth::{AuthenticatedUser, UserIdentity};
pub use request_logger::RequestLogger;
