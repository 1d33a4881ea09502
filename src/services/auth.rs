use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::warn;
use rand::{distr::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AuthConfig;

/// Claims carried by the user cookie
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and verifies the HS256 tokens that identify users
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    cookie_name: String,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, cookie_name: impl Into<String>, ttl_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            cookie_name: cookie_name.into(),
            ttl: Duration::hours(ttl_hours.max(1)),
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        let secret = if config.secret_key.trim().is_empty() {
            warn!("AUTH_SECRET_KEY not set, generating a random secret; tokens will not survive a restart");
            rand::rng()
                .sample_iter(&Alphanumeric)
                .take(32)
                .map(char::from)
                .collect()
        } else {
            config.secret_key.clone()
        };

        Self::new(&secret, config.cookie_name.clone(), config.token_ttl_hours)
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Creates a new user id together with its signed token
    pub fn issue_new_user(&self) -> Result<(String, String), jsonwebtoken::errors::Error> {
        let user_id = Uuid::new_v4().to_string();
        let token = self.issue(&user_id)?;
        Ok((user_id, token))
    }

    pub fn issue(&self, user_id: &str) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
    }

    /// Returns the user id of a valid, unexpired token
    pub fn verify(&self, token: &str) -> Result<String, jsonwebtoken::errors::Error> {
        let data = decode::<Claims>(token, &self.decoding_key, &Validation::default())?;
        Ok(data.claims.sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_verify() {
        let service = TokenService::new("test_secret_key_32_bytes_long!!", "token", 24);
        let token = service.issue("user-1").unwrap();
        assert_eq!(service.verify(&token).unwrap(), "user-1");
    }

    #[test]
    fn test_token_from_other_secret_is_rejected() {
        let issuer = TokenService::new("first_secret_key_32_bytes_long!", "token", 24);
        let verifier = TokenService::new("second_secret_key_32_bytes_long", "token", 24);

        let token = issuer.issue("user-1").unwrap();
        assert!(verifier.verify(&token).is_err());
        assert!(verifier.verify("garbage").is_err());
    }

    #[test]
    fn test_new_users_are_distinct() {
        let service = TokenService::new("test_secret_key_32_bytes_long!!", "token", 24);
        let (a, token_a) = service.issue_new_user().unwrap();
        let (b, _) = service.issue_new_user().unwrap();

        assert_ne!(a, b);
        assert_eq!(service.verify(&token_a).unwrap(), a);
    }

    #[test]
    fn test_random_secret_when_unset() {
        let config = AuthConfig {
            secret_key: String::new(),
            cookie_name: "auth".into(),
            token_ttl_hours: 1,
        };
        let service = TokenService::from_config(&config);
        assert_eq!(service.cookie_name(), "auth");

        let token = service.issue("user-1").unwrap();
        assert_eq!(service.verify(&token).unwrap(), "user-1");
    }
}
