// src/models/url_record.rs - Pure data structures
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::validations::validate_url;

/// A stored mapping from a short key to an original URL.
///
/// The serialized form is one line of the file store's log, so field names
/// here are part of the on-disk format.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct UrlRecord {
    /// Unique record identifier, assigned at creation
    pub id: Uuid,

    /// Owner of the record, when it was created by an identified user
    pub user_id: Option<String>,

    /// The generated short key that identifies this URL
    pub short_key: String,

    /// The original, long URL that was shortened
    pub original_url: String,

    /// Soft-delete marker. Set once, never unset.
    #[sqlx(rename = "is_deleted")]
    #[serde(default)]
    pub deleted_flag: bool,
}

impl UrlRecord {
    pub fn new(
        short_key: impl Into<String>,
        original_url: impl Into<String>,
        user_id: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            short_key: short_key.into(),
            original_url: original_url.into(),
            deleted_flag: false,
        }
    }

    /// Whether the record belongs to the given user
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id.as_deref() == Some(user_id)
    }
}

// DTO for the JSON shorten endpoint
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ShortenRequestDto {
    #[validate(custom(function = "validate_url"))]
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ShortenResponseDto {
    pub result: String,
}

// One item of a batch shorten request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BatchShortenItemDto {
    pub correlation_id: String,

    #[validate(custom(function = "validate_url"))]
    pub original_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchShortenResultDto {
    pub correlation_id: String,
    pub short_url: String,
}

// DTO for listing a user's URLs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserUrlDto {
    pub short_url: String,
    pub original_url: String,
}
