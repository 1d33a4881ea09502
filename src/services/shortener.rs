// src/services/shortener.rs - Business logic
use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, warn};

use crate::errors::{ServiceError, StoreError};
use crate::models::{BatchShortenItemDto, BatchShortenResultDto, UrlRecord, UserUrlDto};
use crate::repositories::UrlStore;
use crate::utils::generate_short_key;
use crate::utils::url::{compose_short_url, normalize_short_key, parse_target_url};

type Result<T> = std::result::Result<T, ServiceError>;

/// Attempts at finding a free short key before giving up
const MAX_KEY_ATTEMPTS: usize = 5;

/// Result of shortening a single URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOutcome {
    pub short_url: String,
    /// `false` when the URL was already shortened and the existing key is returned
    pub created: bool,
}

#[async_trait]
pub trait ShortenerServiceTrait {
    async fn put(&self, original_url: &str, user_id: Option<&str>) -> Result<PutOutcome>;
    async fn get(&self, short_key: &str) -> Result<UrlRecord>;
    async fn get_all(&self) -> Result<Vec<UrlRecord>>;
    async fn create_batch(
        &self,
        user_id: Option<&str>,
        items: Vec<BatchShortenItemDto>,
    ) -> Result<Vec<BatchShortenResultDto>>;
    async fn list_by_user(&self, user_id: &str) -> Result<Vec<UserUrlDto>>;
    async fn mark_deleted(&self, short_keys: Vec<String>, user_id: &str) -> Result<()>;
    async fn health_check(&self) -> Result<()>;
    async fn shutdown(&self);
}

/// Facade over a URL store. The backend is picked once, when the store is built.
pub struct ShortenerService<T: UrlStore + ?Sized> {
    store: Arc<T>,
    base_url: String,
}

pub type ShortenerServiceType = ShortenerService<dyn UrlStore>;

impl<T: UrlStore + ?Sized> ShortenerService<T> {
    pub fn new(store: Arc<T>, base_url: impl Into<String>) -> Self {
        Self {
            store,
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn short_url(&self, short_key: &str) -> String {
        compose_short_url(&self.base_url, short_key)
    }
}

fn validate_target(original_url: &str) -> Result<String> {
    let trimmed = original_url.trim();
    parse_target_url(trimmed).map_err(|e| ServiceError::InvalidUrl(e.to_string()))?;
    Ok(trimmed.to_string())
}

#[async_trait]
impl<T: UrlStore + ?Sized> ShortenerServiceTrait for ShortenerService<T> {
    async fn put(&self, original_url: &str, user_id: Option<&str>) -> Result<PutOutcome> {
        let original_url = validate_target(original_url)?;

        for attempt in 1..=MAX_KEY_ATTEMPTS {
            let record = UrlRecord::new(
                generate_short_key(),
                original_url.clone(),
                user_id.map(str::to_string),
            );

            match self.store.create(record).await {
                Ok(created) => {
                    info!("Shortened {} as {}", created.original_url, created.short_key);
                    return Ok(PutOutcome {
                        short_url: self.short_url(&created.short_key),
                        created: true,
                    });
                }
                Err(StoreError::AlreadyExists(existing)) => {
                    debug!("{} already has key {}", original_url, existing.short_key);
                    return Ok(PutOutcome {
                        short_url: self.short_url(&existing.short_key),
                        created: false,
                    });
                }
                Err(StoreError::KeyConflict(key)) => {
                    debug!("Key {} taken, attempt {}/{}", key, attempt, MAX_KEY_ATTEMPTS);
                }
                Err(e) => return Err(ServiceError::store("put", e)),
            }
        }

        Err(ServiceError::Internal(
            "Failed to generate a unique short key after multiple attempts".to_string(),
        ))
    }

    async fn get(&self, short_key: &str) -> Result<UrlRecord> {
        let short_key = normalize_short_key(short_key);
        self.store
            .get(&short_key)
            .await
            .map_err(|e| ServiceError::store("get", e))
    }

    async fn get_all(&self) -> Result<Vec<UrlRecord>> {
        self.store
            .list_all()
            .await
            .map_err(|e| ServiceError::store("get_all", e))
    }

    async fn create_batch(
        &self,
        user_id: Option<&str>,
        items: Vec<BatchShortenItemDto>,
    ) -> Result<Vec<BatchShortenResultDto>> {
        if items.is_empty() {
            return Err(ServiceError::store("create_batch", StoreError::EmptyInput));
        }

        // Keys must also be distinct within the batch itself
        let mut keys = HashSet::with_capacity(items.len());
        let mut records = Vec::with_capacity(items.len());
        for item in &items {
            let original_url = validate_target(&item.original_url)?;
            let mut key = generate_short_key();
            while !keys.insert(key.clone()) {
                key = generate_short_key();
            }
            records.push(UrlRecord::new(key, original_url, user_id.map(str::to_string)));
        }

        let created = self
            .store
            .create_batch(records)
            .await
            .map_err(|e| ServiceError::store("create_batch", e))?;

        info!("Shortened a batch of {} URLs", created.len());

        Ok(items
            .into_iter()
            .zip(created)
            .map(|(item, record)| BatchShortenResultDto {
                correlation_id: item.correlation_id,
                short_url: self.short_url(&record.short_key),
            })
            .collect())
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<UserUrlDto>> {
        let records = self
            .store
            .list_by_user(user_id)
            .await
            .map_err(|e| ServiceError::store("list_by_user", e))?;

        Ok(records
            .into_iter()
            .map(|record| UserUrlDto {
                short_url: self.short_url(&record.short_key),
                original_url: record.original_url,
            })
            .collect())
    }

    async fn mark_deleted(&self, short_keys: Vec<String>, user_id: &str) -> Result<()> {
        let short_keys: Vec<String> = short_keys
            .iter()
            .map(|k| normalize_short_key(k))
            .filter(|k| !k.is_empty())
            .collect();

        if short_keys.is_empty() {
            return Ok(());
        }

        let count = short_keys.len();
        self.store
            .mark_deleted(short_keys, user_id)
            .await
            .map_err(|e| {
                warn!("Deleting {} URLs for {} failed: {}", count, user_id, e);
                ServiceError::store("mark_deleted", e)
            })
    }

    async fn health_check(&self) -> Result<()> {
        self.store
            .health_check()
            .await
            .map_err(|e| ServiceError::store("health_check", e))
    }

    async fn shutdown(&self) {
        info!("Closing URL store");
        self.store.close().await;
    }
}
