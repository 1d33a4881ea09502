// src/repositories/mod.rs - Data access
use async_trait::async_trait;

use crate::errors::StoreError;
use crate::models::UrlRecord;

mod delete_pipeline;
mod file;
mod memory;
mod postgres;

pub use delete_pipeline::{DeletePipeline, DELETE_BATCH_SIZE};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use postgres::PostgresStore;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Storage of URL records, implemented once per backend.
///
/// Every backend honours the same contract: a short key is unique among
/// active records, an original URL has at most one active short key, and
/// records are only ever soft-deleted.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UrlStore: Send + Sync {
    /// Finds a record by its short key
    ///
    /// ### Errors
    /// * `StoreError::NotFound` - If no record has this key
    /// * `StoreError::AlreadyDeleted` - If the record exists but was soft-deleted
    async fn get(&self, short_key: &str) -> Result<UrlRecord>;

    /// Saves a new record
    ///
    /// ### Errors
    /// * `StoreError::AlreadyExists` - If the original URL already has an active key;
    ///   carries the existing record
    /// * `StoreError::KeyConflict` - If the short key is taken by another active record
    async fn create(&self, record: UrlRecord) -> Result<UrlRecord>;

    /// Saves several records at once. Either all records are written or none.
    ///
    /// ### Errors
    /// * `StoreError::EmptyInput` - If `records` is empty
    /// * `StoreError::CountMismatch` - If fewer rows were written than submitted
    /// * `StoreError::BatchConflict` - If a record conflicts with stored data or
    ///   with another record of the batch
    /// * `StoreError::BulkWriteFailed` - If the backend could not carry out the write
    async fn create_batch(&self, records: Vec<UrlRecord>) -> Result<Vec<UrlRecord>>;

    /// Lists the active records owned by a user, empty when there are none
    async fn list_by_user(&self, user_id: &str) -> Result<Vec<UrlRecord>>;

    /// Lists every active record
    async fn list_all(&self) -> Result<Vec<UrlRecord>>;

    /// Soft-deletes the records with the given keys that belong to `user_id`.
    /// Keys that do not exist or belong to someone else are skipped.
    async fn mark_deleted(&self, short_keys: Vec<String>, user_id: &str) -> Result<()>;

    /// Checks that the backend is reachable
    async fn health_check(&self) -> Result<()>;

    /// Releases backend resources. Safe to call more than once.
    async fn close(&self);
}
