use std::sync::Arc;

use log::info;

mod auth;
mod shortener;

pub use auth::{Claims, TokenService};
pub use shortener::{PutOutcome, ShortenerService, ShortenerServiceTrait, ShortenerServiceType};

use crate::{
    config::{StorageConfig, StorageStrategy},
    db::Database,
    errors::AppError,
    repositories::{FileStore, MemoryStore, PostgresStore, UrlStore},
};

/// Builds the store selected by the storage strategy.
///
/// The database handle is created by the caller so it can also back the
/// health endpoint.
pub async fn build_store(
    config: &StorageConfig,
    db: Option<Database>,
) -> Result<Arc<dyn UrlStore>, AppError> {
    let store: Arc<dyn UrlStore> = match config.strategy {
        StorageStrategy::Memory => {
            info!("Storing URLs in memory");
            Arc::new(MemoryStore::new())
        }
        StorageStrategy::File => {
            let path = config.file_path.as_ref().ok_or_else(|| {
                AppError::Config("file storage requires FILE_STORAGE_PATH".to_string())
            })?;
            info!("Storing URLs in {}", path.display());
            Arc::new(FileStore::open(path).await?)
        }
        StorageStrategy::Database => {
            let db = db.ok_or_else(|| {
                AppError::Config("database storage requires DATABASE_DSN".to_string())
            })?;
            info!("Storing URLs in PostgreSQL");
            Arc::new(PostgresStore::new(db))
        }
    };

    Ok(store)
}

/// Service Register
pub fn register(store: Arc<dyn UrlStore>, base_url: &str) -> ShortenerServiceType {
    ShortenerService::new(store, base_url)
}
