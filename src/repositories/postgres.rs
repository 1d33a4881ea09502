use async_trait::async_trait;
use csv::{QuoteStyle, Terminator, WriterBuilder};
use log::{debug, error, info};
use sqlx::{PgPool, Postgres, Transaction};

use super::{DeletePipeline, Result, UrlStore};
use crate::db::Database;
use crate::errors::store::is_unique_violation;
use crate::errors::StoreError;
use crate::models::UrlRecord;

const SELECT_COLUMNS: &str = "SELECT id, user_id, short_key, original_url, is_deleted FROM shorteners";

const COPY_STATEMENT: &str = "COPY shorteners (id, user_id, short_key, original_url, is_deleted) \
     FROM STDIN WITH (FORMAT csv)";

/// Store backed by the `shorteners` PostgreSQL table.
pub struct PostgresStore {
    db: Database,
    pool: PgPool,
    pipeline: DeletePipeline,
}

impl PostgresStore {
    pub fn new(db: Database) -> Self {
        Self::with_pipeline(db, DeletePipeline::default())
    }

    pub fn with_pipeline(db: Database, pipeline: DeletePipeline) -> Self {
        Self {
            pool: db.get_pool().clone(),
            db,
            pipeline,
        }
    }

    // Helper method for transactions
    async fn begin_transaction(&self) -> Result<Transaction<'_, Postgres>> {
        self.pool.begin().await.map_err(|e| {
            error!("Failed to start database transaction: {}", e);
            StoreError::from(e)
        })
    }

    async fn find_active_by_original_url(&self, original_url: &str) -> Result<Option<UrlRecord>> {
        let query = format!("{} WHERE original_url = $1 AND NOT is_deleted", SELECT_COLUMNS);
        let record = sqlx::query_as::<_, UrlRecord>(&query)
            .bind(original_url)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }
}

/// Encodes records as CSV rows for `COPY ... FROM STDIN`.
///
/// A missing `user_id` is written as an unquoted empty field, which COPY reads as NULL.
fn encode_copy_rows(records: &[UrlRecord]) -> Result<Vec<u8>> {
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .quote_style(QuoteStyle::Necessary)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    for record in records {
        let id = record.id.to_string();
        writer.write_record([
            id.as_str(),
            record.user_id.as_deref().unwrap_or_default(),
            record.short_key.as_str(),
            record.original_url.as_str(),
            if record.deleted_flag { "t" } else { "f" },
        ])?;
    }

    writer
        .into_inner()
        .map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Rejects a bulk copy that wrote a different number of rows than submitted
fn check_copied_count(expected: u64, actual: u64) -> Result<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(StoreError::CountMismatch { expected, actual })
    }
}

#[async_trait]
impl UrlStore for PostgresStore {
    async fn get(&self, short_key: &str) -> Result<UrlRecord> {
        // A key may be reused after a soft delete, so prefer the active row
        let query = format!(
            "{} WHERE short_key = $1 ORDER BY is_deleted ASC LIMIT 1",
            SELECT_COLUMNS
        );
        let record = sqlx::query_as::<_, UrlRecord>(&query)
            .bind(short_key)
            .fetch_optional(&self.pool)
            .await?;

        match record {
            Some(record) if record.deleted_flag => {
                Err(StoreError::AlreadyDeleted(short_key.to_string()))
            }
            Some(record) => Ok(record),
            None => Err(StoreError::NotFound(short_key.to_string())),
        }
    }

    async fn create(&self, record: UrlRecord) -> Result<UrlRecord> {
        let result = sqlx::query_as::<_, UrlRecord>(
            r#"
                INSERT INTO shorteners (id, user_id, short_key, original_url, is_deleted)
                VALUES ($1, $2, $3, $4, FALSE)
                RETURNING id, user_id, short_key, original_url, is_deleted
            "#,
        )
        .bind(record.id)
        .bind(&record.user_id)
        .bind(&record.short_key)
        .bind(&record.original_url)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(created) => Ok(created),
            Err(e) if is_unique_violation(&e) => {
                match self.find_active_by_original_url(&record.original_url).await? {
                    Some(existing) => {
                        debug!(
                            "URL {} already shortened as {}",
                            existing.original_url, existing.short_key
                        );
                        Err(StoreError::AlreadyExists(Box::new(existing)))
                    }
                    None => Err(StoreError::KeyConflict(record.short_key)),
                }
            }
            Err(e) => {
                error!("Failed to insert shortened URL: {}", e);
                Err(StoreError::from(e))
            }
        }
    }

    async fn create_batch(&self, records: Vec<UrlRecord>) -> Result<Vec<UrlRecord>> {
        if records.is_empty() {
            return Err(StoreError::EmptyInput);
        }

        let expected = records.len() as u64;
        let payload = encode_copy_rows(&records)?;
        let mut tx = self.begin_transaction().await?;

        let copied = {
            let mut copy = tx.copy_in_raw(COPY_STATEMENT).await?;

            if let Err(e) = copy.send(payload).await {
                error!("Failed to stream batch to COPY: {}", e);
                if let Err(abort_err) = copy.abort("batch streaming failed").await {
                    debug!("COPY abort reported: {}", abort_err);
                }
                return Err(StoreError::BulkWriteFailed(e.to_string()));
            }

            copy.finish().await
        };

        let actual = match copied {
            Ok(rows) => rows,
            Err(e) if is_unique_violation(&e) => {
                info!("Batch of {} URLs rejected by constraint: {}", expected, e);
                return Err(StoreError::BatchConflict(e.to_string()));
            }
            Err(e) => {
                error!("Bulk copy failed: {}", e);
                return Err(StoreError::from(e));
            }
        };

        if let Err(e) = check_copied_count(expected, actual) {
            error!("{}, rolling back", e);
            tx.rollback().await?;
            return Err(e);
        }

        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            StoreError::from(e)
        })?;

        debug!("Bulk copied {} URLs", actual);
        Ok(records)
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<UrlRecord>> {
        let query = format!("{} WHERE user_id = $1 AND NOT is_deleted", SELECT_COLUMNS);
        let records = sqlx::query_as::<_, UrlRecord>(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }

    async fn list_all(&self) -> Result<Vec<UrlRecord>> {
        let query = format!("{} WHERE NOT is_deleted", SELECT_COLUMNS);
        let records = sqlx::query_as::<_, UrlRecord>(&query)
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }

    async fn mark_deleted(&self, short_keys: Vec<String>, user_id: &str) -> Result<()> {
        let pool = self.pool.clone();
        let user_id = user_id.to_string();

        let affected = self
            .pipeline
            .run(short_keys, move |batch| {
                let pool = pool.clone();
                let user_id = user_id.clone();
                async move {
                    let result = sqlx::query(
                        r#"
                            UPDATE shorteners
                            SET is_deleted = TRUE
                            WHERE short_key = ANY($1) AND user_id = $2 AND NOT is_deleted
                        "#,
                    )
                    .bind(&batch)
                    .bind(&user_id)
                    .execute(&pool)
                    .await?;

                    Ok::<_, StoreError>(result.rows_affected())
                }
            })
            .await?;

        debug!("Soft-deleted {} URLs", affected);
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| StoreError::StorageUnavailable(e.to_string()))
    }

    async fn close(&self) {
        self.db.shutdown().await;
    }
}


#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::config::DatabaseConfig;
    use crate::utils::generate_short_key;

    #[test]
    fn test_copy_rows_encoding() {
        let records = vec![
            UrlRecord {
                id: Uuid::nil(),
                user_id: Some("u1".into()),
                short_key: "AbCdE".into(),
                original_url: "https://example.com/?q=\"a,b\"".into(),
                deleted_flag: false,
            },
            UrlRecord {
                id: Uuid::nil(),
                user_id: None,
                short_key: "FgHiJ".into(),
                original_url: "https://yandex.ru".into(),
                deleted_flag: true,
            },
        ];

        let encoded = String::from_utf8(encode_copy_rows(&records).unwrap()).unwrap();
        let lines: Vec<&str> = encoded.lines().collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            r#"00000000-0000-0000-0000-000000000000,u1,AbCdE,"https://example.com/?q=""a,b""",f"#
        );
        // Unquoted empty field is NULL for COPY
        assert_eq!(
            lines[1],
            "00000000-0000-0000-0000-000000000000,,FgHiJ,https://yandex.ru,t"
        );
    }

    #[test]
    fn test_copied_count_must_match() {
        assert!(check_copied_count(3, 3).is_ok());

        match check_copied_count(3, 2) {
            Err(StoreError::CountMismatch { expected, actual }) => {
                assert_eq!(expected, 3);
                assert_eq!(actual, 2);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    // The tests below need a live PostgreSQL server:
    // DATABASE_DSN=postgres://... cargo test -- --ignored

    async fn connect() -> Option<PostgresStore> {
        let url = std::env::var("DATABASE_DSN").ok()?;
        let config = DatabaseConfig {
            url,
            max_connections: 5,
            min_connections: 1,
            use_migrations: true,
            skip_db_exists_check: true,
            connect_timeout_seconds: 5,
            idle_timeout_seconds: 60,
            max_lifetime_seconds: 300,
            create_database_if_missing: false,
        };
        let db = Database::connect(&config).await.expect("database should be reachable");
        Some(PostgresStore::new(db))
    }

    fn unique_url() -> String {
        format!("https://example.com/{}", Uuid::new_v4())
    }

    fn record(url: &str, user: &str) -> UrlRecord {
        UrlRecord::new(generate_short_key(), url, Some(user.to_string()))
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_DSN"]
    async fn test_create_distinguishes_existing_url_from_taken_key() {
        let Some(store) = connect().await else { return };
        let user = Uuid::new_v4().to_string();

        let first = store.create(record(&unique_url(), &user)).await.unwrap();

        let same_url = UrlRecord::new(generate_short_key(), first.original_url.clone(), None);
        match store.create(same_url).await {
            Err(StoreError::AlreadyExists(existing)) => assert_eq!(*existing, first),
            other => panic!("unexpected result: {other:?}"),
        }

        let same_key = UrlRecord::new(first.short_key.clone(), unique_url(), None);
        assert!(matches!(
            store.create(same_key).await,
            Err(StoreError::KeyConflict(_))
        ));
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_DSN"]
    async fn test_mark_deleted_is_scoped_to_owner() {
        let Some(store) = connect().await else { return };
        let owner = Uuid::new_v4().to_string();
        let intruder = Uuid::new_v4().to_string();

        let created = store.create(record(&unique_url(), &owner)).await.unwrap();

        store
            .mark_deleted(vec![created.short_key.clone()], &intruder)
            .await
            .unwrap();
        assert_eq!(store.get(&created.short_key).await.unwrap(), created);

        store
            .mark_deleted(vec![created.short_key.clone()], &owner)
            .await
            .unwrap();
        assert!(matches!(
            store.get(&created.short_key).await,
            Err(StoreError::AlreadyDeleted(_))
        ));
        assert!(store.list_by_user(&owner).await.unwrap().is_empty());
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_DSN"]
    async fn test_get_prefers_active_row_after_key_reuse() {
        let Some(store) = connect().await else { return };
        let user = Uuid::new_v4().to_string();

        let old = store.create(record(&unique_url(), &user)).await.unwrap();
        store
            .mark_deleted(vec![old.short_key.clone()], &user)
            .await
            .unwrap();

        let reused = UrlRecord::new(old.short_key.clone(), unique_url(), Some(user.clone()));
        let reused = store.create(reused).await.unwrap();

        assert_eq!(store.get(&old.short_key).await.unwrap(), reused);
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_DSN"]
    async fn test_create_batch_is_all_or_nothing() {
        let Some(store) = connect().await else { return };
        let user = Uuid::new_v4().to_string();

        let existing = store.create(record(&unique_url(), &user)).await.unwrap();

        let fresh = record(&unique_url(), &user);
        let clash = record(&existing.original_url, &user);
        let err = store
            .create_batch(vec![fresh.clone(), clash])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::BatchConflict(_)));
        assert!(matches!(
            store.get(&fresh.short_key).await,
            Err(StoreError::NotFound(_))
        ));

        let batch = vec![record(&unique_url(), &user), record(&unique_url(), &user)];
        let created = store.create_batch(batch.clone()).await.unwrap();
        assert_eq!(created, batch);
        assert_eq!(store.list_by_user(&user).await.unwrap().len(), 3);
    }
}
