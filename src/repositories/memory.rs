use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use log::debug;
use tokio::sync::RwLock;

use super::{Result, UrlStore};
use crate::errors::StoreError;
use crate::models::UrlRecord;

/// In-memory lookup tables shared by the memory and file stores.
///
/// `by_url` only tracks active records, so a soft-deleted URL can be
/// shortened again.
#[derive(Debug, Default)]
pub(crate) struct UrlIndex {
    by_key: HashMap<String, UrlRecord>,
    by_url: HashMap<String, String>,
}

impl UrlIndex {
    pub(crate) fn get(&self, short_key: &str) -> Result<UrlRecord> {
        match self.by_key.get(short_key) {
            Some(record) if record.deleted_flag => {
                Err(StoreError::AlreadyDeleted(short_key.to_string()))
            }
            Some(record) => Ok(record.clone()),
            None => Err(StoreError::NotFound(short_key.to_string())),
        }
    }

    fn check_insert(&self, record: &UrlRecord) -> Result<()> {
        if let Some(existing) = self
            .by_url
            .get(&record.original_url)
            .and_then(|key| self.by_key.get(key))
        {
            return Err(StoreError::AlreadyExists(Box::new(existing.clone())));
        }

        if self
            .by_key
            .get(&record.short_key)
            .is_some_and(|existing| !existing.deleted_flag)
        {
            return Err(StoreError::KeyConflict(record.short_key.clone()));
        }

        Ok(())
    }

    pub(crate) fn insert(&mut self, record: UrlRecord) -> Result<UrlRecord> {
        self.check_insert(&record)?;
        self.apply(record.clone());
        Ok(record)
    }

    /// Inserts every record or none of them
    pub(crate) fn insert_batch(&mut self, records: &[UrlRecord]) -> Result<()> {
        let mut keys = HashSet::with_capacity(records.len());
        let mut urls = HashSet::with_capacity(records.len());

        for record in records {
            if !keys.insert(record.short_key.as_str()) || !urls.insert(record.original_url.as_str())
            {
                return Err(StoreError::BatchConflict(format!(
                    "duplicate entry in batch for '{}'",
                    record.original_url
                )));
            }

            self.check_insert(record).map_err(|e| match e {
                StoreError::AlreadyExists(_) => StoreError::BatchConflict(e.to_string()),
                other => StoreError::BulkWriteFailed(other.to_string()),
            })?;
        }

        for record in records {
            self.apply(record.clone());
        }
        Ok(())
    }

    /// Drops a record that was inserted but could not be persisted
    pub(crate) fn remove(&mut self, record: &UrlRecord) {
        if self
            .by_key
            .get(&record.short_key)
            .is_some_and(|stored| stored.id == record.id)
        {
            self.by_key.remove(&record.short_key);
        }
        if self.by_url.get(&record.original_url) == Some(&record.short_key) {
            self.by_url.remove(&record.original_url);
        }
    }

    /// Flags the user's records as deleted and returns the ones that changed
    pub(crate) fn mark_deleted(&mut self, short_keys: &[String], user_id: &str) -> Vec<UrlRecord> {
        let mut changed = Vec::new();

        for key in short_keys {
            let Some(record) = self.by_key.get_mut(key) else {
                continue;
            };
            if record.deleted_flag || !record.is_owned_by(user_id) {
                continue;
            }

            record.deleted_flag = true;
            if self.by_url.get(&record.original_url) == Some(key) {
                self.by_url.remove(&record.original_url);
            }
            changed.push(record.clone());
        }

        changed
    }

    /// Reverts records flagged by `mark_deleted` whose change could not be persisted
    pub(crate) fn restore(&mut self, records: Vec<UrlRecord>) {
        for mut record in records {
            record.deleted_flag = false;
            self.apply(record);
        }
    }

    /// Stores a record as-is, replacing whatever was under its key
    pub(crate) fn apply(&mut self, record: UrlRecord) {
        let key = record.short_key.clone();

        if record.deleted_flag {
            if self.by_url.get(&record.original_url) == Some(&key) {
                self.by_url.remove(&record.original_url);
            }
        } else {
            self.by_url.insert(record.original_url.clone(), key.clone());
        }

        // A soft-deleted record under the same key is dropped here, so reusing
        // a key erases the old record from the index for good.
        if let Some(previous) = self.by_key.insert(key.clone(), record) {
            let replaced_url = self
                .by_key
                .get(&key)
                .is_some_and(|current| current.original_url != previous.original_url);
            if replaced_url && self.by_url.get(&previous.original_url) == Some(&key) {
                self.by_url.remove(&previous.original_url);
            }
        }
    }

    pub(crate) fn list_by_user(&self, user_id: &str) -> Vec<UrlRecord> {
        self.by_key
            .values()
            .filter(|r| !r.deleted_flag && r.is_owned_by(user_id))
            .cloned()
            .collect()
    }

    pub(crate) fn list_all(&self) -> Vec<UrlRecord> {
        self.by_key
            .values()
            .filter(|r| !r.deleted_flag)
            .cloned()
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }
}

/// Store that keeps records in process memory only.
#[derive(Debug, Default)]
pub struct MemoryStore {
    index: RwLock<UrlIndex>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UrlStore for MemoryStore {
    async fn get(&self, short_key: &str) -> Result<UrlRecord> {
        self.index.read().await.get(short_key)
    }

    async fn create(&self, record: UrlRecord) -> Result<UrlRecord> {
        self.index.write().await.insert(record)
    }

    async fn create_batch(&self, records: Vec<UrlRecord>) -> Result<Vec<UrlRecord>> {
        if records.is_empty() {
            return Err(StoreError::EmptyInput);
        }

        self.index.write().await.insert_batch(&records)?;
        Ok(records)
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<UrlRecord>> {
        Ok(self.index.read().await.list_by_user(user_id))
    }

    async fn list_all(&self) -> Result<Vec<UrlRecord>> {
        Ok(self.index.read().await.list_all())
    }

    async fn mark_deleted(&self, short_keys: Vec<String>, user_id: &str) -> Result<()> {
        let changed = self.index.write().await.mark_deleted(&short_keys, user_id);
        debug!(
            "Marked {} of {} URLs deleted for user {}",
            changed.len(),
            short_keys.len(),
            user_id
        );
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn record(key: &str, url: &str, user: &str) -> UrlRecord {
        UrlRecord::new(key, url, Some(user.to_string()))
    }

    #[tokio::test]
    async fn create_and_get() {
        let store = MemoryStore::new();

        store
            .create(record("AbCdE", "https://yandex.ru", "u1"))
            .await
            .unwrap();

        let found = store.get("AbCdE").await.unwrap();
        assert_eq!(found.original_url, "https://yandex.ru");
        assert!(!found.deleted_flag);
    }

    #[tokio::test]
    async fn get_unknown_key() {
        let store = MemoryStore::new();

        let err = store.get("nope").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn create_same_url_returns_existing() {
        let store = MemoryStore::new();
        let first = store
            .create(record("AbCdE", "https://yandex.ru", "u1"))
            .await
            .unwrap();

        let err = store
            .create(record("FgHiJ", "https://yandex.ru", "u2"))
            .await
            .unwrap_err();

        match err {
            StoreError::AlreadyExists(existing) => assert_eq!(*existing, first),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(matches!(
            store.get("FgHiJ").await.unwrap_err(),
            StoreError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn create_taken_key_conflicts() {
        let store = MemoryStore::new();
        store
            .create(record("AbCdE", "https://yandex.ru", "u1"))
            .await
            .unwrap();

        let err = store
            .create(record("AbCdE", "https://ya.ru", "u1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::KeyConflict(_)));
    }

    #[tokio::test]
    async fn deleted_key_reports_already_deleted() {
        let store = MemoryStore::new();
        store
            .create(record("AbCdE", "https://yandex.ru", "u1"))
            .await
            .unwrap();

        store
            .mark_deleted(vec!["AbCdE".into()], "u1")
            .await
            .unwrap();

        let err = store.get("AbCdE").await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyDeleted(_)));
        assert!(store.list_by_user("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_ignores_other_users() {
        let store = MemoryStore::new();
        store
            .create(record("AbCdE", "https://yandex.ru", "owner"))
            .await
            .unwrap();

        store
            .mark_deleted(vec!["AbCdE".into(), "ZzZzZ".into()], "intruder")
            .await
            .unwrap();

        assert!(!store.get("AbCdE").await.unwrap().deleted_flag);
    }

    #[tokio::test]
    async fn deleted_url_can_be_shortened_again() {
        let store = MemoryStore::new();
        store
            .create(record("AbCdE", "https://yandex.ru", "u1"))
            .await
            .unwrap();
        store
            .mark_deleted(vec!["AbCdE".into()], "u1")
            .await
            .unwrap();

        let fresh = store
            .create(record("FgHiJ", "https://yandex.ru", "u1"))
            .await
            .unwrap();
        assert_eq!(store.get("FgHiJ").await.unwrap(), fresh);
    }

    #[tokio::test]
    async fn batch_empty_input() {
        let store = MemoryStore::new();

        let err = store.create_batch(vec![]).await.unwrap_err();
        assert!(matches!(err, StoreError::EmptyInput));
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn batch_is_all_or_nothing() {
        let store = MemoryStore::new();
        store
            .create(record("AbCdE", "https://yandex.ru", "u1"))
            .await
            .unwrap();

        let err = store
            .create_batch(vec![
                record("KlMnO", "https://practicum.yandex.ru", "u1"),
                record("PqRsT", "https://yandex.ru", "u1"),
            ])
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::BatchConflict(_)));
        assert!(matches!(
            store.get("KlMnO").await.unwrap_err(),
            StoreError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn batch_rejects_duplicates_within_batch() {
        let store = MemoryStore::new();

        let err = store
            .create_batch(vec![
                record("KlMnO", "https://practicum.yandex.ru", "u1"),
                record("PqRsT", "https://practicum.yandex.ru", "u1"),
            ])
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::BatchConflict(_)));
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_by_user_filters_owner() {
        let store = MemoryStore::new();
        store
            .create_batch(vec![
                record("AaAaA", "https://a.example", "u1"),
                record("BbBbB", "https://b.example", "u2"),
                record("CcCcC", "https://c.example", "u1"),
            ])
            .await
            .unwrap();

        let mut keys: Vec<String> = store
            .list_by_user("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.short_key)
            .collect();
        keys.sort();
        assert_eq!(keys, vec!["AaAaA", "CcCcC"]);
        assert_eq!(store.list_all().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn concurrent_creates_of_same_url_keep_one_key() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = vec![];

        for i in 0..20 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .create(record(&format!("key{:02}", i), "https://yandex.ru", "u1"))
                    .await
            }));
        }

        let mut created = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => created += 1,
                Err(StoreError::AlreadyExists(_)) => {}
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        assert_eq!(created, 1);
        assert_eq!(store.list_all().await.unwrap().len(), 1);
    }

    #[test]
    fn index_restore_reverts_delete() {
        let mut index = UrlIndex::default();
        index
            .insert(record("AbCdE", "https://yandex.ru", "u1"))
            .unwrap();

        let changed = index.mark_deleted(&["AbCdE".to_string()], "u1");
        assert_eq!(changed.len(), 1);

        index.restore(changed);
        assert!(!index.get("AbCdE").unwrap().deleted_flag);
        assert!(matches!(
            index.insert(record("FgHiJ", "https://yandex.ru", "u1")),
            Err(StoreError::AlreadyExists(_))
        ));
    }
}
