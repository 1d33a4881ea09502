use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, error, info, warn};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::memory::UrlIndex;
use super::{Result, UrlStore};
use crate::errors::StoreError;
use crate::models::UrlRecord;

/// Store backed by an append-only, newline-delimited JSON log.
///
/// The log is replayed into an in-memory index on open. Creates and soft
/// deletes append full record lines; on replay the last line for a short key
/// wins. Every append is synced to disk before the call returns.
pub struct FileStore {
    path: PathBuf,
    state: Mutex<FileState>,
}

struct FileState {
    index: UrlIndex,
    log: File,
    /// Length of the log up to its last complete line
    len: u64,
    /// Makes the next write stop after this many bytes and fail
    #[cfg(test)]
    fail_write_after: Option<usize>,
}

/// Result of replaying a log file
#[derive(Debug, Default)]
pub(crate) struct Replay {
    pub(crate) records: Vec<UrlRecord>,
    /// Byte length of the valid prefix of the log
    pub(crate) valid_len: u64,
    /// The last line was complete JSON but lacked its newline
    pub(crate) missing_newline: bool,
}

/// Parses log contents.
///
/// A malformed final line is a torn write and is dropped. A malformed line
/// anywhere else is corruption and fails the replay.
pub(crate) fn replay_log(contents: &[u8]) -> Result<Replay> {
    let mut replay = Replay::default();
    let mut offset = 0usize;

    while offset < contents.len() {
        let rest = &contents[offset..];
        let (line, consumed, terminated) = match rest.iter().position(|b| *b == b'\n') {
            Some(end) => (&rest[..end], end + 1, true),
            None => (rest, rest.len(), false),
        };
        let is_last = offset + consumed >= contents.len();

        if line.iter().all(u8::is_ascii_whitespace) {
            offset += consumed;
            replay.valid_len = offset as u64;
            continue;
        }

        match serde_json::from_slice::<UrlRecord>(line) {
            Ok(record) => {
                replay.records.push(record);
                offset += consumed;
                replay.valid_len = offset as u64;
                replay.missing_newline = !terminated;
            }
            Err(e) if is_last => {
                warn!(
                    "Dropping partially written record at byte {} of the log: {}",
                    offset, e
                );
                break;
            }
            Err(e) => {
                return Err(StoreError::Serialization(format!(
                    "corrupt record at byte {}: {}",
                    offset, e
                )));
            }
        }
    }

    Ok(replay)
}

impl FileStore {
    /// Opens the log at `path`, creating it if missing, and rebuilds the index
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StoreError::StorageUnavailable(format!(
                    "cannot create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let mut log = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .await
            .map_err(|e| {
                StoreError::StorageUnavailable(format!("cannot open {}: {}", path.display(), e))
            })?;

        let contents = tokio::fs::read(&path).await?;
        let replay = replay_log(&contents)?;

        if replay.valid_len < contents.len() as u64 {
            warn!(
                "Truncating {} from {} to {} bytes",
                path.display(),
                contents.len(),
                replay.valid_len
            );
            log.set_len(replay.valid_len).await?;
            log.sync_data().await?;
        }

        let mut len = replay.valid_len;
        if replay.missing_newline {
            log.write_all(b"\n").await?;
            log.sync_data().await?;
            len += 1;
        }

        let mut index = UrlIndex::default();
        let replayed = replay.records.len();
        for record in replay.records {
            index.apply(record);
        }

        info!(
            "Loaded {} URL records ({} log lines) from {}",
            index.len(),
            replayed,
            path.display()
        );

        Ok(Self {
            path,
            state: Mutex::new(FileState {
                index,
                log,
                len,
                #[cfg(test)]
                fail_write_after: None,
            }),
        })
    }
}

impl FileState {
    /// Appends records as JSON lines and syncs them to disk.
    ///
    /// On failure the log is cut back to its previous length, so a partial
    /// write never sits in front of the next record.
    async fn append(&mut self, records: &[UrlRecord]) -> Result<()> {
        let mut buf = Vec::new();
        for record in records {
            serde_json::to_writer(&mut buf, record)?;
            buf.push(b'\n');
        }

        if let Err(e) = self.write_synced(&buf).await {
            if let Err(trunc_err) = self.log.set_len(self.len).await {
                error!(
                    "Failed to cut log back to {} bytes after a failed write: {}",
                    self.len, trunc_err
                );
            }
            return Err(e.into());
        }

        self.len += buf.len() as u64;
        Ok(())
    }

    async fn write_synced(&mut self, buf: &[u8]) -> io::Result<()> {
        #[cfg(test)]
        if let Some(limit) = self.fail_write_after.take() {
            self.log.write_all(&buf[..limit.min(buf.len())]).await?;
            self.log.flush().await?;
            return Err(io::Error::other("write interrupted"));
        }

        self.log.write_all(buf).await?;
        self.log.sync_data().await
    }
}

#[async_trait]
impl UrlStore for FileStore {
    async fn get(&self, short_key: &str) -> Result<UrlRecord> {
        self.state.lock().await.index.get(short_key)
    }

    async fn create(&self, record: UrlRecord) -> Result<UrlRecord> {
        let mut state = self.state.lock().await;
        let record = state.index.insert(record)?;

        if let Err(e) = state.append(std::slice::from_ref(&record)).await {
            error!("Failed to append record {} to log: {}", record.short_key, e);
            state.index.remove(&record);
            return Err(e);
        }

        Ok(record)
    }

    async fn create_batch(&self, records: Vec<UrlRecord>) -> Result<Vec<UrlRecord>> {
        if records.is_empty() {
            return Err(StoreError::EmptyInput);
        }

        let mut state = self.state.lock().await;
        state.index.insert_batch(&records)?;

        if let Err(e) = state.append(&records).await {
            error!("Failed to append batch of {} records: {}", records.len(), e);
            for record in &records {
                state.index.remove(record);
            }
            return Err(e);
        }

        Ok(records)
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<UrlRecord>> {
        Ok(self.state.lock().await.index.list_by_user(user_id))
    }

    async fn list_all(&self) -> Result<Vec<UrlRecord>> {
        Ok(self.state.lock().await.index.list_all())
    }

    async fn mark_deleted(&self, short_keys: Vec<String>, user_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let changed = state.index.mark_deleted(&short_keys, user_id);
        if changed.is_empty() {
            debug!("No URLs to delete for user {}", user_id);
            return Ok(());
        }

        if let Err(e) = state.append(&changed).await {
            error!("Failed to append delete markers: {}", e);
            state.index.restore(changed);
            return Err(e);
        }

        debug!("Marked {} URLs deleted for user {}", changed.len(), user_id);
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        tokio::fs::metadata(&self.path).await.map(|_| ()).map_err(|e| {
            StoreError::StorageUnavailable(format!("{}: {}", self.path.display(), e))
        })
    }

    async fn close(&self) {
        let state = self.state.lock().await;
        if let Err(e) = state.log.sync_all().await {
            warn!("Failed to sync {} on close: {}", self.path.display(), e);
        }
    }
}
