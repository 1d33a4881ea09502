use std::future::Future;
use std::sync::Arc;

use log::{debug, warn};
use tokio::sync::{mpsc, watch, Mutex};

use super::Result;
use crate::errors::StoreError;

/// Number of short keys updated per statement
pub const DELETE_BATCH_SIZE: usize = 10;

/// Fan-out of soft-delete batches over a fixed pool of workers.
///
/// Keys are chunked into batches and pushed onto a bounded queue. Workers
/// take batches until the queue is drained. The first failing batch raises a
/// cancellation signal: the producer stops enqueuing and workers stop after
/// their current batch. Every task is joined before `run` returns, and all
/// worker errors are reported together. Batches that already succeeded stay
/// applied.
#[derive(Debug, Clone, Copy)]
pub struct DeletePipeline {
    batch_size: usize,
    workers: usize,
}

impl Default for DeletePipeline {
    fn default() -> Self {
        Self::new(DELETE_BATCH_SIZE, num_cpus::get())
    }
}

impl DeletePipeline {
    pub fn new(batch_size: usize, workers: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            workers: workers.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Runs `execute` once per batch and returns the total of affected rows.
    ///
    /// `execute` returns the number of rows it changed. Zero is not an error.
    pub async fn run<F, Fut>(&self, short_keys: Vec<String>, execute: F) -> Result<u64>
    where
        F: Fn(Vec<String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<u64>> + Send + 'static,
    {
        let batches: Vec<Vec<String>> = short_keys
            .chunks(self.batch_size)
            .map(<[String]>::to_vec)
            .collect();

        if batches.is_empty() {
            return Ok(0);
        }

        let workers = self.workers.min(batches.len());
        debug!(
            "Deleting {} keys in {} batches with {} workers",
            short_keys.len(),
            batches.len(),
            workers
        );

        let (batch_tx, batch_rx) = mpsc::channel::<Vec<String>>(workers);
        let batch_rx = Arc::new(Mutex::new(batch_rx));
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let cancel_tx = Arc::new(cancel_tx);
        let execute = Arc::new(execute);

        let producer = tokio::spawn(produce(batches, batch_tx, cancel_rx));

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let batch_rx = Arc::clone(&batch_rx);
            let cancel_tx = Arc::clone(&cancel_tx);
            let execute = Arc::clone(&execute);

            handles.push(tokio::spawn(async move {
                let mut affected = 0u64;
                loop {
                    if *cancel_tx.borrow() {
                        debug!("Delete worker {} stopping on cancellation", worker_id);
                        break;
                    }

                    let batch = batch_rx.lock().await.recv().await;
                    let Some(batch) = batch else {
                        break;
                    };

                    let size = batch.len();
                    match execute(batch).await {
                        Ok(0) => debug!(
                            "Delete worker {}: batch of {} keys matched no rows",
                            worker_id, size
                        ),
                        Ok(rows) => affected += rows,
                        Err(e) => {
                            warn!("Delete worker {} failed: {}", worker_id, e);
                            cancel_tx.send_replace(true);
                            return Err(e);
                        }
                    }
                }
                Ok(affected)
            }));
        }

        let mut errors = Vec::new();
        let mut affected = 0u64;

        for (worker_id, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(Ok(rows)) => affected += rows,
                Ok(Err(e)) => errors.push(e.to_string()),
                Err(e) => {
                    cancel_tx.send_replace(true);
                    errors.push(format!("delete worker {} panicked: {}", worker_id, e));
                }
            }
        }

        if let Err(e) = producer.await {
            errors.push(format!("delete producer panicked: {}", e));
        }

        if !errors.is_empty() {
            return Err(StoreError::DeleteFailed(errors));
        }

        debug!("Soft delete pipeline finished, {} rows affected", affected);
        Ok(affected)
    }
}

/// Feeds batches to the workers until done or cancelled
async fn produce(
    batches: Vec<Vec<String>>,
    batch_tx: mpsc::Sender<Vec<String>>,
    mut cancel_rx: watch::Receiver<bool>,
) {
    for batch in batches {
        if *cancel_rx.borrow() {
            break;
        }

        tokio::select! {
            biased;
            _ = cancel_rx.changed() => {
                debug!("Delete producer stopping on cancellation");
                break;
            }
            sent = batch_tx.send(batch) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }
    // Dropping the sender closes the queue and lets idle workers exit
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    use super::*;

    fn keys(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("k{:03}", i)).collect()
    }

    #[tokio::test]
    async fn every_key_is_processed_once() {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let pipeline = DeletePipeline::new(10, 4);

        let sink = Arc::clone(&seen);
        let affected = pipeline
            .run(keys(95), move |batch| {
                let sink = Arc::clone(&sink);
                async move {
                    assert!(batch.len() <= 10);
                    let rows = batch.len() as u64;
                    sink.lock().unwrap().extend(batch);
                    Ok(rows)
                }
            })
            .await
            .unwrap();

        assert_eq!(affected, 95);
        let seen = seen.lock().unwrap();
        let unique: HashSet<&String> = seen.iter().collect();
        assert_eq!(seen.len(), 95);
        assert_eq!(unique.len(), 95);
    }

    #[tokio::test]
    async fn empty_input_runs_nothing() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let affected = DeletePipeline::default()
            .run(vec![], move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(1) }
            })
            .await
            .unwrap();

        assert_eq!(affected, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn zero_rows_is_not_an_error() {
        let affected = DeletePipeline::new(10, 2)
            .run(keys(25), |_| async { Ok(0) })
            .await
            .unwrap();

        assert_eq!(affected, 0);
    }

    #[tokio::test]
    async fn failure_stops_further_batches() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        // One worker makes the ordering deterministic
        let err = DeletePipeline::new(10, 1)
            .run(keys(100), move |batch| {
                let call = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if call == 2 {
                        Err(StoreError::StorageUnavailable(format!(
                            "batch starting at {}",
                            batch[0]
                        )))
                    } else {
                        Ok(batch.len() as u64)
                    }
                }
            })
            .await
            .unwrap_err();

        match err {
            StoreError::DeleteFailed(messages) => {
                assert_eq!(messages.len(), 1);
                assert!(messages[0].contains("k020"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn errors_from_several_workers_are_joined() {
        let err = DeletePipeline::new(1, 4)
            .run(keys(4), |batch| async move {
                Err::<u64, _>(StoreError::BulkWriteFailed(batch[0].clone()))
            })
            .await
            .unwrap_err();

        match err {
            StoreError::DeleteFailed(messages) => {
                assert!(!messages.is_empty());
                assert!(messages.len() <= 4);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn sizes_are_at_least_one() {
        let pipeline = DeletePipeline::new(0, 0);
        assert_eq!(pipeline.batch_size(), 1);
        assert_eq!(pipeline.workers(), 1);
        assert_eq!(DeletePipeline::default().batch_size(), DELETE_BATCH_SIZE);
    }
}
