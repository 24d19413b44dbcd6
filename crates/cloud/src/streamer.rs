//! Bounded-concurrency download streaming.

use std::sync::Arc;
use std::time::Duration;

use amber_types::{BlockId, ExecutionRecord};
use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinSet;

use crate::{CloudError, ObjectStore};

// Parallel downloads in flight at once.
const DEFAULT_WORKERS: usize = 8;
// Delay before re-asking for an object that was not there yet.
const DEFAULT_POLL_DELAY: Duration = Duration::from_secs(1);
// Backoff after a transport failure.
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Object name for a block's execution record.
pub fn record_name(block_id: &BlockId) -> String {
    format!("{block_id}.rec")
}

/// Downloads execution records for finalized blocks.
///
/// Block ids arrive from the finalization feed (plus a catch-up list for
/// blocks finalized before startup) and fan out across a fixed pool of
/// download workers. Decoded records leave through a bounded channel, so
/// downloads pause whenever the consumer falls behind.
pub struct Streamer<O> {
    store: Arc<O>,
    workers: usize,
    poll_delay: Duration,
}

impl<O: ObjectStore> Streamer<O> {
    pub fn new(store: Arc<O>) -> Self {
        Self {
            store,
            workers: DEFAULT_WORKERS,
            poll_delay: DEFAULT_POLL_DELAY,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_poll_delay(mut self, delay: Duration) -> Self {
        self.poll_delay = delay;
        self
    }

    /// Run the download pool.
    ///
    /// Objects not in the bucket yet re-queue after a poll delay, and
    /// transport failures retry indefinitely with a longer backoff, so
    /// this future never resolves on its own: the daemon aborts it at
    /// shutdown, which also tears down the worker pool.
    pub async fn run(
        self,
        catchup: Vec<BlockId>,
        mut ids: mpsc::Receiver<BlockId>,
        out: mpsc::Sender<ExecutionRecord>,
    ) {
        let (work_tx, work_rx) = mpsc::unbounded_channel();
        for block_id in catchup {
            tracing::info!(block = %block_id, "queueing catch-up download");
            // The receiver outlives this loop; send cannot fail.
            let _ = work_tx.send(block_id);
        }

        let work_rx = Arc::new(AsyncMutex::new(work_rx));
        let mut pool = JoinSet::new();
        for _ in 0..self.workers {
            let store = Arc::clone(&self.store);
            let work_rx = Arc::clone(&work_rx);
            let requeue = work_tx.clone();
            let out = out.clone();
            let poll_delay = self.poll_delay;
            pool.spawn(async move {
                loop {
                    let block_id = {
                        let mut rx = work_rx.lock().await;
                        match rx.recv().await {
                            Some(block_id) => block_id,
                            None => return,
                        }
                    };
                    download(&*store, block_id, &requeue, &out, poll_delay).await;
                }
            });
        }

        // Feed live finalizations into the worker queue.
        while let Some(block_id) = ids.recv().await {
            tracing::debug!(block = %block_id, "queueing execution record download");
            let _ = work_tx.send(block_id);
        }
        drop(work_tx);

        // The workers keep serving requeues until we are aborted.
        while pool.join_next().await.is_some() {}
    }
}

async fn download<O: ObjectStore>(
    store: &O,
    block_id: BlockId,
    requeue: &mpsc::UnboundedSender<BlockId>,
    out: &mpsc::Sender<ExecutionRecord>,
    poll_delay: Duration,
) {
    let name = record_name(&block_id);
    match store.get(&name).await {
        Ok(bytes) => match borsh::from_slice::<ExecutionRecord>(&bytes) {
            Ok(record) => {
                tracing::debug!(
                    block = %block_id,
                    bytes = bytes.len(),
                    "downloaded execution record"
                );
                if out.send(record).await.is_err() {
                    tracing::debug!("record consumer gone, dropping download");
                }
            }
            Err(e) => {
                tracing::error!(block = %block_id, error = %e, "malformed execution record");
            }
        },
        Err(CloudError::NotFound(_)) => {
            tracing::debug!(block = %block_id, "execution record not available yet");
            tokio::time::sleep(poll_delay).await;
            let _ = requeue.send(block_id);
        }
        Err(e) => {
            tracing::warn!(block = %block_id, error = %e, "execution record download failed");
            tokio::time::sleep(RETRY_DELAY).await;
            let _ = requeue.send(block_id);
        }
    }
}
