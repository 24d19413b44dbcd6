//! Execution tracker: downloaded records for the FSM.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use amber_types::{BlockId, ExecutionRecord};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;

use crate::{RecordFeed, TrackerError};

// Cadence of the "still waiting" log while a record has not arrived.
const WAIT_LOG_INTERVAL: Duration = Duration::from_secs(30);

/// Buffers downloaded execution records between the streamer and the FSM.
///
/// The streamer's channel is bounded, so downloads pause while this side
/// is not consuming. Records for other blocks that surface while waiting
/// (downloads complete out of order) are parked by block id until asked
/// for.
pub struct ExecutionTracker {
    feed: AsyncMutex<mpsc::Receiver<ExecutionRecord>>,
    buffered: Mutex<HashMap<BlockId, ExecutionRecord>>,
}

impl ExecutionTracker {
    pub fn new(feed: mpsc::Receiver<ExecutionRecord>) -> Self {
        Self {
            feed: AsyncMutex::new(feed),
            buffered: Mutex::new(HashMap::new()),
        }
    }

    /// Non-blocking probe; removes and returns the record if present.
    pub fn take(&self, block_id: &BlockId) -> Option<ExecutionRecord> {
        self.buffered
            .lock()
            .expect("execution tracker lock poisoned")
            .remove(block_id)
    }

    fn park(&self, record: ExecutionRecord) {
        self.buffered
            .lock()
            .expect("execution tracker lock poisoned")
            .insert(record.block_id, record);
    }
}

#[async_trait]
impl RecordFeed for ExecutionTracker {
    async fn record(&self, block_id: &BlockId) -> Result<ExecutionRecord, TrackerError> {
        if let Some(record) = self.take(block_id) {
            return Ok(record);
        }
        let mut feed = self.feed.lock().await;
        loop {
            // An absent record blocks indexing indefinitely; keep the
            // operator informed while we wait.
            match tokio::time::timeout(WAIT_LOG_INTERVAL, feed.recv()).await {
                Err(_) => {
                    tracing::warn!(block = %block_id, "still waiting for execution record");
                }
                Ok(None) => return Err(TrackerError::FeedClosed),
                Ok(Some(record)) => {
                    if record.block_id == *block_id {
                        return Ok(record);
                    }
                    tracing::debug!(
                        block = %record.block_id,
                        "buffered out-of-order execution record"
                    );
                    self.park(record);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use amber_types::{Path, Payload, RegisterUpdate};

    use super::*;

    fn record(byte: u8) -> ExecutionRecord {
        ExecutionRecord::new(
            BlockId::new([byte; 32]),
            vec![RegisterUpdate::new(
                Path::new([byte; 32]),
                Payload::new(0, vec![byte]),
            )],
        )
    }

    #[tokio::test]
    async fn record_is_delivered_once() {
        let (tx, rx) = mpsc::channel(4);
        let tracker = ExecutionTracker::new(rx);

        tx.send(record(1)).await.unwrap();
        let got = tracker.record(&BlockId::new([1; 32])).await.unwrap();
        assert_eq!(got, record(1));

        // Consumed: a second ask would have to wait for a new delivery.
        assert!(tracker.take(&BlockId::new([1; 32])).is_none());
    }

    #[tokio::test]
    async fn out_of_order_arrivals_are_parked() {
        let (tx, rx) = mpsc::channel(4);
        let tracker = ExecutionTracker::new(rx);

        tx.send(record(2)).await.unwrap();
        tx.send(record(1)).await.unwrap();

        assert_eq!(
            tracker.record(&BlockId::new([1; 32])).await.unwrap(),
            record(1)
        );
        assert_eq!(
            tracker.record(&BlockId::new([2; 32])).await.unwrap(),
            record(2)
        );
    }

    #[tokio::test]
    async fn closed_feed_surfaces() {
        let (tx, rx) = mpsc::channel::<ExecutionRecord>(1);
        let tracker = ExecutionTracker::new(rx);
        drop(tx);
        assert!(matches!(
            tracker.record(&BlockId::new([1; 32])).await,
            Err(TrackerError::FeedClosed)
        ));
    }
}
