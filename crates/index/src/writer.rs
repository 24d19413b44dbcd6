//! Batch-flushing write access to the index database.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use amber_storage::{KeyValue, Op};
use amber_types::{BlockHeader, BlockId, Commitment, RegisterUpdate};
use tokio::task::JoinHandle;

use crate::{keys, IndexError};

/// Flush policy for the [`Writer`].
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Flush once this many operations are buffered.
    pub flush_threshold: usize,
    /// Flush on this cadence even when the batch stays small. Zero
    /// disables interval flushing.
    pub flush_interval: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            flush_threshold: 500,
            flush_interval: Duration::from_secs(1),
        }
    }
}

struct Shared<S> {
    store: Arc<S>,
    pending: Mutex<Vec<Op>>,
    closed: AtomicBool,
    threshold: usize,
}

/// Buffered writer for every index keyspace.
///
/// Mutations land in an in-memory batch and become visible to readers on
/// flush: when the batch crosses the configured threshold, when the flush
/// interval elapses, or on [`close`](Writer::close). All methods are safe
/// to call from multiple tasks; the batch serializes them.
pub struct Writer<S> {
    shared: Arc<Shared<S>>,
    flusher: Option<JoinHandle<()>>,
}

impl<S: KeyValue> Writer<S> {
    /// Create a writer over the store.
    ///
    /// Must be called within a tokio runtime when interval flushing is
    /// enabled; the interval task runs until `close`.
    pub fn new(store: Arc<S>, config: WriterConfig) -> Self {
        let shared = Arc::new(Shared {
            store,
            pending: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            threshold: config.flush_threshold.max(1),
        });

        let flusher = if config.flush_interval > Duration::ZERO {
            let shared = Arc::clone(&shared);
            Some(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(config.flush_interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    if shared.closed.load(Ordering::Acquire) {
                        return;
                    }
                    if let Err(e) = flush_shared(&shared) {
                        tracing::error!(error = %e, "interval flush failed");
                    }
                }
            }))
        } else {
            None
        };

        Self { shared, flusher }
    }

    /// Record the first indexed height.
    pub fn first(&self, height: u64) -> Result<(), IndexError> {
        self.push(vec![Op::set(
            keys::FIRST.to_vec(),
            height.to_be_bytes().to_vec(),
        )])
    }

    /// Record the last contiguously indexed height.
    pub fn last(&self, height: u64) -> Result<(), IndexError> {
        self.push(vec![Op::set(
            keys::LAST.to_vec(),
            height.to_be_bytes().to_vec(),
        )])
    }

    /// Persist a header and the block-id mappings for its height.
    pub fn header(&self, height: u64, header: &BlockHeader) -> Result<(), IndexError> {
        let encoded = borsh::to_vec(header)?;
        self.push(vec![
            Op::set(keys::header(height), encoded),
            Op::set(keys::block(height), header.block_id.to_vec()),
            Op::set(
                keys::height_for_block(&header.block_id),
                height.to_be_bytes().to_vec(),
            ),
        ])
    }

    /// Persist the commitment mappings for a height, both directions.
    pub fn commit(&self, height: u64, commitment: &Commitment) -> Result<(), IndexError> {
        self.push(vec![
            Op::set(keys::commit(height), commitment.to_vec()),
            Op::set(
                keys::height_for_commit(commitment),
                height.to_be_bytes().to_vec(),
            ),
        ])
    }

    /// Persist register mappings for a height along with the payload bytes
    /// they point at.
    pub fn payloads(
        &self,
        height: u64,
        updates: &[RegisterUpdate],
    ) -> Result<(), IndexError> {
        let mut ops = Vec::with_capacity(updates.len() * 2);
        for update in updates {
            let payload_key = update.payload.key();
            ops.push(Op::set(
                keys::register(&update.path, height),
                payload_key.to_vec(),
            ));
            ops.push(Op::set(keys::payload(&payload_key), update.payload.encode()));
        }
        self.push(ops)
    }

    /// Look up the height a block id was indexed at, through the store.
    ///
    /// Writers occasionally need this for catch-up bookkeeping; it reads
    /// flushed state only.
    pub fn height_for_block(&self, block_id: &BlockId) -> Result<Option<u64>, IndexError> {
        match self.shared.store.get(&keys::height_for_block(block_id))? {
            Some(bytes) => {
                let arr: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    IndexError::Malformed {
                        key: format!("blh:{block_id}"),
                    }
                })?;
                Ok(Some(u64::from_be_bytes(arr)))
            }
            None => Ok(None),
        }
    }

    /// Write the open batch out now.
    pub fn flush(&self) -> Result<(), IndexError> {
        flush_shared(&self.shared)
    }

    /// Drain and commit the open batch, stop the interval task, and refuse
    /// further writes.
    pub fn close(&mut self) -> Result<(), IndexError> {
        self.shared.closed.store(true, Ordering::Release);
        if let Some(flusher) = self.flusher.take() {
            flusher.abort();
        }
        flush_shared(&self.shared)
    }

    fn push(&self, ops: Vec<Op>) -> Result<(), IndexError> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(IndexError::Closed);
        }
        let should_flush = {
            let mut pending = self
                .shared
                .pending
                .lock()
                .expect("writer batch lock poisoned");
            pending.extend(ops);
            pending.len() >= self.shared.threshold
        };
        if should_flush {
            flush_shared(&self.shared)?;
        }
        Ok(())
    }
}

fn flush_shared<S: KeyValue>(shared: &Shared<S>) -> Result<(), IndexError> {
    let batch = {
        let mut pending = shared.pending.lock().expect("writer batch lock poisoned");
        if pending.is_empty() {
            return Ok(());
        }
        std::mem::take(&mut *pending)
    };
    let count = batch.len();
    shared.store.write(batch)?;
    tracing::debug!(operations = count, "flushed index batch");
    Ok(())
}

impl<S> Drop for Writer<S> {
    fn drop(&mut self) {
        if let Some(flusher) = self.flusher.take() {
            flusher.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use amber_storage::MemStore;
    use amber_types::{Path, Payload};

    use super::*;
    use crate::Reader;

    fn setup(config: WriterConfig) -> (Arc<MemStore>, Reader<MemStore>, Writer<MemStore>) {
        let store = Arc::new(MemStore::new());
        let reader = Reader::new(Arc::clone(&store));
        let writer = Writer::new(Arc::clone(&store), config);
        (store, reader, writer)
    }

    fn no_interval() -> WriterConfig {
        WriterConfig {
            flush_threshold: 1000,
            flush_interval: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn writes_are_buffered_until_flush() {
        let (_store, reader, writer) = setup(no_interval());

        writer.last(7).unwrap();
        assert_eq!(reader.last().unwrap(), None);

        writer.flush().unwrap();
        assert_eq!(reader.last().unwrap(), Some(7));
    }

    #[tokio::test]
    async fn threshold_crossing_flushes() {
        let (_store, reader, writer) = setup(WriterConfig {
            flush_threshold: 2,
            flush_interval: Duration::ZERO,
        });

        writer.first(3).unwrap(); // 1 op, buffered
        writer.last(3).unwrap(); // 2 ops, crosses threshold
        assert_eq!(reader.first().unwrap(), Some(3));
        assert_eq!(reader.last().unwrap(), Some(3));
    }

    #[tokio::test]
    async fn interval_elapsing_flushes() {
        let (_store, reader, writer) = setup(WriterConfig {
            flush_threshold: 1000,
            flush_interval: Duration::from_millis(20),
        });

        writer.last(11).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(reader.last().unwrap(), Some(11));
        drop(writer);
    }

    #[tokio::test]
    async fn close_drains_and_rejects_further_writes() {
        let (_store, reader, mut writer) = setup(no_interval());

        writer.commit(5, &Commitment::new([9; 32])).unwrap();
        writer.close().unwrap();

        assert_eq!(reader.commit(5).unwrap(), Some(Commitment::new([9; 32])));
        assert_eq!(reader.height_for_commit(&Commitment::new([9; 32])).unwrap(), Some(5));
        assert!(matches!(writer.last(6), Err(IndexError::Closed)));
    }

    #[tokio::test]
    async fn payload_lookups_respect_height_bounds() {
        let (_store, reader, writer) = setup(no_interval());
        let path = Path::new([4; 32]);

        writer
            .payloads(10, &[RegisterUpdate::new(path, Payload::new(0, vec![1]))])
            .unwrap();
        writer
            .payloads(20, &[RegisterUpdate::new(path, Payload::new(0, vec![2]))])
            .unwrap();
        writer.flush().unwrap();

        assert_eq!(reader.payload(9, &path).unwrap(), None);
        assert_eq!(
            reader.payload(10, &path).unwrap(),
            Some(Payload::new(0, vec![1]))
        );
        assert_eq!(
            reader.payload(15, &path).unwrap(),
            Some(Payload::new(0, vec![1]))
        );
        assert_eq!(
            reader.payload(20, &path).unwrap(),
            Some(Payload::new(0, vec![2]))
        );
        assert_eq!(
            reader.payload(u64::MAX, &path).unwrap(),
            Some(Payload::new(0, vec![2]))
        );
    }

    #[tokio::test]
    async fn registers_at_returns_latest_per_path() {
        let (_store, reader, writer) = setup(no_interval());
        let a = Path::new([1; 32]);
        let b = Path::new([2; 32]);

        writer
            .payloads(
                10,
                &[
                    RegisterUpdate::new(a, Payload::new(0, vec![1])),
                    RegisterUpdate::new(b, Payload::new(0, vec![2])),
                ],
            )
            .unwrap();
        writer
            .payloads(12, &[RegisterUpdate::new(a, Payload::new(0, vec![3]))])
            .unwrap();
        writer.flush().unwrap();

        let all = reader.registers_at(12, None).unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.contains(&RegisterUpdate::new(a, Payload::new(0, vec![3]))));
        assert!(all.contains(&RegisterUpdate::new(b, Payload::new(0, vec![2]))));

        // Excluding the seeded prefix hides registers untouched since.
        let later = reader.registers_at(12, Some(10)).unwrap();
        assert_eq!(later, vec![RegisterUpdate::new(a, Payload::new(0, vec![3]))]);
    }

    #[tokio::test]
    async fn header_mappings_cover_both_directions() {
        let (_store, reader, writer) = setup(no_interval());
        let header = BlockHeader {
            height: 8,
            block_id: BlockId::new([1; 32]),
            parent_id: BlockId::new([2; 32]),
            state_commitment: Commitment::new([3; 32]),
            seals: vec![],
        };

        writer.header(8, &header).unwrap();
        writer.flush().unwrap();

        assert_eq!(reader.header(8).unwrap(), Some(header.clone()));
        assert_eq!(reader.block_id(8).unwrap(), Some(header.block_id));
        assert_eq!(reader.height_for_block(&header.block_id).unwrap(), Some(8));
    }
}
