//! Consensus tracker: ordered finalized headers for the FSM.

use std::collections::BTreeMap;
use std::sync::Mutex;

use amber_storage::KeyValue;
use amber_types::{BlockHeader, BlockId, Commitment};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;

use crate::{ChainFeed, ProtocolDb, TrackerError};

/// Buffers finalized block metadata between the follower and the FSM.
///
/// Block ids arrive over the finalization channel in finalization order;
/// each is resolved to its header through the protocol database and filed
/// by height. The FSM is the only consumer, pulling the channel from
/// inside [`header`](ChainFeed::header) so availability needs no separate
/// signal.
pub struct ConsensusTracker<S> {
    db: ProtocolDb<S>,
    feed: AsyncMutex<mpsc::Receiver<BlockId>>,
    headers: Mutex<BTreeMap<u64, BlockHeader>>,
}

impl<S: KeyValue> ConsensusTracker<S> {
    pub fn new(db: ProtocolDb<S>, feed: mpsc::Receiver<BlockId>) -> Self {
        Self {
            db,
            feed: AsyncMutex::new(feed),
            headers: Mutex::new(BTreeMap::new()),
        }
    }

    /// Record a finalized block by id.
    ///
    /// The follower must have persisted the header before announcing the
    /// id; a miss here means the protocol state is corrupt.
    fn on_finalized(&self, block_id: BlockId) -> Result<(), TrackerError> {
        let header = self
            .db
            .header(&block_id)?
            .ok_or(TrackerError::UnknownBlock(block_id))?;
        tracing::debug!(height = header.height, block = %block_id, "finalized block tracked");
        self.headers
            .lock()
            .expect("consensus tracker lock poisoned")
            .insert(header.height, header);
        Ok(())
    }

    /// Non-blocking probe for a buffered header.
    pub fn peek(&self, height: u64) -> Option<BlockHeader> {
        self.headers
            .lock()
            .expect("consensus tracker lock poisoned")
            .get(&height)
            .cloned()
    }

    /// The state commitment a buffered height finalized with.
    pub fn commit(&self, height: u64) -> Option<Commitment> {
        self.headers
            .lock()
            .expect("consensus tracker lock poisoned")
            .get(&height)
            .map(|header| header.state_commitment)
    }
}

#[async_trait]
impl<S: KeyValue> ChainFeed for ConsensusTracker<S> {
    fn root_height(&self) -> Result<u64, TrackerError> {
        self.db.root_height()?.ok_or(TrackerError::MissingRoot)
    }

    async fn header(&self, height: u64) -> Result<BlockHeader, TrackerError> {
        loop {
            if let Some(header) = self.peek(height) {
                return Ok(header);
            }
            let block_id = {
                let mut feed = self.feed.lock().await;
                feed.recv().await.ok_or(TrackerError::FeedClosed)?
            };
            self.on_finalized(block_id)?;
        }
    }

    fn prune_below(&self, height: u64) {
        let mut headers = self
            .headers
            .lock()
            .expect("consensus tracker lock poisoned");
        *headers = headers.split_off(&height);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use amber_storage::MemStore;
    use amber_types::Commitment;

    use super::*;

    fn header(height: u64) -> BlockHeader {
        BlockHeader {
            height,
            block_id: BlockId::new([height as u8; 32]),
            parent_id: BlockId::new([height.wrapping_sub(1) as u8; 32]),
            state_commitment: Commitment::new([height as u8; 32]),
            seals: vec![],
        }
    }

    fn tracker(
        capacity: usize,
    ) -> (ProtocolDb<MemStore>, ConsensusTracker<MemStore>, mpsc::Sender<BlockId>) {
        let db = ProtocolDb::new(Arc::new(MemStore::new()));
        let (tx, rx) = mpsc::channel(capacity);
        let tracker = ConsensusTracker::new(db.clone(), rx);
        (db, tracker, tx)
    }

    #[tokio::test]
    async fn header_waits_for_finalization() {
        let (db, tracker, tx) = tracker(4);
        let h = header(3);
        db.put_header(&h).unwrap();

        let wait = tokio::spawn(async move {
            let got = tracker.header(3).await.unwrap();
            assert_eq!(got, header(3));
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.send(h.block_id).await.unwrap();
        wait.await.unwrap();
    }

    #[tokio::test]
    async fn later_heights_buffer_while_waiting() {
        let (db, tracker, tx) = tracker(4);
        for height in 1..=3 {
            db.put_header(&header(height)).unwrap();
        }

        // Deliver out of need-order: the FSM asks for 1 but 2 and 3 arrive
        // first on the channel.
        tx.send(header(2).block_id).await.unwrap();
        tx.send(header(3).block_id).await.unwrap();
        tx.send(header(1).block_id).await.unwrap();

        assert_eq!(tracker.header(1).await.unwrap(), header(1));
        assert_eq!(tracker.header(2).await.unwrap(), header(2));
        assert_eq!(tracker.header(3).await.unwrap(), header(3));
    }

    #[tokio::test]
    async fn unknown_block_is_an_error() {
        let (_db, tracker, tx) = tracker(4);
        tx.send(BlockId::new([9; 32])).await.unwrap();
        let err = tracker.header(1).await.unwrap_err();
        assert!(matches!(err, TrackerError::UnknownBlock(_)));
    }

    #[tokio::test]
    async fn closed_feed_surfaces() {
        let (_db, tracker, tx) = tracker(4);
        drop(tx);
        assert!(matches!(
            tracker.header(1).await,
            Err(TrackerError::FeedClosed)
        ));
    }

    #[tokio::test]
    async fn prune_below_drops_committed_heights() {
        let (db, tracker, tx) = tracker(4);
        for height in 1..=2 {
            db.put_header(&header(height)).unwrap();
            tx.send(header(height).block_id).await.unwrap();
        }
        assert_eq!(tracker.header(1).await.unwrap(), header(1));
        assert_eq!(tracker.header(2).await.unwrap(), header(2));

        tracker.prune_below(2);
        assert!(tracker.peek(1).is_none());
        assert!(tracker.peek(2).is_some());
        assert_eq!(tracker.commit(2), Some(header(2).state_commitment));
        assert_eq!(tracker.commit(1), None);
    }
}
