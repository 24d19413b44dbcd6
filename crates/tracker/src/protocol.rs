//! Protocol-state database access.
//!
//! The consensus follower maintains this database; the daemon's follower
//! adapter writes headers into it as they finalize, and the consensus
//! tracker reads them back by block id. Keyspaces are disjoint from the
//! index database so both can share a store in tests.

use std::sync::Arc;

use amber_storage::{KeyValue, Op};
use amber_types::{BlockHeader, BlockId};

use crate::TrackerError;

/// Finalized header by block id: `pb:{block_id}` -> BlockHeader
const HEADER: &[u8] = b"pb:";
/// Finalized block id by height: `ph:{height}` -> BlockId
const BLOCK: &[u8] = b"ph:";
/// Latest finalized height: `pf:head` -> u64
const HEAD: &[u8] = b"pf:head";
/// Spork root height: `pf:root` -> u64
const ROOT: &[u8] = b"pf:root";

/// Reader/writer for the protocol-state keyspaces.
pub struct ProtocolDb<S> {
    store: Arc<S>,
}

impl<S> Clone for ProtocolDb<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: KeyValue> ProtocolDb<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Persist a finalized header and advance the finalized head.
    pub fn put_header(&self, header: &BlockHeader) -> Result<(), TrackerError> {
        let mut ops = vec![
            Op::set(tagged(HEADER, header.block_id.as_bytes()), borsh::to_vec(header)?),
            Op::set(
                tagged(BLOCK, &header.height.to_be_bytes()),
                header.block_id.to_vec(),
            ),
        ];
        let advanced = match self.head()? {
            Some(head) => header.height > head,
            None => true,
        };
        if advanced {
            ops.push(Op::set(HEAD.to_vec(), header.height.to_be_bytes().to_vec()));
        }
        self.store.write(ops)?;
        Ok(())
    }

    pub fn header(&self, block_id: &BlockId) -> Result<Option<BlockHeader>, TrackerError> {
        match self.store.get(&tagged(HEADER, block_id.as_bytes()))? {
            Some(bytes) => Ok(Some(borsh::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn block_id(&self, height: u64) -> Result<Option<BlockId>, TrackerError> {
        match self.store.get(&tagged(BLOCK, &height.to_be_bytes()))? {
            Some(bytes) => Ok(BlockId::from_slice(&bytes).ok()),
            None => Ok(None),
        }
    }

    /// Latest finalized height seen by the follower.
    pub fn head(&self) -> Result<Option<u64>, TrackerError> {
        self.scalar(HEAD)
    }

    pub fn root_height(&self) -> Result<Option<u64>, TrackerError> {
        self.scalar(ROOT)
    }

    /// Record the spork root height once, at bootstrap.
    pub fn set_root_height(&self, height: u64) -> Result<(), TrackerError> {
        self.store
            .write(vec![Op::set(ROOT.to_vec(), height.to_be_bytes().to_vec())])?;
        Ok(())
    }

    fn scalar(&self, key: &[u8]) -> Result<Option<u64>, TrackerError> {
        match self.store.get(key)? {
            Some(bytes) => {
                let arr: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    TrackerError::Codec(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "malformed height scalar",
                    ))
                })?;
                Ok(Some(u64::from_be_bytes(arr)))
            }
            None => Ok(None),
        }
    }
}

fn tagged(tag: &[u8], body: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(tag.len() + body.len());
    key.extend_from_slice(tag);
    key.extend_from_slice(body);
    key
}
