//! Execution records downloaded from the object store.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::{BlockId, Path, Payload};

/// A single register mutation produced by executing a block.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct RegisterUpdate {
    pub path: Path,
    pub payload: Payload,
}

impl RegisterUpdate {
    pub fn new(path: Path, payload: Payload) -> Self {
        Self { path, payload }
    }
}

/// The full set of register mutations for one block, in execution order.
///
/// Records can be large; they are produced once per block and consumed once
/// by the indexer.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ExecutionRecord {
    pub block_id: BlockId,
    pub updates: Vec<RegisterUpdate>,
}

impl ExecutionRecord {
    pub fn new(block_id: BlockId, updates: Vec<RegisterUpdate>) -> Self {
        Self { block_id, updates }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_borsh_round_trip() {
        let record = ExecutionRecord::new(
            BlockId::new([9; 32]),
            vec![RegisterUpdate::new(
                Path::new([1; 32]),
                Payload::new(0, vec![0xaa]),
            )],
        );
        let bytes = borsh::to_vec(&record).unwrap();
        let decoded: ExecutionRecord = borsh::from_slice(&bytes).unwrap();
        assert_eq!(decoded, record);
    }
}
