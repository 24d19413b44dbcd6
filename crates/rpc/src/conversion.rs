//! Conversions between domain types and protobuf messages.

use amber_types::{BlockHeader, BlockId, Commitment, Path, Payload, Seal};

use crate::error::ApiError;
use crate::proto;

pub fn proto_to_path(bytes: &[u8]) -> Result<Path, ApiError> {
    Path::from_slice(bytes)
        .map_err(|e| ApiError::InvalidArgument(format!("register path: {e}")))
}

pub fn proto_to_paths(paths: &[Vec<u8>]) -> Result<Vec<Path>, ApiError> {
    paths.iter().map(|p| proto_to_path(p)).collect()
}

pub fn block_id_from_proto(bytes: &[u8]) -> Result<BlockId, ApiError> {
    BlockId::from_slice(bytes).map_err(|e| ApiError::InvalidArgument(format!("block id: {e}")))
}

pub fn commitment_from_proto(bytes: &[u8]) -> Result<Commitment, ApiError> {
    Commitment::from_slice(bytes)
        .map_err(|e| ApiError::InvalidArgument(format!("commitment: {e}")))
}

pub fn payload_to_proto(payload: &Payload) -> proto::Payload {
    proto::Payload {
        version: payload.version as u32,
        value: payload.value.clone(),
    }
}

pub fn seal_to_proto(seal: &Seal) -> proto::Seal {
    proto::Seal {
        block_id: seal.block_id.to_vec(),
        commitment: seal.commitment.to_vec(),
    }
}

pub fn identity(height: u64, block_id: &BlockId, commitment: &Commitment) -> proto::BlockIdentity {
    proto::BlockIdentity {
        height,
        block_id: block_id.to_vec(),
        commitment: commitment.to_vec(),
    }
}

/// Decode one finalized block off the follower stream.
pub fn finalized_to_header(block: &proto::FinalizedBlock) -> Result<BlockHeader, ApiError> {
    Ok(BlockHeader {
        height: block.height,
        block_id: block_id_from_proto(&block.block_id)?,
        parent_id: block_id_from_proto(&block.parent_id)?,
        state_commitment: commitment_from_proto(&block.state_commitment)?,
        seals: block
            .seals
            .iter()
            .map(|seal| {
                Ok(Seal {
                    block_id: block_id_from_proto(&seal.block_id)?,
                    commitment: commitment_from_proto(&seal.commitment)?,
                })
            })
            .collect::<Result<_, ApiError>>()?,
    })
}
