//! Block identity and header metadata.

use std::fmt;

use borsh::{BorshDeserialize, BorshSerialize};

use crate::TypeError;

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
            BorshSerialize, BorshDeserialize,
        )]
        pub struct $name([u8; 32]);

        impl $name {
            /// Size in bytes.
            pub const LEN: usize = 32;

            pub const fn new(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            pub fn from_slice(bytes: &[u8]) -> Result<Self, TypeError> {
                let arr: [u8; 32] = bytes.try_into().map_err(|_| TypeError::InvalidLength {
                    expected: Self::LEN,
                    actual: bytes.len(),
                })?;
                Ok(Self(arr))
            }

            pub fn from_hex(hex: &str) -> Result<Self, TypeError> {
                if hex.len() != 64 {
                    return Err(TypeError::InvalidLength {
                        expected: 64,
                        actual: hex.len(),
                    });
                }
                let mut bytes = [0u8; 32];
                hex::decode_to_slice(hex, &mut bytes).map_err(|_| TypeError::InvalidHex)?;
                Ok(Self(bytes))
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            pub fn to_vec(&self) -> Vec<u8> {
                self.0.to_vec()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), hex::encode(self.0))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", hex::encode(self.0))
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }
    };
}

id_type! {
    /// A 32-byte block identifier.
    BlockId
}

id_type! {
    /// A 32-byte state commitment: the root hash of the full ledger trie at
    /// a given block.
    Commitment
}

/// A seal carried by a block header, attesting an earlier execution result.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Seal {
    pub block_id: BlockId,
    pub commitment: Commitment,
}

/// Finalized block metadata as tracked by the consensus follower.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct BlockHeader {
    pub height: u64,
    pub block_id: BlockId,
    pub parent_id: BlockId,
    /// Root hash of the ledger trie after executing this block.
    pub state_commitment: Commitment,
    pub seals: Vec<Seal>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip() {
        let id = BlockId::new([0xab; 32]);
        let hex = id.to_string();
        assert_eq!(hex.len(), 64);
        assert_eq!(BlockId::from_hex(&hex).unwrap(), id);
    }

    #[test]
    fn from_hex_rejects_bad_input() {
        assert!(Commitment::from_hex("abcd").is_err());
        assert!(Commitment::from_hex(&"zz".repeat(32)).is_err());
    }

    #[test]
    fn header_borsh_round_trip() {
        let header = BlockHeader {
            height: 42,
            block_id: BlockId::new([1; 32]),
            parent_id: BlockId::new([2; 32]),
            state_commitment: Commitment::new([3; 32]),
            seals: vec![Seal {
                block_id: BlockId::new([4; 32]),
                commitment: Commitment::new([5; 32]),
            }],
        };
        let bytes = borsh::to_vec(&header).unwrap();
        let decoded: BlockHeader = borsh::from_slice(&bytes).unwrap();
        assert_eq!(decoded, header);
    }
}
