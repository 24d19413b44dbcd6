//! Register payloads.

use borsh::{BorshDeserialize, BorshSerialize};

/// Content-address of a payload: the blake3 hash of its encoding.
pub type PayloadKey = [u8; 32];

/// A versioned value blob stored under a register path.
///
/// The trie treats payloads as opaque beyond their bytes; the version tags
/// the encoding of `value` for consumers above the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Default, BorshSerialize, BorshDeserialize)]
pub struct Payload {
    pub version: u16,
    pub value: Vec<u8>,
}

impl Payload {
    pub fn new(version: u16, value: Vec<u8>) -> Self {
        Self { version, value }
    }

    /// Encode for persistence or content addressing.
    pub fn encode(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("payload encoding cannot fail")
    }

    /// Deterministic content key: blake3 over the encoded payload.
    pub fn key(&self) -> PayloadKey {
        *blake3::hash(&self.encode()).as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_content_determined() {
        let a = Payload::new(0, vec![1, 2, 3]);
        let b = Payload::new(0, vec![1, 2, 3]);
        let c = Payload::new(1, vec![1, 2, 3]);

        assert_eq!(a.key(), b.key());
        assert_ne!(a.key(), c.key());
    }

    #[test]
    fn encode_round_trip() {
        let payload = Payload::new(7, b"register".to_vec());
        let decoded: Payload = borsh::from_slice(&payload.encode()).unwrap();
        assert_eq!(decoded, payload);
    }
}
