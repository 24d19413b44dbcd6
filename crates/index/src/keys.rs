//! Index keyspaces.
//!
//! Every keyspace carries a short tag prefix; heights are big-endian so
//! lexicographic order matches numeric order and range scans work.

use amber_types::{BlockId, Commitment, Path, PayloadKey};

/// First indexed height: `meta:first` -> u64
pub const FIRST: &[u8] = b"meta:first";
/// Last contiguously indexed height: `meta:last` -> u64
pub const LAST: &[u8] = b"meta:last";
/// Header by height: `hdr:{height}` -> BlockHeader
pub const HEADER: &[u8] = b"hdr:";
/// Commitment by height: `cmt:{height}` -> Commitment
pub const COMMIT: &[u8] = b"cmt:";
/// Height by commitment: `cmh:{commitment}` -> u64
pub const HEIGHT_FOR_COMMIT: &[u8] = b"cmh:";
/// Block id by height: `blk:{height}` -> BlockId
pub const BLOCK: &[u8] = b"blk:";
/// Height by block id: `blh:{block_id}` -> u64
pub const HEIGHT_FOR_BLOCK: &[u8] = b"blh:";
/// Payload key by register and height: `reg:{path}{height}` -> PayloadKey
pub const REGISTER: &[u8] = b"reg:";
/// Payload bytes by content key: `pd:{payload_key}` -> Payload
pub const PAYLOAD: &[u8] = b"pd:";

pub fn header(height: u64) -> Vec<u8> {
    tagged(HEADER, &height.to_be_bytes())
}

pub fn commit(height: u64) -> Vec<u8> {
    tagged(COMMIT, &height.to_be_bytes())
}

pub fn height_for_commit(commitment: &Commitment) -> Vec<u8> {
    tagged(HEIGHT_FOR_COMMIT, commitment.as_bytes())
}

pub fn block(height: u64) -> Vec<u8> {
    tagged(BLOCK, &height.to_be_bytes())
}

pub fn height_for_block(block_id: &BlockId) -> Vec<u8> {
    tagged(HEIGHT_FOR_BLOCK, block_id.as_bytes())
}

pub fn register(path: &Path, height: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(REGISTER.len() + Path::LEN + 8);
    key.extend_from_slice(REGISTER);
    key.extend_from_slice(path.as_bytes());
    key.extend_from_slice(&height.to_be_bytes());
    key
}

/// Prefix covering every height of one register.
pub fn register_prefix(path: &Path) -> Vec<u8> {
    tagged(REGISTER, path.as_bytes())
}

pub fn payload(key: &PayloadKey) -> Vec<u8> {
    tagged(PAYLOAD, key)
}

fn tagged(tag: &[u8], body: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(tag.len() + body.len());
    key.extend_from_slice(tag);
    key.extend_from_slice(body);
    key
}

/// Split a `reg:` key back into its path and height.
pub fn parse_register(key: &[u8]) -> Option<(Path, u64)> {
    let body = key.strip_prefix(REGISTER)?;
    if body.len() != Path::LEN + 8 {
        return None;
    }
    let path = Path::from_slice(&body[..Path::LEN]).ok()?;
    let height = u64::from_be_bytes(body[Path::LEN..].try_into().ok()?);
    Some((path, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_keys_round_trip() {
        let path = Path::new([0xcd; 32]);
        let key = register(&path, 77);
        assert!(key.starts_with(REGISTER));
        assert_eq!(parse_register(&key), Some((path, 77)));
    }

    #[test]
    fn register_keys_order_by_height() {
        let path = Path::new([1; 32]);
        assert!(register(&path, 9) < register(&path, 10));
        assert!(register(&path, 255) < register(&path, 256));
    }

    #[test]
    fn parse_rejects_foreign_keys() {
        assert_eq!(parse_register(b"hdr:junk"), None);
        assert_eq!(parse_register(b"reg:short"), None);
    }
}
