//! Root checkpoint files.
//!
//! A checkpoint materializes a complete trie as the flat list of its
//! registers. The format is a fixed header followed by the borsh encoding
//! of the register list:
//!
//! ```text
//! "AMBC" | u16 version (little-endian) | borsh(Vec<RegisterUpdate>)
//! ```

use std::fs;
use std::path::Path as FsPath;

use amber_types::RegisterUpdate;

use crate::LoadError;

const MAGIC: &[u8; 4] = b"AMBC";
const VERSION: u16 = 1;

/// Serialize registers into checkpoint bytes.
pub fn encode(registers: &[RegisterUpdate]) -> Vec<u8> {
    let body = borsh::to_vec(&registers.to_vec()).expect("register encoding cannot fail");
    let mut bytes = Vec::with_capacity(MAGIC.len() + 2 + body.len());
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&VERSION.to_le_bytes());
    bytes.extend_from_slice(&body);
    bytes
}

/// Parse checkpoint bytes back into registers.
pub fn decode(bytes: &[u8]) -> Result<Vec<RegisterUpdate>, LoadError> {
    if bytes.len() < MAGIC.len() + 2 {
        return Err(LoadError::Malformed("checkpoint truncated".to_string()));
    }
    let (magic, rest) = bytes.split_at(MAGIC.len());
    if magic != MAGIC {
        return Err(LoadError::Malformed("bad checkpoint magic".to_string()));
    }
    let (version, body) = rest.split_at(2);
    let version = u16::from_le_bytes(version.try_into().expect("split is two bytes"));
    if version != VERSION {
        return Err(LoadError::Malformed(format!(
            "unsupported checkpoint version {version}"
        )));
    }
    borsh::from_slice(body).map_err(|e| LoadError::Malformed(format!("checkpoint body: {e}")))
}

/// Read and parse a checkpoint file.
pub fn read(path: &FsPath) -> Result<Vec<RegisterUpdate>, LoadError> {
    let bytes = fs::read(path)?;
    decode(&bytes)
}

/// Write a checkpoint file.
pub fn write(path: &FsPath, registers: &[RegisterUpdate]) -> Result<(), LoadError> {
    fs::write(path, encode(registers))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use amber_types::{Path, Payload};

    use super::*;

    fn registers() -> Vec<RegisterUpdate> {
        vec![
            RegisterUpdate::new(Path::new([1; 32]), Payload::new(0, vec![1, 2])),
            RegisterUpdate::new(Path::new([2; 32]), Payload::new(1, vec![3])),
        ]
    }

    #[test]
    fn encode_decode_round_trip() {
        let original = registers();
        let decoded = decode(&encode(&original)).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn truncated_and_corrupt_inputs_are_rejected() {
        assert!(decode(b"AM").is_err());
        assert!(decode(b"XXXX\x01\x00").is_err());

        let mut bytes = encode(&registers());
        bytes[4] = 9; // unsupported version
        assert!(decode(&bytes).is_err());

        let bytes = encode(&registers());
        assert!(decode(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("root.checkpoint");
        write(&path, &registers()).unwrap();
        assert_eq!(read(&path).unwrap(), registers());
    }
}
