//! Streaming content digests.

use std::io::{ErrorKind as IoErrorKind, Read, Result as IoResult};

/// Content is hashed in fixed chunks so that memory use doesn't depend on
/// file size.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// BLAKE3 hex digest of everything `reader` produces.
pub fn hash_reader(mut reader: impl Read) -> IoResult<String> {
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0; CHUNK_SIZE];
    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => {
                hasher.update(&buffer[..n]);
            },
            Err(e) if e.kind() == IoErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(hasher.finalize().to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_matches_one_shot_hash() {
        let data = vec![7u8; CHUNK_SIZE * 2 + 17];
        let digest = hash_reader(Cursor::new(&data)).unwrap();
        assert_eq!(digest, blake3::hash(&data).to_hex().to_string());
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(hash_reader(Cursor::new(b"")).unwrap(), blake3::hash(b"").to_hex().to_string());
    }

    #[test]
    fn test_distinct_content() {
        let a = hash_reader(Cursor::new(b"AAAAAA")).unwrap();
        let b = hash_reader(Cursor::new(b"BBBBBB")).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
    }
}
