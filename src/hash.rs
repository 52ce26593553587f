use std::{
    fmt,
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
};

use sha2::{Digest, Sha256};

/// Block size of the remote store's published content hash algorithm.
pub const BLOCK_SIZE: usize = 4 * 1024 * 1024;

/// Lowercase hex digest as reported by the remote store for a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentHash(pub String);

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Streaming implementation of the remote store content hash: each 4 MiB
/// block is hashed with SHA-256, then the concatenated block digests are
/// hashed with SHA-256 again. Must match the store's own computation
/// bit-exactly or every file would appear changed.
pub struct ContentHasher {
    block_hasher: Sha256,
    overall_hasher: Sha256,
    block_len: usize,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self {
            block_hasher: Sha256::new(),
            overall_hasher: Sha256::new(),
            block_len: 0,
        }
    }

    pub fn update(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            let take = (BLOCK_SIZE - self.block_len).min(data.len());
            self.block_hasher.update(&data[..take]);
            self.block_len += take;
            data = &data[take..];
            if self.block_len == BLOCK_SIZE {
                self.finish_block();
            }
        }
    }

    fn finish_block(&mut self) {
        let digest = std::mem::replace(&mut self.block_hasher, Sha256::new()).finalize();
        self.overall_hasher.update(digest);
        self.block_len = 0;
    }

    pub fn finalize(mut self) -> ContentHash {
        if self.block_len > 0 {
            self.finish_block();
        }
        let digest = self.overall_hasher.finalize();
        let hex: String = digest.iter().map(|byte| format!("{:02x}", byte)).collect();
        ContentHash(hex)
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}

pub fn hash_bytes(data: &[u8]) -> ContentHash {
    let mut hasher = ContentHasher::new();
    hasher.update(data);
    hasher.finalize()
}

pub fn hash_file(path: &Path) -> Result<ContentHash, io::Error> {
    let file = File::open(path)?;
    let buffer_len = file.metadata()?.len().min(1_000_000) as usize;
    let mut reader = BufReader::with_capacity(buffer_len.max(1), file);
    let mut hasher = ContentHasher::new();
    loop {
        let part = reader.fill_buf()?;
        if part.is_empty() {
            break;
        }
        hasher.update(part);
        let part_len = part.len();
        reader.consume(part_len);
    }
    Ok(hasher.finalize())
}

#[cfg(test)]
mod test {
    use std::fs;

    use pretty_assertions::assert_eq;
    use sha2::{Digest, Sha256};

    use super::*;

    fn reference_hash(data: &[u8]) -> String {
        let mut overall = Sha256::new();
        for block in data.chunks(BLOCK_SIZE) {
            overall.update(Sha256::digest(block));
        }
        overall
            .finalize()
            .iter()
            .map(|byte| format!("{:02x}", byte))
            .collect()
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(
            hash_bytes(b"").0,
            // SHA-256 of zero bytes of block digests
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_single_block() {
        let data = b"hello world";
        assert_eq!(hash_bytes(data).0, reference_hash(data));
    }

    #[test]
    fn test_multiple_blocks() {
        let mut data = vec![0xabu8; BLOCK_SIZE + 3];
        data[0] = 0x01;
        assert_eq!(hash_bytes(&data).0, reference_hash(&data));
    }

    #[test]
    fn test_chunked_update_matches_single_update() {
        let data = vec![0x42u8; BLOCK_SIZE + 1000];
        let mut hasher = ContentHasher::new();
        for chunk in data.chunks(12345) {
            hasher.update(chunk);
        }
        assert_eq!(hasher.finalize(), hash_bytes(&data));
    }

    #[test]
    fn test_different_content_different_hash() {
        assert_ne!(hash_bytes(b"hello"), hash_bytes(b"world"));
    }

    #[test]
    fn test_hash_file_matches_hash_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, b"hello").unwrap();
        assert_eq!(hash_file(&path).unwrap(), hash_bytes(b"hello"));
    }
}
