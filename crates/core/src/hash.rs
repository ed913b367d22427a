//! Content hashing.
//!
//! Blobs are identified by the SHA-256 of their bytes. Hashing always
//! consumes its input in bounded reads so that large uploads never need to be
//! held in memory.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Read buffer size used by [`ContentHash::hash_reader`] (8 KiB).
pub const HASH_READ_BUF_SIZE: usize = 8 * 1024;

/// A SHA-256 content hash represented as 32 bytes.
///
/// Serializes as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Compute SHA-256 hash of data.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Create an incremental hasher.
    pub fn hasher() -> ContentHasher {
        ContentHasher(Sha256::new())
    }

    /// Synthetic hash identifying a folder by its full virtual path.
    ///
    /// The input is namespaced so a folder can never share a hash with a file
    /// whose content happens to be the path string.
    pub fn for_folder(path: &str) -> Self {
        let mut hasher = Self::hasher();
        hasher.update(b"burrow-folder\0");
        hasher.update(path.as_bytes());
        hasher.finalize()
    }

    /// Hash everything readable from `reader`, reading at most
    /// [`HASH_READ_BUF_SIZE`] bytes at a time.
    pub async fn hash_reader<R>(mut reader: R) -> std::io::Result<Self>
    where
        R: AsyncRead + Unpin,
    {
        let mut hasher = Self::hasher();
        let mut buf = vec![0u8; HASH_READ_BUF_SIZE];
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(hasher.finalize())
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        if s.len() != 64 {
            return Err(crate::Error::InvalidHash(format!(
                "expected 64 hex chars, got {}",
                s.len()
            )));
        }
        let mut bytes = [0u8; 32];
        for (i, pair) in s.as_bytes().chunks(2).enumerate() {
            let hex_str =
                std::str::from_utf8(pair).map_err(|e| crate::Error::InvalidHash(e.to_string()))?;
            bytes[i] = u8::from_str_radix(hex_str, 16)
                .map_err(|e| crate::Error::InvalidHash(e.to_string()))?;
        }
        Ok(Self(bytes))
    }

    /// Encode as lowercase hex string.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Incremental SHA-256 hasher.
pub struct ContentHasher(Sha256);

impl ContentHasher {
    /// Update the hasher with data.
    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    /// Finalize and return the hash.
    pub fn finalize(self) -> ContentHash {
        ContentHash(self.0.finalize().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO_SHA256: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[test]
    fn test_compute_known_vector() {
        let hash = ContentHash::compute(b"hello world");
        assert_eq!(hash.to_hex(), HELLO_SHA256);
    }

    #[test]
    fn test_hex_roundtrip_and_rejects_bad_length() {
        let hash = ContentHash::compute(b"abc");
        assert_eq!(ContentHash::from_hex(&hash.to_hex()).unwrap(), hash);
        assert!(ContentHash::from_hex("abcd").is_err());
        assert!(ContentHash::from_hex(&"zz".repeat(32)).is_err());
    }

    #[tokio::test]
    async fn test_hash_reader_matches_compute_across_buffer_boundaries() {
        let data: Vec<u8> = (0..(HASH_READ_BUF_SIZE * 3 + 17))
            .map(|i| (i % 251) as u8)
            .collect();
        let streamed = ContentHash::hash_reader(&data[..]).await.unwrap();
        assert_eq!(streamed, ContentHash::compute(&data));
    }

    #[test]
    fn test_folder_hash_depends_on_path_only() {
        assert_eq!(
            ContentHash::for_folder("/docs"),
            ContentHash::for_folder("/docs")
        );
        assert_ne!(
            ContentHash::for_folder("/docs"),
            ContentHash::for_folder("/docs2")
        );
        assert_ne!(
            ContentHash::for_folder("/docs"),
            ContentHash::compute(b"/docs")
        );
    }
}
