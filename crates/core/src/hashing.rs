//! Content hashing and file records.
//!
//! Every file registered with the tracking database is described by a
//! [`FileRecord`] carrying a `sha512:<hex>` content hash. Hashes are computed
//! by a [`FileHasher`], which is injected into workers rather than shared as a
//! global so tests can substitute their own instance.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha512};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, BufReader};

const HASH_PREFIX: &str = "sha512:";
const HEX_LEN: usize = 128;

/// Errors produced while hashing files or parsing hashes.
#[derive(Debug, Error)]
pub enum HashError {
    /// The file could not be read.
    #[error("Failed to hash {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A hash string was not of the form `sha512:<128 hex chars>`.
    #[error("Invalid content hash: {0}")]
    InvalidHash(String),

    /// The path does not name a file.
    #[error("Path has no file name: {0}")]
    NoFileName(PathBuf),
}

/// A SHA-512 content hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash(String);

impl ContentHash {
    /// Builds a hash from a hex digest (case-insensitive).
    pub fn from_hex(hex: &str) -> Result<Self, HashError> {
        if hex.len() != HEX_LEN || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(HashError::InvalidHash(hex.to_string()));
        }
        Ok(Self(hex.to_ascii_lowercase()))
    }

    /// Hashes an in-memory buffer.
    pub fn of_bytes(data: &[u8]) -> Self {
        Self(format!("{:x}", Sha512::digest(data)))
    }

    /// The bare hex digest, without the algorithm prefix.
    pub fn hex(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", HASH_PREFIX, self.0)
    }
}

impl FromStr for ContentHash {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s
            .strip_prefix(HASH_PREFIX)
            .ok_or_else(|| HashError::InvalidHash(s.to_string()))?;
        Self::from_hex(hex)
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Role of a registered file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Raw,
    Log,
    Unpacked,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Log => "log",
            Self::Unpacked => "unpacked",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One physical file as registered with the tracking database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Host the file lives on.
    pub host: String,
    /// Directory containing the file.
    pub directory: PathBuf,
    /// File name within `directory`.
    pub name: String,
    /// Role of the file.
    #[serde(rename = "type")]
    pub file_type: FileType,
    /// Content hash at registration time.
    pub hash: ContentHash,
}

impl FileRecord {
    /// Full path of the recorded file.
    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.name)
    }
}

/// Streams files through SHA-512.
#[derive(Debug, Clone)]
pub struct FileHasher {
    buffer_size: usize,
}

impl Default for FileHasher {
    fn default() -> Self {
        Self::new(1024 * 1024)
    }
}

impl FileHasher {
    /// Creates a hasher reading with the given buffer size.
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size.max(4096),
        }
    }

    /// Hashes the file at `path`.
    pub async fn hash_file(&self, path: &Path) -> Result<ContentHash, HashError> {
        let io_err = |source| HashError::Io {
            path: path.to_path_buf(),
            source,
        };

        let file = File::open(path).await.map_err(io_err)?;
        let mut reader = BufReader::with_capacity(self.buffer_size, file);
        let mut buffer = vec![0u8; self.buffer_size];
        let mut hasher = Sha512::new();

        loop {
            let bytes_read = reader.read(&mut buffer).await.map_err(io_err)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(ContentHash(format!("{:x}", hasher.finalize())))
    }

    /// Hashes the file at its current location and describes it as a record.
    pub async fn record(
        &self,
        host: &str,
        path: &Path,
        file_type: FileType,
    ) -> Result<FileRecord, HashError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| HashError::NoFileName(path.to_path_buf()))?;
        let directory = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let hash = self.hash_file(path).await?;

        Ok(FileRecord {
            host: host.to_string(),
            directory,
            name,
            file_type,
            hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const ABC_SHA512: &str = "ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39a2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49f";

    #[tokio::test]
    async fn test_hash_file_known_digest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("abc.dat");
        std::fs::write(&path, b"abc").unwrap();

        let hash = FileHasher::new(4096).hash_file(&path).await.unwrap();
        assert_eq!(hash.hex(), ABC_SHA512);
        assert_eq!(hash.to_string(), format!("sha512:{}", ABC_SHA512));
        assert_eq!(hash, ContentHash::of_bytes(b"abc"));
    }

    #[tokio::test]
    async fn test_hash_file_larger_than_buffer() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.dat");
        let data: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        let hash = FileHasher::new(4096).hash_file(&path).await.unwrap();
        assert_eq!(hash, ContentHash::of_bytes(&data));
    }

    #[tokio::test]
    async fn test_hash_missing_file() {
        let result = FileHasher::default()
            .hash_file(Path::new("/nonexistent/file.dat"))
            .await;
        assert!(matches!(result, Err(HashError::Io { .. })));
    }

    #[tokio::test]
    async fn test_record_describes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run0042.log");
        std::fs::write(&path, b"abc").unwrap();

        let record = FileHasher::default()
            .record("daq01", &path, FileType::Log)
            .await
            .unwrap();

        assert_eq!(record.host, "daq01");
        assert_eq!(record.directory, dir.path());
        assert_eq!(record.name, "run0042.log");
        assert_eq!(record.file_type, FileType::Log);
        assert_eq!(record.path(), path);
        assert_eq!(record.hash.hex(), ABC_SHA512);
    }

    #[test]
    fn test_parse_rejects_wrong_prefix() {
        assert!("md5:abcdef".parse::<ContentHash>().is_err());
        assert!(format!("sha512:{}", &ABC_SHA512[..20])
            .parse::<ContentHash>()
            .is_err());
        let parsed: ContentHash = format!("sha512:{}", ABC_SHA512.to_uppercase())
            .parse()
            .unwrap();
        assert_eq!(parsed.hex(), ABC_SHA512);
    }

    #[test]
    fn test_record_serialization() {
        let record = FileRecord {
            host: "daq01".to_string(),
            directory: PathBuf::from("/data/raw"),
            name: "run1.dat".to_string(),
            file_type: FileType::Raw,
            hash: ContentHash::of_bytes(b"abc"),
        };

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"type\":\"raw\""));
        assert!(json.contains(&format!("\"hash\":\"sha512:{}\"", ABC_SHA512)));
    }
}
