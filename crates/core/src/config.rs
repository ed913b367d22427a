//! Configuration types shared across crates.

use crate::size::ByteSize;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use time::Duration;

/// Storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for storage. Every blob resolves under it.
        path: PathBuf,
        /// Largest blob accepted by a single write (e.g. "1GB").
        #[serde(default = "default_max_file_size")]
        max_file_size: ByteSize,
    },
}

fn default_max_file_size() -> ByteSize {
    ByteSize::gib(1)
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/storage"),
            max_file_size: default_max_file_size(),
        }
    }
}

impl StorageConfig {
    /// Largest blob accepted by a single write.
    pub fn max_file_size(&self) -> u64 {
        match self {
            Self::Filesystem { max_file_size, .. } => max_file_size.as_u64(),
        }
    }

    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Filesystem {
                path,
                max_file_size,
            } => {
                if path.as_os_str().is_empty() {
                    return Err("storage.path cannot be empty".to_string());
                }
                if max_file_size.as_u64() == 0 {
                    return Err("storage.max_file_size must be greater than 0B".to_string());
                }
                Ok(())
            }
        }
    }
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database.
    Sqlite {
        /// Database file path (":memory:" for a throwaway store).
        path: PathBuf,
        /// Busy timeout in seconds while waiting on the database lock.
        #[serde(default = "default_sqlite_busy_timeout_secs")]
        busy_timeout_secs: u64,
    },
}

fn default_sqlite_busy_timeout_secs() -> u64 {
    5
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/metadata.db"),
            busy_timeout_secs: default_sqlite_busy_timeout_secs(),
        }
    }
}

impl MetadataConfig {
    /// Validate metadata configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Sqlite { path, .. } if path.as_os_str().is_empty() => {
                Err("metadata.path cannot be empty".to_string())
            }
            Self::Sqlite { .. } => Ok(()),
        }
    }
}

/// Per-account quota defaults.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Capacity given to accounts created without an explicit total.
    #[serde(default = "default_quota_total")]
    pub default_total: ByteSize,
}

fn default_quota_total() -> ByteSize {
    ByteSize::b(crate::DEFAULT_QUOTA_BYTES)
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            default_total: default_quota_total(),
        }
    }
}

/// Chunked upload configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Smallest chunk size a session may declare.
    #[serde(default = "default_min_chunk_size")]
    pub min_chunk_size: ByteSize,
    /// Largest chunk size a session may declare.
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: ByteSize,
    /// Upper bound on chunks per session.
    #[serde(default = "default_max_chunks")]
    pub max_chunks: u32,
    /// Idle session lifetime in seconds, measured from init.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    /// Run the background reaper for expired sessions and orphaned staging data.
    #[serde(default = "default_reaper_enabled")]
    pub reaper_enabled: bool,
    /// Seconds between reaper sweeps.
    #[serde(default = "default_reaper_interval_secs")]
    pub reaper_interval_secs: u64,
}

fn default_min_chunk_size() -> ByteSize {
    ByteSize::b(crate::MIN_CHUNK_SIZE)
}

fn default_max_chunk_size() -> ByteSize {
    ByteSize::b(crate::MAX_CHUNK_SIZE)
}

fn default_max_chunks() -> u32 {
    10_000
}

/// Longest accepted session lifetime: 365 days.
pub const MAX_SESSION_TTL_SECS: u64 = 365 * 86400;

fn default_session_ttl_secs() -> u64 {
    86400 // 24 hours
}

fn default_reaper_enabled() -> bool {
    true
}

fn default_reaper_interval_secs() -> u64 {
    300
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            min_chunk_size: default_min_chunk_size(),
            max_chunk_size: default_max_chunk_size(),
            max_chunks: default_max_chunks(),
            session_ttl_secs: default_session_ttl_secs(),
            reaper_enabled: default_reaper_enabled(),
            reaper_interval_secs: default_reaper_interval_secs(),
        }
    }
}

impl UploadConfig {
    /// Get the session TTL as a Duration.
    pub fn session_ttl(&self) -> Duration {
        // Saturate at i64::MAX to prevent overflow wrapping to negative
        let secs = i64::try_from(self.session_ttl_secs).unwrap_or(i64::MAX);
        Duration::seconds(secs)
    }

    /// Get the reaper tick interval.
    pub fn reaper_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.reaper_interval_secs)
    }

    /// Validate upload configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.min_chunk_size.as_u64() == 0 {
            return Err("uploads.min_chunk_size must be at least 1B".to_string());
        }
        if self.min_chunk_size > self.max_chunk_size {
            return Err(format!(
                "uploads.min_chunk_size ({}) exceeds uploads.max_chunk_size ({})",
                self.min_chunk_size, self.max_chunk_size
            ));
        }
        if self.max_chunks == 0 {
            return Err("uploads.max_chunks cannot be 0".to_string());
        }
        if self.session_ttl_secs == 0 {
            return Err("uploads.session_ttl_secs cannot be 0".to_string());
        }
        if self.session_ttl_secs > MAX_SESSION_TTL_SECS {
            return Err(format!(
                "uploads.session_ttl_secs ({}) exceeds the maximum of {MAX_SESSION_TTL_SECS}",
                self.session_ttl_secs
            ));
        }
        // tokio::time::interval panics on a zero period
        if self.reaper_enabled && self.reaper_interval_secs == 0 {
            return Err("uploads.reaper_interval_secs cannot be 0 while the reaper is enabled. \
                 Use a value >= 1 second or set reaper_enabled = false."
                .to_string());
        }
        Ok(())
    }
}

/// Granularity of the lock serializing file mutations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockScope {
    /// One lock for every account.
    Global,
    /// One lock per account. Different accounts mutate concurrently.
    #[default]
    PerAccount,
}

/// Locking configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LockingConfig {
    #[serde(default)]
    pub scope: LockScope,
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Storage backend configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Metadata store configuration.
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Quota defaults.
    #[serde(default)]
    pub quota: QuotaConfig,
    /// Chunked upload configuration.
    #[serde(default)]
    pub uploads: UploadConfig,
    /// Mutation lock configuration.
    #[serde(default)]
    pub locking: LockingConfig,
}

impl AppConfig {
    /// Validate every section, reporting the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        self.storage.validate()?;
        self.metadata.validate()?;
        self.uploads.validate()?;
        if self.quota.default_total.as_u64() == 0 {
            return Err("quota.default_total must be greater than 0B".to_string());
        }
        Ok(())
    }

    /// Create a test configuration rooted at `dir`.
    ///
    /// **For testing only.** Small limits, 1-byte minimum chunks, a 10MB
    /// default quota and the reaper disabled so tests drive it explicitly.
    pub fn for_testing(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            storage: StorageConfig::Filesystem {
                path: dir.join("storage"),
                max_file_size: ByteSize::mib(64),
            },
            metadata: MetadataConfig::Sqlite {
                path: dir.join("metadata.db"),
                busy_timeout_secs: default_sqlite_busy_timeout_secs(),
            },
            quota: QuotaConfig {
                default_total: ByteSize::mib(10),
            },
            uploads: UploadConfig {
                min_chunk_size: ByteSize::b(1),
                max_chunk_size: ByteSize::mib(8),
                max_chunks: 1024,
                session_ttl_secs: 3600,
                reaper_enabled: false,
                reaper_interval_secs: 60,
            },
            locking: LockingConfig::default(),
        }
    }
}
