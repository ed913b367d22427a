//! Per-account virtual file storage for Burrow.
//!
//! [`FileVault`] ties the blob store, the metadata store, the quota ledger
//! and the upload session store together:
//! - Whole-file and chunked uploads with content-hash deduplication
//! - Virtual folders, listing, rename and trash
//! - Permanent deletion that frees a blob once nothing references it
//! - A background reaper for abandoned uploads

pub mod chunked;
pub mod dedup;
pub mod error;
pub mod ledger;
pub mod lifecycle;
pub mod locks;
pub mod reaper;
pub mod sessions;
pub mod vault;

pub use chunked::{InitUpload, UploadStatus};
pub use error::{ErrorKind, ErrorResponse, VaultError, VaultResult};
pub use lifecycle::{UploadOutcome, UploadRequest};
pub use reaper::{SessionReaper, SweepStats};
pub use sessions::{MemorySessionStore, SessionStore};
pub use vault::{AccountQuota, FileVault};
