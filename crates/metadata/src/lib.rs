//! Metadata store abstraction and implementations for Burrow.
//!
//! This crate provides the persistent side of the file vault:
//! - Per-account quota rows with optimistic version checks
//! - File and folder records with their virtual paths and blob locations
//! - Lookups used by deduplication and blob reference counting

pub mod error;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use models::{AccountQuotaRow, FileRow};
pub use repos::{AccountRepo, FileRepo};
pub use store::{MetadataStore, SqliteStore};

use burrow_core::config::MetadataConfig;
use std::sync::Arc;

/// Create a metadata store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    config.validate().map_err(MetadataError::Config)?;

    match config {
        MetadataConfig::Sqlite {
            path,
            busy_timeout_secs,
        } => {
            let store = SqliteStore::new(path, *busy_timeout_secs).await?;
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
    }
}
