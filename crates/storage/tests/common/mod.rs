pub mod fixtures;

use burrow_storage::{BlobStore, FilesystemBackend, ObjectStore, StagingArea};
use std::sync::Arc;
use tempfile::TempDir;

/// Filesystem-backed store rooted in a temporary directory.
#[allow(dead_code)]
pub struct TestStore {
    pub dir: TempDir,
    pub store: Arc<dyn ObjectStore>,
}

#[allow(dead_code)]
impl TestStore {
    pub async fn new(max_object_size: u64) -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let backend = FilesystemBackend::with_max_object_size(dir.path(), max_object_size)
            .await
            .expect("failed to create filesystem backend");
        Self {
            dir,
            store: Arc::new(backend),
        }
    }

    pub fn blobs(&self) -> BlobStore {
        BlobStore::new(self.store.clone())
    }

    pub fn staging(&self) -> StagingArea {
        StagingArea::new(self.store.clone())
    }

    /// Files under the root whose names mark an unfinished write.
    pub fn temp_files(&self) -> Vec<std::path::PathBuf> {
        let mut found = Vec::new();
        let mut stack = vec![self.dir.path().to_path_buf()];
        while let Some(dir) = stack.pop() {
            for entry in std::fs::read_dir(&dir).expect("read_dir") {
                let entry = entry.expect("dir entry");
                if entry.file_type().expect("file type").is_dir() {
                    stack.push(entry.path());
                } else if entry.file_name().to_string_lossy().contains(".tmp.") {
                    found.push(entry.path());
                }
            }
        }
        found
    }
}
