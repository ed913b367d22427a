//! Local filesystem storage backend.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ByteStream, ObjectMeta, ObjectStore, StreamingUpload};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

/// Default chunk size for streaming reads (64 KiB).
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Marker inserted into temporary file names. Listings skip these.
const TEMP_MARKER: &str = ".tmp.";

/// Local filesystem object store.
pub struct FilesystemBackend {
    root: PathBuf,
    max_object_size: u64,
}

impl FilesystemBackend {
    /// Create a new filesystem backend with no practical size limit.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        Self::with_max_object_size(root, u64::MAX).await
    }

    /// Create a backend that rejects objects larger than `max_object_size` bytes.
    pub async fn with_max_object_size(
        root: impl AsRef<Path>,
        max_object_size: u64,
    ) -> StorageResult<Self> {
        if max_object_size == 0 {
            return Err(StorageError::Config(
                "max object size must be greater than zero".to_string(),
            ));
        }
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            max_object_size,
        })
    }

    /// Largest object accepted by a write.
    pub fn max_object_size(&self) -> u64 {
        self.max_object_size
    }

    /// Resolve a key to a path under the root.
    ///
    /// Canonicalization and stat calls block, so validation runs on the
    /// blocking pool.
    async fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        let root = self.root.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || Self::key_path_sync(&root, &key))
            .await
            .map_err(|e| {
                StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}")))
            })?
    }

    /// Validate `key` and return its path under `root`.
    ///
    /// Lexical checks reject absolute keys and `..`/`.` components. The path
    /// (or, for keys that do not exist yet, its nearest existing ancestor) is
    /// then canonicalized and must stay inside the canonical root, which also
    /// defeats symlinks that point outside.
    fn key_path_sync(root: &Path, key: &str) -> StorageResult<PathBuf> {
        if key.contains("..") || key.starts_with('/') || key.starts_with('\\') {
            return Err(StorageError::InvalidKey(format!(
                "path traversal not allowed: {key}"
            )));
        }
        if Path::new(key)
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(StorageError::InvalidKey(format!(
                "contains unsafe path component: {key}"
            )));
        }

        let path = root.join(key);
        let root_canonical = root.canonicalize().map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to canonicalize root: {e}"),
            ))
        })?;

        // The key itself first, then each ancestor until one exists.
        let mut candidate = Some(path.as_path());
        while let Some(current) = candidate {
            match std::fs::symlink_metadata(current) {
                Ok(meta) => {
                    let canonical = current.canonicalize().map_err(|e| {
                        if meta.file_type().is_symlink() {
                            StorageError::InvalidKey(format!(
                                "symlink target missing or invalid: {key}"
                            ))
                        } else {
                            StorageError::Io(std::io::Error::new(
                                e.kind(),
                                format!("failed to canonicalize path: {e}"),
                            ))
                        }
                    })?;
                    if !canonical.starts_with(&root_canonical) {
                        return Err(StorageError::InvalidKey(format!(
                            "resolved path escapes storage root: {key}"
                        )));
                    }
                    return Ok(path);
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    candidate = current.parent();
                }
                Err(err) => {
                    return Err(StorageError::Io(std::io::Error::new(
                        err.kind(),
                        format!("failed to stat path: {err}"),
                    )));
                }
            }
        }

        Ok(path)
    }

    /// Ensure parent directory exists.
    async fn ensure_parent(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Unique sibling path used while an object is being written.
    fn temp_path_for(path: &Path) -> PathBuf {
        let suffix = format!("{TEMP_MARKER}{}", Uuid::new_v4());
        path.with_file_name(
            path.file_name()
                .map(|n| format!("{}{suffix}", n.to_string_lossy()))
                .unwrap_or(suffix),
        )
    }

    fn check_size(&self, key: &str, size: u64) -> StorageResult<()> {
        if size == 0 {
            return Err(StorageError::EmptyObject(key.to_string()));
        }
        if size > self.max_object_size {
            return Err(StorageError::ObjectTooLarge {
                key: key.to_string(),
                max: self.max_object_size,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FilesystemBackend {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_path(key).await?;
        fs::try_exists(&path).await.map_err(StorageError::Io)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        let path = self.key_path(key).await?;
        let metadata = fs::metadata(&path)
            .await
            .map_err(|e| StorageError::from_io(key, e))?;

        Ok(ObjectMeta {
            size: metadata.len(),
            last_modified: metadata.modified().ok().map(|t| t.into()),
        })
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.key_path(key).await?;
        let data = fs::read(&path)
            .await
            .map_err(|e| StorageError::from_io(key, e))?;
        Ok(Bytes::from(data))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        use tokio::io::AsyncReadExt;

        let path = self.key_path(key).await?;
        let file = fs::File::open(&path)
            .await
            .map_err(|e| StorageError::from_io(key, e))?;

        let stream = async_stream::try_stream! {
            let mut file = file;
            let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                yield Bytes::copy_from_slice(&buf[..n]);
            }
        };

        Ok(Box::pin(stream))
    }

    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.check_size(key, data.len() as u64)?;
        let path = self.key_path(key).await?;
        self.ensure_parent(&path).await?;

        let temp_path = Self::temp_path_for(&path);
        let written = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&temp_path, &path).await
        }
        .await;

        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::from_io(key, e));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn put_stream(&self, key: &str) -> StorageResult<Box<dyn StreamingUpload>> {
        let path = self.key_path(key).await?;
        self.ensure_parent(&path).await?;

        let temp_path = Self::temp_path_for(&path);
        let file = fs::File::create(&temp_path)
            .await
            .map_err(|e| StorageError::from_io(key, e))?;

        Ok(Box::new(FilesystemUpload {
            key: key.to_string(),
            file,
            temp_path,
            final_path: path,
            bytes_written: 0,
            max_object_size: self.max_object_size,
        }))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn delete(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_path(key).await?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::from_io(key, e)),
        }
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn delete_prefix(&self, prefix: &str) -> StorageResult<bool> {
        let path = self.key_path(prefix).await?;
        if path == self.root {
            return Err(StorageError::InvalidKey(
                "refusing to delete the storage root".to_string(),
            ));
        }
        match fs::remove_dir_all(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::from_io(prefix, e)),
        }
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let base_path = self.key_path(prefix).await?;
        let mut results = Vec::new();

        match fs::try_exists(&base_path).await {
            Ok(false) => return Ok(results),
            Ok(true) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(results),
            Err(e) => return Err(StorageError::Io(e)),
        }

        let mut stack = vec![base_path];
        while let Some(dir) = stack.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                // file_type() does not follow symlinks; links are skipped entirely.
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    stack.push(path);
                } else if file_type.is_file()
                    && !entry.file_name().to_string_lossy().contains(TEMP_MARKER)
                    && let Ok(rel) = path.strip_prefix(&self.root)
                {
                    results.push(rel.to_string_lossy().to_string());
                }
            }
        }

        Ok(results)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn rename(&self, from: &str, to: &str) -> StorageResult<()> {
        let from_path = self.key_path(from).await?;
        let to_path = self.key_path(to).await?;
        self.ensure_parent(&to_path).await?;
        fs::rename(&from_path, &to_path)
            .await
            .map_err(|e| StorageError::from_io(from, e))
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn health_check(&self) -> StorageResult<()> {
        let metadata = fs::metadata(&self.root).await.map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("storage root not accessible: {e}"),
            ))
        })?;

        if !metadata.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::NotADirectory,
                format!("storage root is not a directory: {:?}", self.root),
            )));
        }

        Ok(())
    }
}

/// Streaming upload for filesystem backend.
struct FilesystemUpload {
    key: String,
    file: fs::File,
    temp_path: PathBuf,
    final_path: PathBuf,
    bytes_written: u64,
    max_object_size: u64,
}

#[async_trait]
impl StreamingUpload for FilesystemUpload {
    async fn write(&mut self, data: Bytes) -> StorageResult<()> {
        let next = self.bytes_written.saturating_add(data.len() as u64);
        if next > self.max_object_size {
            return Err(StorageError::ObjectTooLarge {
                key: self.key.clone(),
                max: self.max_object_size,
            });
        }
        self.file
            .write_all(&data)
            .await
            .map_err(|e| StorageError::from_io(&self.key, e))?;
        self.bytes_written = next;
        Ok(())
    }

    fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    async fn finish(self: Box<Self>) -> StorageResult<u64> {
        let Self {
            key,
            file,
            temp_path,
            final_path,
            bytes_written,
            ..
        } = *self;

        if bytes_written == 0 {
            drop(file);
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::EmptyObject(key));
        }

        let published = async {
            file.sync_all().await?;
            drop(file);
            fs::rename(&temp_path, &final_path).await
        }
        .await;

        if let Err(e) = published {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::from_io(&key, e));
        }
        Ok(bytes_written)
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        drop(self.file);
        let _ = fs::remove_file(&self.temp_path).await;
        Ok(())
    }
}
