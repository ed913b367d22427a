mod common;

use burrow_core::{ContentHash, UploadId};
use burrow_storage::StorageError;
use bytes::Bytes;
use common::TestStore;
use common::fixtures::{seeded_bytes, split_into_chunks};
use futures::TryStreamExt;

#[tokio::test]
async fn test_chunked_roundtrip_through_blob_store() {
    let test = TestStore::new(1024 * 1024).await;
    let staging = test.staging();
    let blobs = test.blobs();

    let data = seeded_bytes(7, 300 * 1024 + 5);
    let chunks = split_into_chunks(&data, 64 * 1024);
    let id = UploadId::new();

    for (index, chunk) in chunks.iter().enumerate().rev() {
        staging
            .write_chunk(&id, index as u32, chunk.clone())
            .await
            .unwrap();
    }

    let assembled = staging.assemble(&id, chunks.len() as u32).await.unwrap();
    assert_eq!(assembled.size, data.len() as u64);
    assert_eq!(assembled.hash, ContentHash::compute(&data));

    let key = blobs.publish(&assembled.key, 9, "movie.mp4").await.unwrap();
    assert!(key.starts_with("users/user_9/") && key.ends_with(".mp4"));
    staging.purge(&id).await.unwrap();

    let stored: Vec<Bytes> = blobs.read(&key).await.unwrap().try_collect().await.unwrap();
    assert_eq!(stored.concat(), data.to_vec());
    assert!(staging.staged_upload_ids().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_chunk_rejected() {
    let test = TestStore::new(1024).await;
    let staging = test.staging();

    assert!(matches!(
        staging.write_chunk(&UploadId::new(), 0, Bytes::new()).await,
        Err(StorageError::EmptyObject(_))
    ));
}

#[tokio::test]
async fn test_unrelated_staging_entries_are_skipped() {
    let test = TestStore::new(1024).await;
    let staging = test.staging();

    test.store
        .put("staging/not-an-upload/junk", Bytes::from_static(b"x"))
        .await
        .unwrap();
    let id = UploadId::new();
    staging
        .write_chunk(&id, 0, Bytes::from_static(b"x"))
        .await
        .unwrap();

    let ids: Vec<UploadId> = staging.staged_upload_ids().await.unwrap().into_iter().collect();
    assert_eq!(ids, vec![id]);
}
