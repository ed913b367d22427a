//! Chunked uploads: out-of-order arrival, completion and cleanup.

mod common;

use burrow_core::config::AppConfig;
use burrow_core::{UploadId, UploadState};
use burrow_vault::{ErrorKind, FileVault, InitUpload, MemorySessionStore, VaultError};
use bytes::Bytes;
use common::fixtures::{seeded_bytes, split_into_chunks};
use common::{TestVault, MB};
use proptest::prelude::*;
use std::sync::Arc;

fn init(name: &str, total_size: u64, chunk_size: u64) -> InitUpload {
    InitUpload {
        file_name: name.to_string(),
        directory: "/".to_string(),
        total_size,
        chunk_size,
        mime_type: None,
    }
}

#[tokio::test]
async fn test_out_of_order_chunks_assemble_in_index_order() {
    let t = TestVault::new().await;
    t.account(1, 20 * MB).await;

    let data = seeded_bytes(42, (15 * MB) as usize);
    let chunks = split_into_chunks(&data, (5 * MB) as usize);
    let session = t
        .vault
        .init_upload(1, init("movie.mp4", 15 * MB, 5 * MB))
        .await
        .unwrap();
    assert_eq!(session.total_chunks, 3);

    for index in [2u32, 0, 1] {
        t.vault
            .accept_chunk(1, session.id, index, chunks[index as usize].clone())
            .await
            .unwrap();
    }
    let outcome = t.vault.complete_upload(1, session.id).await.unwrap();

    assert!(!outcome.duplicate);
    assert_eq!(outcome.file.size_bytes, 15 * MB);
    assert_eq!(outcome.file.mime_type.as_deref(), Some("video/mp4"));
    assert_eq!(t.read(1, outcome.file.id).await, data.to_vec());
    assert_eq!(t.used(1).await, 15 * MB);
    assert!(t.staged_files().is_empty());
}

#[tokio::test]
async fn test_complete_before_all_chunks_changes_nothing() {
    let t = TestVault::new().await;
    t.account(1, MB).await;

    let data = seeded_bytes(1, 30);
    let chunks = split_into_chunks(&data, 10);
    let session = t.vault.init_upload(1, init("a.bin", 30, 10)).await.unwrap();
    t.vault
        .accept_chunk(1, session.id, 1, chunks[1].clone())
        .await
        .unwrap();

    match t.vault.complete_upload(1, session.id).await {
        Err(VaultError::IncompleteUpload { missing, total }) => {
            assert_eq!(missing, vec![0, 2]);
            assert_eq!(total, 3);
        }
        other => panic!("expected IncompleteUpload, got {other:?}"),
    }

    let status = t.vault.upload_status(1, session.id).await.unwrap();
    assert_eq!(status.state, UploadState::Receiving);
    assert_eq!(status.received_chunks, 1);
    assert_eq!(status.missing, vec![0, 2]);
    assert_eq!(t.used(1).await, 0);
    assert_eq!(t.staged_files().len(), 1);
    assert!(t.names(1, "/").await.is_empty());

    t.vault
        .accept_chunk(1, session.id, 0, chunks[0].clone())
        .await
        .unwrap();
    t.vault
        .accept_chunk(1, session.id, 2, chunks[2].clone())
        .await
        .unwrap();
    let outcome = t.vault.complete_upload(1, session.id).await.unwrap();
    assert_eq!(t.read(1, outcome.file.id).await, data.to_vec());
}

#[tokio::test]
async fn test_chunk_validation() {
    let t = TestVault::new().await;
    t.account(1, MB).await;
    let session = t.vault.init_upload(1, init("a.bin", 25, 10)).await.unwrap();

    let out_of_range = t
        .vault
        .accept_chunk(1, session.id, 3, Bytes::from(vec![0u8; 10]))
        .await;
    assert!(matches!(
        out_of_range,
        Err(VaultError::InvalidChunkIndex { index: 3, total: 3 })
    ));

    let short = t
        .vault
        .accept_chunk(1, session.id, 0, Bytes::from(vec![0u8; 9]))
        .await
        .unwrap_err();
    assert_eq!(short.kind(), ErrorKind::InvalidArgument);

    // The last chunk carries the remainder.
    let progress = t
        .vault
        .accept_chunk(1, session.id, 2, Bytes::from(vec![7u8; 5]))
        .await
        .unwrap();
    assert_eq!(progress.received_chunks, 1);
    assert!(!progress.complete);

    let repeat = t
        .vault
        .accept_chunk(1, session.id, 2, Bytes::from(vec![9u8; 5]))
        .await
        .unwrap();
    assert_eq!(repeat.received_chunks, 1);
}

#[tokio::test]
async fn test_resent_chunk_keeps_first_copy() {
    let t = TestVault::new().await;
    t.account(1, MB).await;
    let session = t.vault.init_upload(1, init("a.bin", 4, 2)).await.unwrap();

    t.vault
        .accept_chunk(1, session.id, 0, Bytes::from_static(b"ab"))
        .await
        .unwrap();
    t.vault
        .accept_chunk(1, session.id, 0, Bytes::from_static(b"zz"))
        .await
        .unwrap();
    t.vault
        .accept_chunk(1, session.id, 1, Bytes::from_static(b"cd"))
        .await
        .unwrap();

    let outcome = t.vault.complete_upload(1, session.id).await.unwrap();
    assert_eq!(t.read(1, outcome.file.id).await, b"abcd");
}

#[tokio::test]
async fn test_init_validation() {
    let t = TestVault::with_config(|c| c.uploads.max_chunks = 4).await;
    t.account(1, 100).await;

    let empty = t.vault.init_upload(1, init("a", 0, 10)).await;
    assert!(matches!(empty, Err(VaultError::FileEmpty)));

    let over_quota = t.vault.init_upload(1, init("a", 101, 50)).await;
    assert!(matches!(over_quota, Err(VaultError::QuotaExceeded { .. })));

    let zero_chunk = t.vault.init_upload(1, init("a", 10, 0)).await.unwrap_err();
    assert_eq!(zero_chunk.kind(), ErrorKind::InvalidArgument);

    let too_many = t.vault.init_upload(1, init("a", 50, 10)).await.unwrap_err();
    assert_eq!(too_many.kind(), ErrorKind::InvalidArgument);

    let no_dir = t
        .vault
        .init_upload(
            1,
            InitUpload {
                directory: "/nope".into(),
                ..init("a", 10, 10)
            },
        )
        .await
        .unwrap_err();
    assert_eq!(no_dir.kind(), ErrorKind::NotFound);

    let unknown = t.vault.init_upload(2, init("a", 10, 10)).await;
    assert!(matches!(unknown, Err(VaultError::AccountNotFound(2))));
}

#[tokio::test]
async fn test_sessions_are_private_to_their_account() {
    let t = TestVault::new().await;
    t.account(1, MB).await;
    t.account(2, MB).await;
    let session = t.vault.init_upload(1, init("a", 10, 10)).await.unwrap();

    let chunk = t
        .vault
        .accept_chunk(2, session.id, 0, Bytes::from(vec![0u8; 10]))
        .await
        .unwrap_err();
    assert_eq!(chunk.kind(), ErrorKind::Forbidden);
    assert_eq!(
        t.vault.complete_upload(2, session.id).await.unwrap_err().kind(),
        ErrorKind::Forbidden
    );
    assert_eq!(
        t.vault.abort_upload(2, session.id).await.unwrap_err().kind(),
        ErrorKind::Forbidden
    );
    assert!(t.staged_files().is_empty());

    let unknown = t.vault.upload_status(1, UploadId::new()).await;
    assert!(matches!(unknown, Err(VaultError::UploadNotFound(_))));
}

#[tokio::test]
async fn test_abort_discards_staging() {
    let t = TestVault::new().await;
    t.account(1, MB).await;
    let session = t.vault.init_upload(1, init("a", 20, 10)).await.unwrap();
    t.vault
        .accept_chunk(1, session.id, 0, Bytes::from(vec![1u8; 10]))
        .await
        .unwrap();
    assert_eq!(t.staged_files().len(), 1);

    t.vault.abort_upload(1, session.id).await.unwrap();
    assert!(t.staged_files().is_empty());
    assert!(matches!(
        t.vault
            .accept_chunk(1, session.id, 1, Bytes::from(vec![1u8; 10]))
            .await,
        Err(VaultError::UploadNotFound(_))
    ));
}

#[tokio::test]
async fn test_failed_completion_ends_the_session() {
    let t = TestVault::new().await;
    t.account(1, 30).await;

    let session = t.vault.init_upload(1, init("a", 20, 10)).await.unwrap();
    for index in 0..2 {
        t.vault
            .accept_chunk(1, session.id, index, seeded_bytes(index.into(), 10))
            .await
            .unwrap();
    }
    // Quota is only checked at init; fill it before completion.
    t.put(1, "/", "filler", seeded_bytes(99, 15)).await;

    let err = t.vault.complete_upload(1, session.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::QuotaExceeded);
    assert_eq!(t.used(1).await, 15);
    assert_eq!(t.blob_files().len(), 1);
    assert!(t.staged_files().is_empty());
    assert!(matches!(
        t.vault.upload_status(1, session.id).await,
        Err(VaultError::UploadNotFound(_))
    ));
}

#[tokio::test]
async fn test_chunked_duplicate_of_existing_file() {
    let t = TestVault::new().await;
    t.account(1, MB).await;

    let data = seeded_bytes(3, 20);
    let existing = t.put(1, "/", "first.bin", data.clone()).await.file;

    let session = t.vault.init_upload(1, init("second.bin", 20, 10)).await.unwrap();
    for (index, chunk) in split_into_chunks(&data, 10).into_iter().enumerate() {
        t.vault
            .accept_chunk(1, session.id, index as u32, chunk)
            .await
            .unwrap();
    }
    let outcome = t.vault.complete_upload(1, session.id).await.unwrap();

    assert!(outcome.duplicate);
    assert_eq!(outcome.file.id, existing.id);
    assert_eq!(t.used(1).await, 20);
    assert_eq!(t.blob_files().len(), 1);
    assert!(t.staged_files().is_empty());
}

#[tokio::test]
async fn test_expired_sessions_are_gone_and_reaped() {
    let t = TestVault::with_config(|c| c.uploads.session_ttl_secs = 1).await;
    t.account(1, MB).await;

    let session = t.vault.init_upload(1, init("a", 20, 10)).await.unwrap();
    t.vault
        .accept_chunk(1, session.id, 0, Bytes::from(vec![1u8; 10]))
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

    assert!(matches!(
        t.vault
            .accept_chunk(1, session.id, 1, Bytes::from(vec![1u8; 10]))
            .await,
        Err(VaultError::UploadNotFound(_))
    ));

    let stats = t.vault.sweep_uploads().await.unwrap();
    assert_eq!(stats.expired_sessions, 1);
    assert!(t.staged_files().is_empty());
}

#[tokio::test]
async fn test_session_lifetime_out_of_range_is_rejected() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut config = AppConfig::for_testing(dir.path());
    config.uploads.session_ttl_secs = 1_000_000_000_000;

    let err = FileVault::open(&config).await.err().unwrap();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    // A vault wired without validation still refuses the session.
    let storage = burrow_storage::from_config(&config.storage).await.unwrap();
    let metadata = burrow_metadata::from_config(&config.metadata).await.unwrap();
    let vault = FileVault::new(
        &config,
        storage,
        metadata,
        Arc::new(MemorySessionStore::new()),
    );
    vault.create_account(1, Some(MB)).await.unwrap();

    let err = vault.init_upload(1, init("a", 20, 10)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(err.to_string().contains("out of range"));
}

#[tokio::test]
async fn test_reaper_spawns_only_when_enabled() {
    let t = TestVault::new().await;
    assert!(t.vault.spawn_reaper().is_none());

    let t = TestVault::with_config(|c| c.uploads.reaper_enabled = true).await;
    let handle = t.vault.spawn_reaper().unwrap();
    handle.abort();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_any_arrival_order_reassembles_identically(
        seed in any::<u64>(),
        order in Just((0u32..6).collect::<Vec<_>>()).prop_shuffle(),
        last_len in 1usize..=7,
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let t = TestVault::new().await;
            t.account(1, MB).await;

            let total = 5 * 7 + last_len;
            let data = seeded_bytes(seed, total);
            let chunks = split_into_chunks(&data, 7);
            let session = t
                .vault
                .init_upload(1, init("p.bin", total as u64, 7))
                .await
                .unwrap();

            for &index in &order {
                t.vault
                    .accept_chunk(1, session.id, index, chunks[index as usize].clone())
                    .await
                    .unwrap();
            }
            let outcome = t.vault.complete_upload(1, session.id).await.unwrap();
            prop_assert_eq!(t.read(1, outcome.file.id).await, data.to_vec());
            prop_assert_eq!(t.used(1).await, total as u64);
            Ok(())
        })?;
    }
}
