//! Tests for the expiration reaper.

mod common;

use common::fixtures::{TestReaper, after_expiry, expire};
use forklift_core::config::ReaperConfig;
use forklift_core::{FileUploadState, UploadSessionState};
use forklift_store::{ReaperStats, SessionStore};
use std::sync::Arc;

#[tokio::test]
async fn test_sweep_ignores_unexpired_sessions() {
    let harness = TestReaper::new(ReaperConfig::default());
    harness.insert_with_file("1.0.0").await;

    let stats = harness.reaper.sweep().await.unwrap();
    assert_eq!(stats, ReaperStats::default());
    assert_eq!(harness.store.count_active().await.unwrap(), 1);
}

#[tokio::test]
async fn test_sweep_cancels_expired_session_and_files() {
    let harness = TestReaper::new(ReaperConfig {
        evict_terminal: false,
        ..ReaperConfig::default()
    });
    let (shared, file_id) = harness.insert_with_file("1.0.0").await;

    let stats = harness.reaper.sweep_at(after_expiry()).await.unwrap();
    assert_eq!(stats.items_processed, 1);
    assert_eq!(stats.canceled, 1);
    assert_eq!(stats.files_canceled, 1);
    assert_eq!(stats.evicted, 0);
    assert_eq!(stats.errors, 0);

    let session = shared.lock().await;
    assert_eq!(session.state(), UploadSessionState::Canceled);
    assert_eq!(
        session.file_upload_session(file_id).unwrap().state(),
        FileUploadState::Canceled
    );
    drop(session);

    // Canceled sessions stay in the store but are no longer active.
    assert!(harness.store.get(shared.lock().await.id).await.unwrap().is_some());
    assert_eq!(harness.store.count_active().await.unwrap(), 0);

    let again = harness.reaper.sweep_at(after_expiry()).await.unwrap();
    assert_eq!(again, ReaperStats::default());
}

#[tokio::test]
async fn test_sweep_evicts_terminal_sessions() {
    let harness = TestReaper::new(ReaperConfig::default());
    let (expired, _) = harness.insert_with_file("1.0.0").await;
    let upload_id = expired.lock().await.id;
    let token = expired.lock().await.session_token();

    let stats = harness.reaper.sweep_at(after_expiry()).await.unwrap();
    assert_eq!(stats.canceled, 1);
    assert_eq!(stats.evicted, 1);
    assert!(harness.store.get(upload_id).await.unwrap().is_none());
    assert!(harness.store.find_by_token(&token).await.unwrap().is_none());
}

#[tokio::test]
async fn test_sweep_leaves_complete_files_alone() {
    let harness = TestReaper::new(ReaperConfig {
        evict_terminal: false,
        ..ReaperConfig::default()
    });
    let (shared, file_id) = harness.insert_with_file("1.0.0").await;
    {
        let mut session = shared.lock().await;
        let mut controller = harness.context.controller(&mut session);
        controller.file(file_id).unwrap().action_ready().unwrap();
    }

    let stats = harness.reaper.sweep_at(after_expiry()).await.unwrap();
    assert_eq!(stats.canceled, 1);
    assert_eq!(stats.files_canceled, 0);

    let session = shared.lock().await;
    assert_eq!(
        session.file_upload_session(file_id).unwrap().state(),
        FileUploadState::Complete
    );
}

#[tokio::test]
async fn test_sweep_evicts_expired_published_session() {
    let harness = TestReaper::new(ReaperConfig::default());
    let (shared, file_id) = harness.insert_with_file("1.0.0").await;
    {
        let mut session = shared.lock().await;
        let mut controller = harness.context.controller(&mut session);
        controller.file(file_id).unwrap().action_ready().unwrap();
        controller.action_publish().unwrap();
    }
    let (pending, _) = harness.insert_with_file("2.0.0").await;
    expire(&mut *pending.lock().await);
    expire(&mut *shared.lock().await);

    let stats = harness.reaper.sweep().await.unwrap();
    assert_eq!(stats.items_processed, 1);
    assert_eq!(stats.canceled, 1);
    // The file of the pending session has its own, unexpired lifetime.
    assert_eq!(stats.files_canceled, 0);
    assert_eq!(stats.evicted, 2);
    assert_eq!(harness.store.count_active().await.unwrap(), 0);
}

#[tokio::test]
async fn test_sweep_respects_batch_size() {
    let harness = TestReaper::new(ReaperConfig {
        batch_size: 2,
        evict_terminal: false,
        ..ReaperConfig::default()
    });
    for version in ["1.0.0", "1.0.1", "1.0.2"] {
        harness.insert_with_file(version).await;
    }

    let first = harness.reaper.sweep_at(after_expiry()).await.unwrap();
    assert_eq!(first.canceled, 2);
    let second = harness.reaper.sweep_at(after_expiry()).await.unwrap();
    assert_eq!(second.canceled, 1);
    assert_eq!(harness.store.count_active().await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_spawned_reaper_sweeps_on_interval() {
    let harness = TestReaper::new(ReaperConfig {
        sweep_interval_secs: 30,
        ..ReaperConfig::default()
    });
    let (shared, _) = harness.insert_with_file("1.0.0").await;
    expire(&mut *shared.lock().await);

    let store = Arc::clone(&harness.store);
    let handle = harness.reaper.spawn();

    // The first tick fires immediately.
    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    assert_eq!(store.count_active().await.unwrap(), 0);
    assert_eq!(shared.lock().await.state(), UploadSessionState::Canceled);

    handle.abort();
}
