//! Integration tests for `DirectoryStore`: round trips, culling, locking and
//! shutdown.
//!
//! Run with: `cargo test --test store_integration`

mod common;

use common::wait_for;
use filetime::FileTime;
use ssim::config::StoreConfig;
use ssim::error::StoreError;
use ssim::store::layout::{self, storage_dir};
use ssim::store::{DirectoryStore, RenditionStore};
use ssim::{ImageSpec, KeyRegistry, RenditionKey};
use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

const KB: usize = 1024;

// ============================================================================
// Test Helpers
// ============================================================================

fn original() -> ImageSpec {
    ImageSpec::new(
        Some("image/jpeg".to_string()),
        Some(SystemTime::now() - Duration::from_secs(3600)),
        Some(1024),
        Some(768),
    )
}

/// Store `size` bytes under `key` and backdate the file by `age_secs`.
fn store_aged(store: &DirectoryStore, key: &Arc<RenditionKey>, size: usize, age_secs: u64) {
    store.store(key, &vec![7u8; size], &original()).unwrap();
    let path = layout::instance_path(store.storage_dir(), key);
    let mtime = SystemTime::now() - Duration::from_secs(age_secs);
    filetime::set_file_mtime(&path, FileTime::from_system_time(mtime)).unwrap();
}

// ============================================================================
// Round trip
// ============================================================================

#[test]
fn test_store_then_retrieve_round_trips_bytes() {
    let temp = TempDir::new().unwrap();
    let store = DirectoryStore::open(&StoreConfig::new(temp.path())).unwrap();
    let registry = KeyRegistry::new();
    let key = registry.resolve("photos/2024/beach.jpg", Some("image/webp"), 320, 240);
    let payload: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();

    let before = SystemTime::now();
    store.store(&key, &payload, &original()).unwrap();

    let data = store.retrieve(&key).unwrap().unwrap();
    assert_eq!(data.read_to_vec().unwrap(), payload);
    // Filesystem timestamps may be coarser than the system clock
    assert!(data.timestamp().unwrap() + Duration::from_secs(1) >= before);
}

#[test]
fn test_layout_on_disk() {
    let temp = TempDir::new().unwrap();
    let store = DirectoryStore::open(&StoreConfig::new(temp.path())).unwrap();
    let registry = KeyRegistry::new();
    let key = registry.resolve("a b/c", Some("image/png"), 10, 20);
    store.store(&key, b"x", &original()).unwrap();

    let uid_dir = storage_dir(temp.path()).join("a+b%2Fc_cache");
    assert!(uid_dir.join("original_metadata.json").is_file());
    assert!(uid_dir.join("instance_10_x_20_image.png").is_file());
}

#[test]
fn test_reopened_store_sees_previous_entries() {
    let temp = TempDir::new().unwrap();
    let registry = KeyRegistry::new();
    let key = registry.resolve("img1", Some("image/png"), 5, 5);

    {
        let store = DirectoryStore::open(&StoreConfig::new(temp.path())).unwrap();
        store.store(&key, b"persisted", &original()).unwrap();
    }

    let store = DirectoryStore::open(&StoreConfig::new(temp.path())).unwrap();
    let data = store.retrieve(&key).unwrap().unwrap();
    assert_eq!(data.read_to_vec().unwrap(), b"persisted");
    assert_eq!(
        store.original_spec(&key).unwrap().unwrap().dimensions(),
        Some((1024, 768))
    );
}

#[test]
fn test_corrupt_metadata_is_reported() {
    let temp = TempDir::new().unwrap();
    let store = DirectoryStore::open(&StoreConfig::new(temp.path())).unwrap();
    let registry = KeyRegistry::new();
    let key = registry.resolve("img1", Some("image/png"), 5, 5);
    store.store(&key, b"x", &original()).unwrap();

    fs::write(layout::metadata_path(store.storage_dir(), "img1"), b"{not json").unwrap();
    assert!(matches!(
        store.original_spec(&key),
        Err(StoreError::Metadata { .. })
    ));
}

// ============================================================================
// Culling
// ============================================================================

#[test]
fn test_cull_removes_oldest_large_file_first() {
    let temp = TempDir::new().unwrap();
    let config = StoreConfig::new(temp.path()).with_max_size_bytes(1024 * KB as u64);
    let store = DirectoryStore::open(&config).unwrap();
    let registry = KeyRegistry::new();

    let oldest = registry.resolve("img", Some("image/png"), 600, 1);
    let middle = registry.resolve("img", Some("image/png"), 300, 1);
    let newest = registry.resolve("img", Some("image/png"), 300, 2);
    store_aged(&store, &oldest, 600 * KB, 300);
    store_aged(&store, &middle, 300 * KB, 200);
    store_aged(&store, &newest, 300 * KB, 100);

    let report = store.cull_now().unwrap().unwrap();

    assert!(report.size_after <= 1024 * KB as u64);
    assert_eq!(report.files_deleted, 1);
    assert!(store.retrieve(&oldest).unwrap().is_none());
    assert!(store.retrieve(&middle).unwrap().is_some());
    assert!(store.retrieve(&newest).unwrap().is_some());
    assert!(store.original_spec(&oldest).unwrap().is_some());
}

#[test]
fn test_cull_within_budget_is_noop() {
    let temp = TempDir::new().unwrap();
    let config = StoreConfig::new(temp.path()).with_max_size_bytes(1024 * KB as u64);
    let store = DirectoryStore::open(&config).unwrap();
    let registry = KeyRegistry::new();
    store_aged(&store, &registry.resolve("a", Some("image/png"), 1, 1), 10 * KB, 10);

    assert!(store.cull_now().unwrap().is_none());
    assert_eq!(store.disk_usage().unwrap(), (1, 10 * KB as u64));
}

#[test]
fn test_background_cull_enforces_budget() {
    let temp = TempDir::new().unwrap();
    let config = StoreConfig::new(temp.path())
        .with_max_size_bytes(1024 * KB as u64)
        .with_cull_interval(Duration::from_secs(1));
    let store = DirectoryStore::open(&config).unwrap();
    let registry = KeyRegistry::new();

    let oldest = registry.resolve("img", Some("image/png"), 600, 1);
    store_aged(&store, &oldest, 600 * KB, 300);
    store_aged(&store, &registry.resolve("img", Some("image/png"), 300, 1), 300 * KB, 200);
    store_aged(&store, &registry.resolve("img", Some("image/png"), 300, 2), 300 * KB, 100);

    assert!(wait_for(|| {
        store
            .disk_usage()
            .map(|(_, bytes)| bytes <= 1024 * KB as u64)
            .unwrap_or(false)
    }));
    assert!(store.retrieve(&oldest).unwrap().is_none());
    assert!(store.is_culling());
}

#[test]
fn test_recently_read_file_survives_cull() {
    let temp = TempDir::new().unwrap();
    let store = DirectoryStore::open(&StoreConfig::new(temp.path())).unwrap();
    let registry = KeyRegistry::new();

    let read_often = registry.resolve("a", Some("image/png"), 1, 1);
    let ignored = registry.resolve("b", Some("image/png"), 1, 1);
    store_aged(&store, &read_often, 100, 500);
    store_aged(&store, &ignored, 100, 100);

    // Reading refreshes recency
    drop(store.retrieve(&read_often).unwrap());

    store.cull_to(100).unwrap().unwrap();
    assert!(store.retrieve(&read_often).unwrap().is_some());
    assert!(store.retrieve(&ignored).unwrap().is_none());
}

// ============================================================================
// Locking
// ============================================================================

#[test]
fn test_unreleased_handle_stalls_writer() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(DirectoryStore::open(&StoreConfig::new(temp.path())).unwrap());
    let registry = KeyRegistry::new();
    let key = registry.resolve("img1", Some("image/png"), 8, 8);
    store.store(&key, b"v1", &original()).unwrap();

    let mut handle = store.retrieve(&key).unwrap().unwrap();

    let writer = {
        let store = Arc::clone(&store);
        let key = Arc::clone(&key);
        thread::spawn(move || store.store(&key, b"v2", &original()))
    };

    thread::sleep(Duration::from_millis(200));
    assert!(!writer.is_finished(), "writer must wait for the reader");
    assert_eq!(handle.read_to_vec().unwrap(), b"v1");

    handle.release();
    writer.join().unwrap().unwrap();
    assert_eq!(
        store.retrieve(&key).unwrap().unwrap().read_to_vec().unwrap(),
        b"v2"
    );
}

#[test]
fn test_concurrent_writers_of_distinct_keys() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(DirectoryStore::open(&StoreConfig::new(temp.path())).unwrap());
    let registry = Arc::new(KeyRegistry::new());

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let store = Arc::clone(&store);
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                // Four uids so metadata initialization races too
                let key = registry.resolve(&format!("uid{}", i % 4), Some("image/png"), i, i);
                store.store(&key, &vec![i as u8; 64], &original()).unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.disk_usage().unwrap(), (16, 16 * 64));
}

#[test]
fn test_close_rejects_further_operations() {
    let temp = TempDir::new().unwrap();
    let store = DirectoryStore::open(&StoreConfig::new(temp.path())).unwrap();
    let registry = KeyRegistry::new();
    let key = registry.resolve("img1", Some("image/png"), 8, 8);

    store.close().unwrap();
    assert!(matches!(
        store.store(&key, b"x", &original()),
        Err(StoreError::Closed)
    ));
}
