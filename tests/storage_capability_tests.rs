//! Managed storage capability tests
//!
//! Insert, select and clean against the in-memory blob store: manifest
//! bookkeeping, version resolution, retention, error propagation and
//! serialization of concurrent writers.

use std::collections::HashSet;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Offset, Utc};
use mstore::memory::IoOp;
use mstore::{
    ArtifactInput, BlobIo, Listing, ManagedStorage, Manifest, ManifestItem, MemoryIo, MutexKey, MutexRegistry,
    RetentionPolicy, Selection, StorageError, StorageOptions, Version,
};
use mstore_model::{join_key, ListedArtifact};
use serde_json::json;

const VERY_LONG_AGO: &str = "1999-12-31T23:59:59.999+00:00";
const LAST_YEAR: &str = "2023-05-17T08:00:00.000+00:00";
const PRESENT: &str = "2024-05-17T08:00:00.000+00:00";

fn storage() -> ManagedStorage {
    ManagedStorage::with_options(
        Arc::new(MutexRegistry::new()),
        StorageOptions {
            offset: Utc.fix(),
            collision_interval: Duration::from_millis(1),
            max_collision_attempts: None,
        },
    )
}

fn key() -> MutexKey {
    MutexKey::new(["memory", "root"])
}

fn fruit_batch() -> Vec<ArtifactInput> {
    vec![
        ArtifactInput::new("Apple.txt", "/tmp/src/Apple.txt", 5),
        ArtifactInput::new("Banana.txt", "/tmp/src/Banana.txt", 6),
        ArtifactInput::new("Coconut.txt", "/tmp/src/Coconut.txt", 7),
    ]
}

fn read_manifest(io: &MemoryIo, base: &str) -> Manifest {
    let bytes = io.get(&join_key([base, "manifest.json"])).expect("manifest written");
    Manifest::from_json(&bytes).unwrap()
}

/// Seed a manifest whose items each point at a one-artifact listing.
fn seed(io: &MemoryIo, base: &str, versions: &[&str]) {
    let mut manifest = Manifest::default();
    for (i, version) in versions.iter().enumerate() {
        let listing_path = format!("{}/listing-seed{:04}.json", version, i);
        let listing = Listing {
            artifacts: vec![ListedArtifact {
                path: format!("artifact-{}.bin", i),
                size: 10,
                trail: Vec::new(),
            }],
        };
        io.put(join_key([base, &listing_path]), listing.to_json().unwrap());
        manifest.push(ManifestItem {
            version: Version::parse(version).unwrap(),
            total_size: 10,
            listing_path,
        });
    }
    io.put(join_key([base, "manifest.json"]), manifest.to_json().unwrap());
}

// =============================================================================
// Insert
// =============================================================================

#[tokio::test]
async fn test_insert_fruit_batch_into_empty_manifest() {
    let io = MemoryIo::new();
    let trail = vec![json!({"step": "archive"})];

    let outcome = storage()
        .insert(&io, "hello-123-base", &key(), &fruit_batch(), &trail)
        .await
        .unwrap();

    let manifest = read_manifest(&io, "hello-123-base");
    assert_eq!(manifest.len(), 1);
    let item = &manifest.items[0];
    assert_eq!(item.version, outcome.version);
    assert_eq!(item.total_size, 18);
    assert!(item.version.is_canonical());
    assert_eq!(item.version_dir(), outcome.version.as_str());

    let listing_bytes = io.get(&outcome.listing_path).expect("listing written");
    let listing = Listing::from_json(&outcome.listing_path, &listing_bytes).unwrap();
    let names: Vec<_> = listing.artifacts.iter().map(|a| a.path.as_str()).collect();
    assert_eq!(names, vec!["Apple.txt", "Banana.txt", "Coconut.txt"]);
    assert!(listing.artifacts.iter().all(|a| a.trail == trail));
    assert_eq!(listing.total_size(), 18);

    let destinations: Vec<_> = outcome
        .insertable_artifacts
        .iter()
        .map(|a| a.destination_path.clone())
        .collect();
    assert_eq!(
        destinations,
        vec![
            format!("hello-123-base/{}/Apple.txt", outcome.version),
            format!("hello-123-base/{}/Banana.txt", outcome.version),
            format!("hello-123-base/{}/Coconut.txt", outcome.version),
        ]
    );
    assert_eq!(outcome.insertable_artifacts[0].source_path, "/tmp/src/Apple.txt");
}

#[tokio::test]
async fn test_insert_does_not_copy_bytes() {
    let io = MemoryIo::new();
    let outcome = storage().insert(&io, "b", &key(), &fruit_batch(), &[]).await.unwrap();

    // Only the manifest and the listing exist; artifact bytes are the caller's job.
    let mut expected = vec!["b/manifest.json".to_string(), outcome.listing_path.clone()];
    expected.sort();
    assert_eq!(io.keys(), expected);
}

#[tokio::test]
async fn test_insert_empty_batch_appends_one_item() {
    let io = MemoryIo::new();
    let outcome = storage().insert(&io, "backups", &key(), &[], &[]).await.unwrap();

    let manifest = read_manifest(&io, "backups");
    assert_eq!(manifest.len(), 1);
    assert_eq!(manifest.items[0].total_size, 0);
    assert!(outcome.insertable_artifacts.is_empty());

    let listing = Listing::from_json(&outcome.listing_path, &io.get(&outcome.listing_path).unwrap()).unwrap();
    assert!(listing.artifacts.is_empty());
}

#[tokio::test]
async fn test_insert_appends_fresh_version_each_time() {
    let io = MemoryIo::new();
    let storage = storage();
    seed(&io, "b", &[LAST_YEAR, PRESENT]);

    for expected_len in 3..=6 {
        let before = read_manifest(&io, "b");
        let outcome = storage.insert(&io, "b", &key(), &fruit_batch(), &[]).await.unwrap();
        let after = read_manifest(&io, "b");

        assert_eq!(after.len(), expected_len);
        assert!(!before.contains_version(&outcome.version));
        assert_eq!(after.items.last().unwrap().version, outcome.version);
        // Existing items are untouched.
        assert_eq!(&after.items[..before.len()], &before.items[..]);
    }
}

#[tokio::test]
async fn test_listing_name_avoids_artifact_names() {
    let io = MemoryIo::new();
    let batch = vec![ArtifactInput::new("listing.json", "/src/listing.json", 1)];
    let outcome = storage().insert(&io, "", &key(), &batch, &[]).await.unwrap();

    let listing_name = outcome.listing_path.rsplit('/').next().unwrap();
    assert!(Listing::is_listing_file_name(listing_name));
    assert_ne!(listing_name, "listing.json");
}

#[tokio::test]
async fn test_paths_are_rooted_under_base_and_version() {
    for base in ["", "backups", "/backups", "backups/x", "/backups/x"] {
        let io = MemoryIo::new();
        let outcome = storage().insert(&io, base, &key(), &fruit_batch(), &[]).await.unwrap();
        let prefix = join_key([base, outcome.version.as_str()]);

        assert!(
            outcome.listing_path.starts_with(&prefix),
            "listing {} not under {}",
            outcome.listing_path,
            prefix
        );
        for artifact in &outcome.insertable_artifacts {
            assert!(
                artifact.destination_path.starts_with(&prefix),
                "destination {} not under {}",
                artifact.destination_path,
                prefix
            );
        }
        assert!(io.get(&join_key([base, "manifest.json"])).is_some(), "base {:?}", base);
    }
}

#[tokio::test]
async fn test_insert_uses_configured_offset() {
    let io = MemoryIo::new();
    let storage = ManagedStorage::with_options(
        Arc::new(MutexRegistry::new()),
        StorageOptions {
            offset: mstore_model::parse_offset("-03:30").unwrap(),
            ..StorageOptions::default()
        },
    );

    let outcome = storage.insert(&io, "b", &key(), &[], &[]).await.unwrap();
    assert!(outcome.version.as_str().ends_with("-03:30"), "{}", outcome.version);
}

#[tokio::test]
async fn test_insert_accepts_legacy_versions_in_manifest() {
    let io = MemoryIo::new();
    seed(&io, "b", &["2020-01-01T00:00:00.000+01:00[Europe/Paris]"]);

    storage().insert(&io, "b", &key(), &fruit_batch(), &[]).await.unwrap();

    let manifest = read_manifest(&io, "b");
    assert_eq!(manifest.len(), 2);
    assert_eq!(manifest.items[0].version, "2020-01-01T00:00:00.000+01:00[Europe/Paris]");
}

// =============================================================================
// Select
// =============================================================================

#[tokio::test]
async fn test_select_latest_ignores_storage_order() {
    let io = MemoryIo::new();
    seed(&io, "b", &[LAST_YEAR, PRESENT, VERY_LONG_AGO]);

    let outcome = storage().select(&io, "b", &key(), &Selection::Latest).await.unwrap();

    assert_eq!(outcome.resolved_version, PRESENT);
    assert_eq!(outcome.selectable_artifacts.len(), 1);
    assert_eq!(outcome.selectable_artifacts[0].name, "artifact-1.bin");
    assert_eq!(
        outcome.selectable_artifacts[0].path,
        format!("b/{}/artifact-1.bin", PRESENT)
    );
}

#[tokio::test]
async fn test_select_latest_on_empty_root() {
    let io = MemoryIo::new();
    let err = storage().select(&io, "b", &key(), &Selection::Latest).await.unwrap_err();
    assert!(matches!(err, StorageError::ManifestEmpty));
}

#[tokio::test]
async fn test_select_specific() {
    let io = MemoryIo::new();
    seed(&io, "b", &[LAST_YEAR, PRESENT]);

    let outcome = storage()
        .select(&io, "b", &key(), &Selection::specific(LAST_YEAR))
        .await
        .unwrap();
    assert_eq!(outcome.resolved_version, LAST_YEAR);
    assert_eq!(outcome.selectable_artifacts[0].name, "artifact-0.bin");
}

#[tokio::test]
async fn test_select_specific_not_found() {
    let io = MemoryIo::new();
    seed(&io, "b", &[PRESENT]);

    let err = storage()
        .select(&io, "b", &key(), &Selection::specific(LAST_YEAR))
        .await
        .unwrap_err();
    match err {
        StorageError::VersionNotFound { version } => assert_eq!(version, LAST_YEAR),
        other => panic!("expected VersionNotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn test_select_specific_duplicate_is_ambiguous() {
    let io = MemoryIo::new();
    seed(&io, "b", &[LAST_YEAR, LAST_YEAR]);

    let err = storage()
        .select(&io, "b", &key(), &Selection::specific(LAST_YEAR))
        .await
        .unwrap_err();
    match err {
        StorageError::VersionAmbiguous { count, .. } => assert_eq!(count, 2),
        other => panic!("expected VersionAmbiguous, got {other:?}"),
    }
}

#[tokio::test]
async fn test_select_returns_what_insert_recorded() {
    let io = MemoryIo::new();
    let storage = storage();
    let inserted = storage.insert(&io, "/backups/x", &key(), &fruit_batch(), &[]).await.unwrap();

    let selected = storage.select(&io, "/backups/x", &key(), &Selection::Latest).await.unwrap();
    assert_eq!(selected.resolved_version, inserted.version.as_str());

    let selected_paths: Vec<_> = selected.selectable_artifacts.iter().map(|a| a.path.clone()).collect();
    let inserted_paths: Vec<_> = inserted
        .insertable_artifacts
        .iter()
        .map(|a| a.destination_path.clone())
        .collect();
    assert_eq!(selected_paths, inserted_paths);

    let by_version = storage
        .select(&io, "/backups/x", &key(), &Selection::specific(inserted.version.as_str()))
        .await
        .unwrap();
    assert_eq!(by_version, selected);
}

#[tokio::test]
async fn test_select_reports_missing_listing() {
    let io = MemoryIo::new();
    let storage = storage();
    let inserted = storage.insert(&io, "b", &key(), &fruit_batch(), &[]).await.unwrap();
    io.remove(&inserted.listing_path);

    let err = storage.select(&io, "b", &key(), &Selection::Latest).await.unwrap_err();
    match err {
        StorageError::ListingMissing { path } => assert_eq!(path, inserted.listing_path),
        other => panic!("expected ListingMissing, got {other:?}"),
    }
}

// =============================================================================
// Clean
// =============================================================================

#[tokio::test]
async fn test_clean_retains_most_recent() {
    let all = [VERY_LONG_AGO, PRESENT, LAST_YEAR];

    for max_versions in 0..=4 {
        let io = MemoryIo::new();
        seed(&io, "b", &all);

        let outcome = storage()
            .clean(&io, "b", &key(), &RetentionPolicy::keep_last_n(max_versions))
            .await
            .unwrap();

        let expected_kept = max_versions.min(all.len());
        assert_eq!(outcome.retained, expected_kept);
        assert_eq!(outcome.removable_items.len(), all.len() - expected_kept);

        let manifest = read_manifest(&io, "b");
        assert_eq!(manifest.len(), expected_kept);

        let kept: HashSet<String> = manifest.items.iter().map(|i| i.version.to_string()).collect();
        let removed: HashSet<String> = outcome.removable_items.iter().map(|i| i.version.to_string()).collect();
        assert!(kept.is_disjoint(&removed));
        let union: HashSet<String> = kept.union(&removed).cloned().collect();
        let expected: HashSet<String> = all.iter().map(|v| v.to_string()).collect();
        assert_eq!(union, expected);

        // Retained are the newest.
        let newest = [PRESENT, LAST_YEAR, VERY_LONG_AGO];
        for version in &newest[..expected_kept] {
            assert!(kept.contains(*version), "{} should be kept with max {}", version, max_versions);
        }
    }
}

#[tokio::test]
async fn test_clean_leaves_listings_in_place() {
    let io = MemoryIo::new();
    seed(&io, "b", &[LAST_YEAR, PRESENT]);
    let keys_before = io.keys();

    let outcome = storage()
        .clean(&io, "b", &key(), &RetentionPolicy::keep_last_n(1))
        .await
        .unwrap();

    assert_eq!(outcome.removable_items[0].version, LAST_YEAR);
    assert_eq!(io.keys(), keys_before);
    assert_eq!(outcome.removable_dirs("b"), vec![format!("b/{}", LAST_YEAR)]);
}

#[tokio::test]
async fn test_clean_empty_root_is_noop() {
    let io = MemoryIo::new();
    let outcome = storage()
        .clean(&io, "b", &key(), &RetentionPolicy::keep_last_n(0))
        .await
        .unwrap();

    assert!(outcome.removable_items.is_empty());
    assert!(io.keys().is_empty());
}

#[tokio::test]
async fn test_versions_most_recent_first() {
    let io = MemoryIo::new();
    seed(&io, "b", &[LAST_YEAR, VERY_LONG_AGO, PRESENT]);

    let items = storage().versions(&io, "b", &key()).await.unwrap();
    let versions: Vec<_> = items.iter().map(|i| i.version.to_string()).collect();
    assert_eq!(versions, vec![PRESENT, LAST_YEAR, VERY_LONG_AGO]);
}

// =============================================================================
// Errors
// =============================================================================

#[tokio::test]
async fn test_corrupted_manifest_is_typed_for_every_operation() {
    let io = MemoryIo::new();
    io.put("b/manifest.json", b"{\"items\": \"nope\"}".to_vec());
    let storage = storage();

    let insert = storage.insert(&io, "b", &key(), &fruit_batch(), &[]).await.unwrap_err();
    let select = storage.select(&io, "b", &key(), &Selection::Latest).await.unwrap_err();
    let clean = storage
        .clean(&io, "b", &key(), &RetentionPolicy::keep_last_n(1))
        .await
        .unwrap_err();

    for err in [insert, select, clean] {
        assert!(matches!(err, StorageError::ManifestCorrupted { .. }), "{err:?}");
    }
    // Nothing was written next to the corrupted manifest.
    assert_eq!(io.keys(), vec!["b/manifest.json".to_string()]);
}

#[tokio::test]
async fn test_corrupted_listing_is_typed() {
    let io = MemoryIo::new();
    let storage = storage();
    let inserted = storage.insert(&io, "b", &key(), &fruit_batch(), &[]).await.unwrap();
    io.put(inserted.listing_path.clone(), b"[1, 2, 3]".to_vec());

    let err = storage.select(&io, "b", &key(), &Selection::Latest).await.unwrap_err();
    match err {
        StorageError::ListingCorrupted { path, .. } => assert_eq!(path, inserted.listing_path),
        other => panic!("expected ListingCorrupted, got {other:?}"),
    }
}

#[tokio::test]
async fn test_io_errors_propagate_unchanged() {
    let io = MemoryIo::new();
    io.fail(IoOp::Write, "b/manifest.json", io::ErrorKind::PermissionDenied);

    let err = storage().insert(&io, "b", &key(), &fruit_batch(), &[]).await.unwrap_err();
    match err {
        StorageError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::PermissionDenied),
        other => panic!("expected Io, got {other:?}"),
    }

    let io = MemoryIo::new();
    io.fail(IoOp::Read, "b/manifest.json", io::ErrorKind::TimedOut);
    let err = storage().select(&io, "b", &key(), &Selection::Latest).await.unwrap_err();
    assert!(matches!(err, StorageError::Io(ref e) if e.kind() == io::ErrorKind::TimedOut));
}

#[tokio::test]
async fn test_lock_released_after_failure() {
    let io = MemoryIo::new();
    io.fail_times(IoOp::Write, "b/manifest.json", io::ErrorKind::Other, 1);
    let storage = storage();

    assert!(storage.insert(&io, "b", &key(), &[], &[]).await.is_err());

    let retried = tokio::time::timeout(
        Duration::from_secs(5),
        storage.insert(&io, "b", &key(), &[], &[]),
    )
    .await
    .expect("lock should have been released");
    assert!(retried.is_ok());
    assert_eq!(read_manifest(&io, "b").len(), 1);
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_inserts_are_serialized() {
    const WRITERS: usize = 12;

    let io = Arc::new(MemoryIo::new());
    let storage = Arc::new(storage());

    let mut tasks = Vec::new();
    for i in 0..WRITERS {
        let io = Arc::clone(&io);
        let storage = Arc::clone(&storage);
        tasks.push(tokio::spawn(async move {
            let batch = vec![ArtifactInput::new(format!("file-{}.bin", i), "/src", i as u64)];
            storage.insert(io.as_ref(), "shared", &key(), &batch, &[]).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let manifest = read_manifest(&io, "shared");
    assert_eq!(manifest.len(), WRITERS);
    let distinct: HashSet<_> = manifest.items.iter().map(|i| i.version.to_string()).collect();
    assert_eq!(distinct.len(), WRITERS);
    assert_eq!(manifest.total_size(), (0..WRITERS as u64).sum::<u64>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_select_and_clean_interleave_with_inserts() {
    let io = Arc::new(MemoryIo::new());
    let storage = Arc::new(storage());
    storage.insert(io.as_ref(), "r", &key(), &fruit_batch(), &[]).await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..8 {
        let io = Arc::clone(&io);
        let storage = Arc::clone(&storage);
        tasks.push(tokio::spawn(async move {
            if i % 2 == 0 {
                storage.insert(io.as_ref(), "r", &key(), &fruit_batch(), &[]).await.map(|_| ())
            } else {
                storage
                    .clean(io.as_ref(), "r", &key(), &RetentionPolicy::keep_last_n(3))
                    .await
                    .map(|_| ())
            }
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    // Every manifest write was a complete read-modify-write.
    let manifest = read_manifest(&io, "r");
    assert!(manifest.len() <= 5, "{} items", manifest.len());
    let latest = storage.select(io.as_ref(), "r", &key(), &Selection::Latest).await.unwrap();
    assert_eq!(latest.selectable_artifacts.len(), 3);
}

#[tokio::test]
async fn test_blob_io_is_object_safe() {
    let io: Arc<dyn BlobIo> = Arc::new(MemoryIo::new());
    let outcome = storage().insert(io.as_ref(), "dyn", &key(), &[], &[]).await.unwrap();
    assert!(io.read(&outcome.listing_path).await.unwrap().is_some());
}
