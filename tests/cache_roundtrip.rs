// tests/cache_roundtrip.rs

mod common;

use std::path::PathBuf;

use proptest::prelude::*;
use taskle::cache::{FileStat, StatStore};
use taskle::errors::CacheError;

fn stat_strategy() -> impl Strategy<Value = FileStat> {
    (any::<i64>(), any::<u64>()).prop_map(|(mtime_ns, size)| FileStat { mtime_ns, size })
}

fn path_strategy() -> impl Strategy<Value = PathBuf> {
    proptest::collection::vec("[a-z][a-z0-9_.]{0,11}", 1..4)
        .prop_map(|parts| parts.into_iter().collect())
}

fn store_strategy() -> impl Strategy<Value = StatStore> {
    proptest::collection::btree_map(path_strategy(), stat_strategy(), 0..32).prop_map(|map| {
        let mut store = StatStore::new();
        for (path, stat) in map {
            store.put(path, stat);
        }
        store
    })
}

proptest! {
    #[test]
    fn snapshot_roundtrips(store in store_strategy()) {
        let decoded = StatStore::decode(&store.snapshot()).unwrap();
        prop_assert_eq!(decoded, store);
    }

    #[test]
    fn truncated_snapshots_are_rejected(store in store_strategy(), cut in 0usize..64) {
        let bytes = store.snapshot();
        // Anything shorter than the full serialization must not decode to
        // the same store silently.
        if cut > 0 && cut <= bytes.len() && !store.is_empty() {
            let truncated = &bytes[..bytes.len() - cut];
            match StatStore::decode(truncated) {
                Ok(decoded) => prop_assert_ne!(decoded, store),
                Err(_) => {}
            }
        }
    }
}

#[test]
fn header_is_validated() {
    let store = StatStore::new();
    let mut bytes = store.snapshot();
    bytes[0] = b'X';
    assert!(matches!(
        StatStore::decode(&bytes),
        Err(CacheError::BadMagic)
    ));

    let mut bytes = store.snapshot();
    bytes[4] = 0xFF;
    assert!(matches!(
        StatStore::decode(&bytes),
        Err(CacheError::UnsupportedVersion(_))
    ));

    assert!(matches!(
        StatStore::decode(&bytes[..3]),
        Err(CacheError::Truncated)
    ));
}

#[test]
fn persist_and_reload() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("taskle.cache");

    let mut store = StatStore::new();
    store.put(
        "/proj/main.c",
        FileStat {
            mtime_ns: 1_700_000_000_000_000_000,
            size: 1234,
        },
    );
    store.put(
        "/proj/out/main.o",
        FileStat {
            mtime_ns: -42,
            size: 0,
        },
    );
    store.persist(&cache_path).unwrap();

    let loaded = StatStore::try_load(&cache_path).unwrap();
    assert_eq!(loaded, store);
}

#[test]
fn missing_cache_loads_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = StatStore::load(&dir.path().join("absent.cache"));
    assert!(store.is_empty());
}

#[test]
fn corrupt_cache_loads_empty() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("taskle.cache");
    std::fs::write(&cache_path, b"not a cache at all").unwrap();

    let store = StatStore::load(&cache_path);
    assert!(store.is_empty());
}

#[test]
fn forget_removes_entries() {
    let mut store = StatStore::new();
    store.put("/proj/a", FileStat { mtime_ns: 1, size: 2 });
    store.forget("/proj/a".as_ref());
    assert!(store.get("/proj/a".as_ref()).is_none());
    assert!(store.is_empty());
}
