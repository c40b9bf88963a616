//! Unit tests for the validator cache
//!
//! These tests verify that the cache:
//! - Evicts in insertion order once past capacity
//! - Never stores failed constructions
//! - Stays consistent under concurrent access
use std::sync::Arc;

use validate_markup::{DEFAULT_CAPACITY, SchemaKind, Validator, ValidatorCache, ValidatorHandle};

use crate::common::mocks::fixed_validator;

fn handle() -> ValidatorHandle {
    fixed_validator(SchemaKind::RelaxNg, Ok(()))
}

#[test]
fn test_default_capacity_is_ten() {
    let cache = ValidatorCache::default();
    assert_eq!(cache.capacity(), DEFAULT_CAPACITY);
    assert_eq!(cache.capacity(), 10);
    assert!(cache.is_empty());
}

#[test]
fn test_zero_capacity_holds_one() {
    let cache = ValidatorCache::new(0);
    cache.insert("rng:a", handle());
    cache.insert("rng:b", handle());
    assert_eq!(cache.keys(), vec!["rng:b".to_string()]);
}

#[test]
fn test_eleventh_key_evicts_first_inserted() {
    let cache = ValidatorCache::default();
    for i in 0..10 {
        cache.insert(&format!("xsd:{}", i), handle());
    }

    // Reads do not refresh a key's position
    for _ in 0..5 {
        assert!(cache.get("xsd:0").is_some());
    }

    cache.insert("xsd:10", handle());
    assert_eq!(cache.len(), 10);
    assert!(!cache.contains_key("xsd:0"));
    assert!(cache.contains_key("xsd:1"));
    assert!(cache.contains_key("xsd:10"));
    assert_eq!(cache.stats().evictions, 1);
}

#[tokio::test]
async fn test_get_or_create_reuses_handle() {
    let cache = ValidatorCache::default();

    let first = cache
        .get_or_create("sch:rules", || async { Ok::<_, String>(handle()) })
        .await
        .unwrap();
    let second = cache
        .get_or_create("sch:rules", || async {
            Err::<ValidatorHandle, _>("constructor must not run".to_string())
        })
        .await
        .unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hit_rate(), 0.5);
}

#[tokio::test]
async fn test_failures_are_not_cached() {
    let cache = ValidatorCache::default();

    let result = cache
        .get_or_create("rng:broken", || async {
            Err::<ValidatorHandle, _>("schema does not compile")
        })
        .await;
    assert!(result.is_err());
    assert!(!cache.contains_key("rng:broken"));

    let retried = cache
        .get_or_create("rng:broken", || async { Ok::<_, &str>(handle()) })
        .await;
    assert!(retried.is_ok());
    assert!(cache.contains_key("rng:broken"));
}

#[test]
fn test_get_or_create_outside_runtime() {
    let cache = ValidatorCache::default();
    let created = tokio_test::block_on(
        cache.get_or_create("rng:book", || async { Ok::<_, String>(handle()) }),
    )
    .unwrap();

    assert_eq!(created.kind(), SchemaKind::RelaxNg);
    assert_eq!(cache.keys(), vec!["rng:book".to_string()]);
}

#[test]
fn test_clear_empties_cache() {
    let cache = ValidatorCache::default();
    cache.insert("dtd:a", handle());
    cache.insert("dtd:b", handle());

    cache.clear();
    assert!(cache.is_empty());

    // Clearing an empty cache is harmless
    cache.clear();
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_concurrent_distinct_keys() {
    let cache = Arc::new(ValidatorCache::new(64));

    let tasks: Vec<_> = (0..32)
        .map(|i| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                cache
                    .get_or_create(&format!("xsd:{}", i), || async { Ok::<_, String>(handle()) })
                    .await
                    .unwrap();
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(cache.len(), 32);
}
