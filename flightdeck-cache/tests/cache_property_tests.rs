use flightdeck_cache::{optimistic, query_fn, query_key, CacheConfig, KeyPart, QueryKey, QueryCache};
use flightdeck_core::ApiError;
use proptest::prelude::*;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn arb_key() -> impl Strategy<Value = QueryKey> {
    (
        prop_oneof![Just("alerts"), Just("alerts-stats"), Just("analyses")],
        proptest::option::of((0u32..500, 1u32..100)),
    )
        .prop_map(|(root, page)| match page {
            Some((skip, limit)) => query_key![root, skip, limit],
            None => query_key![root],
        })
}

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .unwrap()
}

proptest! {
    #[test]
    fn prefix_matches_only_whole_parts(key in arb_key()) {
        let root = key.parts()[0].clone();
        let prefix = QueryKey::new(vec![root.clone()]);
        prop_assert!(key.starts_with(&prefix));
        prop_assert!(key.starts_with(&QueryKey::default()));
        if root == KeyPart::from("alerts") {
            prop_assert!(!query_key!["alerts-stats"].starts_with(&prefix));
        }
    }

    #[test]
    fn invalidate_marks_exactly_the_prefix_family(keys in proptest::collection::hash_set(arb_key(), 1..12)) {
        let rt = paused_runtime();
        rt.block_on(async {
            let cache = QueryCache::with_defaults();
            for key in &keys {
                cache.write(key, |_| json!([]));
            }
            let marked = cache.invalidate(&query_key!["alerts"]);
            let expected = keys
                .iter()
                .filter(|key| key.starts_with(&query_key!["alerts"]))
                .count();
            assert_eq!(marked, expected);
            for key in &keys {
                let entry = cache.read(key).unwrap();
                assert_eq!(entry.is_invalidated, key.starts_with(&query_key!["alerts"]));
            }
        });
    }

    #[test]
    fn revert_restores_exact_values(values in proptest::collection::vec(any::<i64>(), 1..6)) {
        let rt = paused_runtime();
        rt.block_on(async {
            let cache = QueryCache::with_defaults();
            for (page, value) in values.iter().enumerate() {
                cache.write(&query_key!["alerts", page, 50], |_| json!({ "n": value }));
            }
            let before: Vec<Option<Value>> = cache
                .snapshot(&query_key!["alerts"])
                .into_iter()
                .map(|entry| entry.data)
                .collect();

            let token = optimistic::apply(&cache, &query_key!["alerts"], |_| json!("changed"));
            assert_eq!(token.keys().count(), values.len());
            token.revert(&cache);

            let after: Vec<Option<Value>> = cache
                .snapshot(&query_key!["alerts"])
                .into_iter()
                .map(|entry| entry.data)
                .collect();
            assert_eq!(before, after);
        });
    }
}

#[tokio::test(start_paused = true)]
async fn superseded_response_is_discarded() {
    let cache = QueryCache::new(CacheConfig::new().with_stale_time(Duration::from_secs(30)));
    let key = query_key!["alerts", 0, 50];
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let load = query_fn(move || {
        let call = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, ApiError>(json!({ "call": call }))
        }
    });
    let _observer = cache.observe(&key, Some(Arc::clone(&load)));

    let (result, _) = tokio::join!(cache.fetch(&key, load), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.invalidate(&query_key!["alerts"])
    });

    // The first caller follows the refetch started by the invalidation.
    assert_eq!(result.unwrap(), json!({ "call": 1 }));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(cache.read(&key).unwrap().data, Some(json!({ "call": 1 })));
    assert!(!cache.read(&key).unwrap().is_invalidated);
}

#[tokio::test(start_paused = true)]
async fn unobserved_entries_expire_after_gc_time() {
    let cache = QueryCache::with_defaults();
    let key = query_key!["analyses", 0, 20];
    let guard = cache.observe(&key, None);
    cache.write(&key, |_| json!([]));
    drop(guard);

    tokio::time::sleep(Duration::from_secs(299)).await;
    assert_eq!(cache.collect_garbage(), 0);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(cache.collect_garbage(), 1);
    assert!(cache.read(&key).is_none());
}
