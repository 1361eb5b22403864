//! Cross-primitive behaviour over a shared in-memory store
//!
//! Covers:
//! - document round trips for arbitrary JSON
//! - corruption surfaced as an error, never as absence
//! - index staleness and its repair
//! - queue delivery under concurrent consumers
//! - pagination bounds

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use canvass_core::keys::{history_key, scope_key};
use canvass_core::{DistanceUnit, Error, ManualClock, Timestamp};
use canvass_engine::{StoreConfig, StoreHandle};
use canvass_primitives::collections::Volunteers;
use canvass_primitives::{
    filter_and_paginate, paginate, EntityRepository, Filter, GeoIndex, IndexMaintainer, JobQueue,
    KpiRecorder, Pagination, TypedRepository,
};
use canvass_storage::{Backend, MemoryBackend};
use proptest::prelude::*;
use serde_json::{json, Value};

// ============================================================================
// Test Helpers
// ============================================================================

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn setup() -> (StoreHandle, Arc<MemoryBackend>) {
    init_tracing();
    let clock = Arc::new(ManualClock::new(Timestamp::from_millis(1_700_000_000_000)));
    StoreHandle::ephemeral_with(StoreConfig::default(), clock).unwrap()
}

fn arb_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        "[a-zA-Z0-9 :_-]{0,12}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

// ============================================================================
// Documents
// ============================================================================

mod documents {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_set_then_get_round_trips(doc in arb_json(), id in "[a-z0-9]{1,8}") {
            let (store, _) = setup();
            let repo = EntityRepository::new(store);
            repo.set_entity("events", &id, &doc).unwrap();
            let back: Option<Value> = repo.get_entity("events", &id).unwrap();
            prop_assert_eq!(back, Some(doc));
        }
    }

    #[test]
    fn test_corrupt_document_is_an_error_not_absence() {
        let (store, backend) = setup();
        backend.hset("users", "u1", "{not json".to_string()).unwrap();
        let repo = EntityRepository::new(store);

        let err = repo.get_entity::<Value>("users", "u1").unwrap_err();
        assert!(err.is_corruption());
        assert_eq!(err.http_status(), 500);

        let all = repo.get_all_entities::<Value>("users");
        assert!(matches!(all, Err(Error::Corruption { .. })));
    }

    #[test]
    fn test_collection_key_holding_another_structure() {
        let (store, backend) = setup();
        backend.set("alerts", "scalar".to_string(), None).unwrap();
        let repo = EntityRepository::new(store);
        let err = repo.set_entity("alerts", "a1", &json!({})).unwrap_err();
        assert!(matches!(err, Error::WrongType { .. }));
    }

    #[test]
    fn test_typed_collection_uses_fixed_name() {
        let (store, backend) = setup();
        let volunteers: TypedRepository<Volunteers> = TypedRepository::new(store);
        volunteers.put("v1", &json!({"name": "Ana", "status": "active"})).unwrap();
        assert!(backend.hexists("volunteers", "v1").unwrap());
        assert_eq!(
            volunteers.find_by_field("status", "active").unwrap(),
            Some(json!({"name": "Ana", "status": "active"}))
        );
    }
}

// ============================================================================
// Index staleness and repair
// ============================================================================

mod index {
    use super::*;

    #[test]
    fn test_delete_leaves_member_until_pruned() {
        let (store, _) = setup();
        let repo = EntityRepository::new(store.clone());
        let index = IndexMaintainer::new(store);
        let scope = scope_key("territory", "t1", "volunteers");

        repo.set_entity("volunteers", "v1", &json!({"name": "Ana"})).unwrap();
        repo.set_entity("volunteers", "v2", &json!({"name": "Luis"})).unwrap();
        index.add_to_scope(&scope, "v1").unwrap();
        index.add_to_scope(&scope, "v2").unwrap();

        repo.delete_entity("volunteers", "v1").unwrap();
        assert!(index.is_in_scope(&scope, "v1").unwrap());

        let resolved = index.resolve_scope::<Value>(&scope, "volunteers").unwrap();
        assert_eq!(resolved.stale, vec!["v1".to_string()]);
        assert_eq!(resolved.documents.len(), 1);
        assert_eq!(resolved.documents[0].0, "v2");

        assert_eq!(index.prune_scope(&scope, "volunteers").unwrap(), vec!["v1".to_string()]);
        assert_eq!(index.scope_members(&scope).unwrap(), vec!["v2".to_string()]);
    }

    #[test]
    fn test_atomic_pairing_survives_outage() {
        let (store, backend) = setup();
        let index = IndexMaintainer::new(store.clone());
        let scope = scope_key("territory", "t1", "events");

        backend.set_available(false);
        let err = index
            .put_with_scope("events", "e1", &json!({"title": "Rally"}), &scope)
            .unwrap_err();
        assert!(err.is_retryable());

        // Neither half was applied
        backend.set_available(true);
        backend.connect().unwrap();
        assert!(!backend.sismember(&scope, "e1").unwrap());
        assert!(!backend.hexists("events", "e1").unwrap());
    }

    #[test]
    fn test_history_is_capped_newest_first() {
        init_tracing();
        let mut config = StoreConfig::default();
        config.history.max_len = 3;
        let (store, _) =
            StoreHandle::ephemeral_with(config, Arc::new(canvass_core::SystemClock)).unwrap();
        let index = IndexMaintainer::new(store);
        let key = history_key("voter", "v9", "contacts");

        for i in 0..5 {
            index.append_to_history(&key, &json!({ "n": i })).unwrap();
        }
        assert_eq!(index.history_len(&key).unwrap(), 3);
        let records: Vec<Value> = index.history(&key, 0, 10).unwrap();
        assert_eq!(records, vec![json!({"n": 4}), json!({"n": 3}), json!({"n": 2})]);
    }
}

// ============================================================================
// Queue
// ============================================================================

mod queue {
    use super::*;

    #[test]
    fn test_concurrent_consumers_see_each_job_once() {
        let (store, _) = setup();
        let queue = JobQueue::new(store);
        for i in 0..200 {
            queue.enqueue("events", json!({ "n": i })).unwrap();
        }

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let queue = queue.clone();
                thread::spawn(move || {
                    let mut ids = Vec::new();
                    while let Some(job) = queue.dequeue::<Value>("events").unwrap() {
                        ids.push(job.id);
                    }
                    ids
                })
            })
            .collect();

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.join().unwrap());
        }
        let unique: HashSet<_> = all.iter().collect();
        assert_eq!(all.len(), 200);
        assert_eq!(unique.len(), 200);
    }

    #[test]
    fn test_claim_ack_and_requeue() {
        let (store, _) = setup();
        let queue = JobQueue::new(store);
        let a = queue.enqueue("jobs", json!("A")).unwrap();
        let b = queue.enqueue("jobs", json!("B")).unwrap();

        let first = queue.claim::<Value>("jobs").unwrap().unwrap();
        let second = queue.claim::<Value>("jobs").unwrap().unwrap();
        assert_eq!(first.id, a.id);
        assert_eq!(second.id, b.id);
        assert_eq!(queue.length("jobs").unwrap(), 0);
        assert_eq!(queue.processing_length("jobs").unwrap(), 2);

        assert!(queue.ack("jobs", &a.id).unwrap());
        assert!(!queue.ack("jobs", &a.id).unwrap());

        // A consumer died holding B
        assert_eq!(queue.requeue_unacked("jobs").unwrap(), 1);
        let again = queue.dequeue::<Value>("jobs").unwrap().unwrap();
        assert_eq!(again.id, b.id);
        assert_eq!(again.payload, json!("B"));
    }

    #[test]
    fn test_dequeue_while_unavailable_fails_fast() {
        let (store, backend) = setup();
        let queue = JobQueue::new(store);
        queue.enqueue("events", json!(1)).unwrap();

        backend.set_available(false);
        assert!(queue.dequeue::<Value>("events").unwrap_err().is_retryable());
        backend.set_available(true);
        backend.connect().unwrap();
        assert_eq!(backend.llen("queue:events").unwrap(), 1);
    }
}

// ============================================================================
// Geo
// ============================================================================

mod geo {
    use super::*;

    /// Arc length along a meridian, in kilometers
    fn meridian_km(degrees: f64) -> f64 {
        6_372.797_560_856 * degrees.to_radians()
    }

    #[test]
    fn test_radius_between_second_and_third_point() {
        let (store, _) = setup();
        let geo = GeoIndex::new(store);
        let offsets = [("near", 0.01), ("mid", 0.02), ("far", 0.05)];
        for (key, lat) in offsets {
            geo.index_location(key, 0.0, lat, &json!({ "name": key })).unwrap();
        }

        // 2.22 km < 3 km < 5.56 km
        let radius = 3.0;
        assert!(meridian_km(0.02) < radius && radius < meridian_km(0.05));

        let mut matches = geo.query_radius(0.0, 0.0, radius, DistanceUnit::Kilometers).unwrap();
        matches.sort_by(|a, b| a.key.cmp(&b.key));
        let keys: Vec<&str> = matches.iter().map(|m| m.key.as_str()).collect();
        assert_eq!(keys, vec!["mid", "near"]);

        for m in &matches {
            let lat = offsets.iter().find(|(k, _)| *k == m.key).unwrap().1;
            let expected = meridian_km(lat);
            assert!(
                (m.distance - expected).abs() < 1e-6,
                "{}: {} vs {}",
                m.key,
                m.distance,
                expected
            );
            assert_eq!(m.payload, Some(json!({ "name": m.key })));
        }
    }
}

// ============================================================================
// Metrics
// ============================================================================

mod metrics {
    use super::*;

    #[test]
    fn test_sweeper_evicts_metric_records() {
        init_tracing();
        let clock = Arc::new(ManualClock::new(Timestamp::from_millis(1_700_000_000_000)));
        let mut config = StoreConfig::default();
        config.sweeper.interval_ms = 10;
        let (store, backend) = StoreHandle::ephemeral_with(config, clock.clone()).unwrap();
        let kpi = KpiRecorder::new(store.clone());

        let record = kpi.record_metric("messages", "sent", &json!({"count": 1})).unwrap();
        assert_eq!(backend.raw_key_count(), 2);

        let sweeper = store.sweeper(backend.clone());
        let worker = sweeper.start();
        clock.advance(Duration::from_secs(31 * 86_400));

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while backend.raw_key_count() > 0 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        sweeper.shutdown();
        worker.join().unwrap();

        assert_eq!(backend.raw_key_count(), 0);
        assert!(!backend.exists(&record.key).unwrap());
    }
}

// ============================================================================
// Pagination
// ============================================================================

mod pagination {
    use super::*;

    proptest! {
        #[test]
        fn prop_page_stays_in_bounds(len in 0usize..60, offset in 0usize..80, limit in 0usize..30) {
            let items: Vec<usize> = (0..len).collect();
            let page = paginate(items, Pagination::new(offset, limit));
            prop_assert_eq!(page.total, len);
            prop_assert!(page.items.len() <= limit);
            if offset >= len || limit == 0 {
                prop_assert!(page.items.is_empty());
            } else {
                prop_assert_eq!(page.items[0], offset);
                prop_assert_eq!(page.items.len(), limit.min(len - offset));
            }
        }
    }

    #[test]
    fn test_filtered_collection_page() {
        let (store, _) = setup();
        let repo = EntityRepository::new(store);
        for i in 0..12 {
            let status = if i % 3 == 0 { "done" } else { "scheduled" };
            repo.set_entity("events", &format!("e{i:02}"), &json!({ "status": status, "n": i }))
                .unwrap();
        }

        let mut all = repo.get_all_with_ids::<Value>("events").unwrap();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        let filter = Filter::new().status("scheduled");

        let page = filter_and_paginate(all.clone(), &filter, Pagination::new(5, 5));
        assert_eq!(page.total, 8);
        assert_eq!(page.items.len(), 3);
        assert!(!page.has_more());

        let empty = filter_and_paginate(all, &filter, Pagination::new(8, 5));
        assert!(empty.items.is_empty());
        assert_eq!(empty.total, 8);
    }
}
