//! Behavioural tests for MemoryBackend through the Backend trait
//!
//! These tests exercise the store the way the data-access layer uses it:
//! - Concurrent consumers on one list never receive the same element twice
//! - Atomic batches keep index and records in step
//! - Expiry driven by a manual clock
//! - Pattern scans

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use canvass_core::{ManualClock, Timestamp};
use canvass_storage::{Backend, BackendError, MemoryBackend, WriteOp};
use proptest::prelude::*;

// ============================================================================
// Helper Functions
// ============================================================================

fn connected() -> Arc<MemoryBackend> {
    let backend = Arc::new(MemoryBackend::new());
    backend.connect().unwrap();
    backend
}

fn as_dyn(backend: &Arc<MemoryBackend>) -> Arc<dyn Backend> {
    backend.clone()
}

// ============================================================================
// Concurrency
// ============================================================================

mod concurrency {
    use super::*;

    #[test]
    fn test_concurrent_pops_deliver_each_element_once() {
        let backend = connected();
        for i in 0..1000 {
            backend.rpush("queue:jobs", format!("job-{i}")).unwrap();
        }

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = as_dyn(&backend);
                thread::spawn(move || {
                    let mut seen = Vec::new();
                    while let Some(job) = store.lpop("queue:jobs").unwrap() {
                        seen.push(job);
                    }
                    seen
                })
            })
            .collect();

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.join().unwrap());
        }
        let unique: HashSet<_> = all.iter().cloned().collect();
        assert_eq!(all.len(), 1000);
        assert_eq!(unique.len(), 1000);
        assert_eq!(backend.llen("queue:jobs").unwrap(), 0);
    }

    #[test]
    fn test_concurrent_pushes_are_all_kept() {
        let backend = connected();
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = as_dyn(&backend);
                thread::spawn(move || {
                    for i in 0..250 {
                        store.rpush("history", format!("{t}-{i}")).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(backend.llen("history").unwrap(), 1000);
    }

    #[test]
    fn test_index_never_runs_ahead_of_records() {
        let backend = connected();
        let writer = {
            let store = as_dyn(&backend);
            thread::spawn(move || {
                for i in 0..500 {
                    let id = format!("v{i}");
                    store
                        .exec_atomic(vec![
                            WriteOp::HSet {
                                key: "volunteers".into(),
                                field: id.clone(),
                                value: "{}".into(),
                            },
                            WriteOp::SAdd {
                                key: "territory:t1:volunteers".into(),
                                member: id,
                            },
                        ])
                        .unwrap();
                }
            })
        };

        let reader = {
            let store = as_dyn(&backend);
            thread::spawn(move || {
                for _ in 0..500 {
                    // Both only grow and the set is read first
                    let in_set = store.scard("territory:t1:volunteers").unwrap();
                    let in_hash = store.hlen("volunteers").unwrap();
                    assert!(in_hash >= in_set);
                }
            })
        };

        writer.join().unwrap();
        reader.join().unwrap();
        assert_eq!(backend.hlen("volunteers").unwrap(), 500);
        assert_eq!(backend.scard("territory:t1:volunteers").unwrap(), 500);
    }
}

// ============================================================================
// Batches
// ============================================================================

mod batches {
    use super::*;

    #[test]
    fn test_invalid_geo_point_rejects_whole_batch() {
        let backend = connected();
        let result = backend.exec_atomic(vec![
            WriteOp::HSet {
                key: "t1".into(),
                field: "name".into(),
                value: "\"North\"".into(),
            },
            WriteOp::GeoAdd {
                key: "territories".into(),
                longitude: 0.0,
                latitude: 89.0,
                member: "t1".into(),
            },
        ]);
        assert!(matches!(result, Err(BackendError::InvalidArgument(_))));
        assert!(!backend.exists("t1").unwrap());
        assert!(!backend.exists("territories").unwrap());
    }

    #[test]
    fn test_batch_with_expiry() {
        let clock = Arc::new(ManualClock::new(Timestamp::from_millis(0)));
        let backend = MemoryBackend::with_clock(clock.clone());
        backend.connect().unwrap();

        backend
            .exec_atomic(vec![
                WriteOp::Set {
                    key: "kpi:auth:login:100".into(),
                    value: "{}".into(),
                    ttl: Some(Duration::from_secs(60)),
                },
                WriteOp::ZAdd {
                    key: "kpi_index:auth:login".into(),
                    score: 100.0,
                    member: "kpi:auth:login:100".into(),
                },
                WriteOp::Expire {
                    key: "kpi_index:auth:login".into(),
                    ttl: Duration::from_secs(60),
                },
            ])
            .unwrap();
        assert_eq!(backend.zcard("kpi_index:auth:login").unwrap(), 1);

        clock.advance(Duration::from_secs(60));
        assert!(!backend.exists("kpi:auth:login:100").unwrap());
        assert!(!backend.exists("kpi_index:auth:login").unwrap());
    }

    #[test]
    fn test_batch_fails_fast_when_disconnected() {
        let backend = connected();
        backend.set_available(false);
        let result = backend.exec_atomic(vec![WriteOp::Del { key: "x".into() }]);
        assert!(matches!(result, Err(BackendError::ConnectionLost(_))));
    }
}

// ============================================================================
// Expiry
// ============================================================================

mod expiry {
    use super::*;

    #[test]
    fn test_expire_on_collection() {
        let clock = Arc::new(ManualClock::new(Timestamp::from_millis(5_000)));
        let backend = MemoryBackend::with_clock(clock.clone());
        backend.connect().unwrap();

        backend.rpush("l", "a".into()).unwrap();
        assert!(backend.expire("l", Duration::from_millis(500)).unwrap());
        assert!(!backend.expire("missing", Duration::from_millis(500)).unwrap());

        clock.advance(Duration::from_millis(499));
        assert_eq!(backend.llen("l").unwrap(), 1);
        clock.advance(Duration::from_millis(1));
        assert_eq!(backend.llen("l").unwrap(), 0);
    }

    #[test]
    fn test_write_after_expiry_starts_fresh() {
        let clock = Arc::new(ManualClock::new(Timestamp::from_millis(5_000)));
        let backend = MemoryBackend::with_clock(clock.clone());
        backend.connect().unwrap();

        backend.set("k", "old".into(), Some(Duration::from_secs(1))).unwrap();
        clock.advance(Duration::from_secs(2));
        // An expired scalar does not block a list write on the same key
        assert_eq!(backend.rpush("k", "x".into()).unwrap(), 1);
        assert_eq!(backend.ttl("k").unwrap(), None);
    }
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_list_matches_model(ops in prop::collection::vec((any::<bool>(), 0u8..10), 0..64)) {
        let backend = connected();
        let mut model = std::collections::VecDeque::new();
        for (push, value) in ops {
            if push {
                backend.rpush("l", value.to_string()).unwrap();
                model.push_back(value.to_string());
            } else {
                let popped = backend.lpop("l").unwrap();
                prop_assert_eq!(popped, model.pop_front());
            }
        }
        let stored = backend.lrange("l", 0, -1).unwrap();
        prop_assert_eq!(stored, model.into_iter().collect::<Vec<_>>());
    }

    #[test]
    fn prop_zrange_is_sorted(scores in prop::collection::vec(-1.0e6f64..1.0e6, 1..50)) {
        let backend = connected();
        for (i, score) in scores.iter().enumerate() {
            backend.zadd("z", *score, &format!("m{i}")).unwrap();
        }
        let hits = backend.zrange_by_score("z", f64::MIN, f64::MAX).unwrap();
        prop_assert_eq!(hits.len(), scores.len());
        for pair in hits.windows(2) {
            prop_assert!(pair[0].1 <= pair[1].1);
        }
    }
}
