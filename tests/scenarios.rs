//! End-to-end scenarios through the `Canvass` handle
//!
//! Each test walks one campaign flow across the facades the way the HTTP
//! layer drives them.

use std::sync::Arc;
use std::time::Duration;

use canvass::keys::scope_key;
use canvass::{
    Canvass, DistanceUnit, Error, Filter, ManualClock, MemoryBackend, Pagination, SortOrder,
    StoreConfig, StoreHandle, Timestamp,
};
use serde_json::{json, Value};

// ============================================================================
// Test Helpers
// ============================================================================

const T0: u64 = 1_700_000_000_000;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn with_manual_clock() -> (Canvass, Arc<ManualClock>, Arc<MemoryBackend>) {
    init_tracing();
    let clock = Arc::new(ManualClock::new(Timestamp::from_millis(T0)));
    let (store, backend) = StoreHandle::ephemeral_with(StoreConfig::default(), clock.clone()).unwrap();
    (Canvass::from_handle(store), clock, backend)
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_territory_proximity() {
    let (db, _, _) = with_manual_clock();
    db.geo
        .index_location("t1", -74.07, 4.71, &json!({"name": "Centro"}))
        .unwrap();
    db.geo
        .index_location("t2", -74.11, 4.69, &json!({"name": "Kennedy"}))
        .unwrap();

    // t2 is 4.961 km from the center by haversine
    let within_five = db.geo.query_radius(-74.07, 4.71, 5.0, DistanceUnit::Kilometers).unwrap();
    let within_four = db.geo.query_radius(-74.07, 4.71, 4.0, DistanceUnit::Kilometers).unwrap();
    assert_eq!(within_four.len(), 1);
    assert_eq!(within_four[0].key, "t1");
    assert!(within_four[0].distance.abs() < 1e-9);
    assert_eq!(within_four[0].payload, Some(json!({"name": "Centro"})));

    let sorted = db
        .geo
        .radius(-74.07, 4.71, 10.0, DistanceUnit::Kilometers)
        .sort(SortOrder::Ascending)
        .run()
        .unwrap();
    let keys: Vec<&str> = sorted.iter().map(|m| m.key.as_str()).collect();
    assert_eq!(keys, vec!["t1", "t2"]);
    let kennedy = sorted[1].distance;
    assert!((kennedy - 4.9608).abs() < 1e-3, "distance {kennedy}");
    assert_eq!(within_five.len(), 2);
}

#[test]
fn test_event_queue_fifo() {
    let (db, _, _) = with_manual_clock();
    db.queue
        .enqueue("events", json!({"type": "created", "id": "e1"}))
        .unwrap();
    db.queue
        .enqueue("events", json!({"type": "created", "id": "e2"}))
        .unwrap();

    let first = db.queue.dequeue::<Value>("events").unwrap().unwrap();
    assert_eq!(first.payload["id"], "e1");
    assert_eq!(first.timestamp, "2023-11-14T22:13:20.000Z");
    assert!(first.id.starts_with(&format!("job-{T0}-")));

    let second = db.queue.dequeue::<Value>("events").unwrap().unwrap();
    assert_eq!(second.payload["id"], "e2");
    assert!(db.queue.dequeue::<Value>("events").unwrap().is_none());
}

#[test]
fn test_login_metric_retention() {
    let (db, clock, _) = with_manual_clock();
    db.kpi
        .record_metric("auth", "login", &json!({"userId": "u1"}))
        .unwrap();

    let hits = db.kpi.query_range("auth", "login", T0 - 1000, T0 + 1000).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].data, json!({"userId": "u1"}));

    clock.advance(Duration::from_secs(30 * 86_400));
    assert!(db
        .kpi
        .query_range("auth", "login", T0 - 1000, T0 + 1000)
        .unwrap()
        .is_empty());
    assert!(db
        .kpi
        .query_range_by_scan("auth", "login", T0 - 1000, T0 + 1000)
        .unwrap()
        .is_empty());
}

#[test]
fn test_deleted_volunteer_stays_in_scope() {
    let (db, _, _) = with_manual_clock();
    let scope = scope_key("territory", "t1", "volunteers");

    db.entities
        .set_entity("volunteers", "v1", &json!({"name": "Ana"}))
        .unwrap();
    db.index.add_to_scope(&scope, "v1").unwrap();
    db.entities.delete_entity("volunteers", "v1").unwrap();

    assert!(db.entities.get_entity::<Value>("volunteers", "v1").unwrap().is_none());
    assert!(matches!(
        db.entities.require_entity::<Value>("volunteers", "v1"),
        Err(Error::NotFound { .. })
    ));
    assert_eq!(db.index.scope_members(&scope).unwrap(), vec!["v1".to_string()]);
}

#[test]
fn test_session_refresh_flow() {
    let (db, clock, _) = with_manual_clock();
    db.sessions.store("u1", "refresh-1").unwrap();
    assert!(db.sessions.verify("u1", "refresh-1").unwrap());

    clock.advance(Duration::from_secs(8 * 86_400));
    assert!(!db.sessions.verify("u1", "refresh-1").unwrap());
}

#[test]
fn test_dashboard_listing() {
    let (db, _, _) = with_manual_clock();
    for (id, status, date) in [
        ("e1", "scheduled", "2024-03-05"),
        ("e2", "scheduled", "2024-03-01"),
        ("e3", "cancelled", "2024-03-02"),
        ("e4", "scheduled", "2024-04-10"),
    ] {
        db.entities
            .set_entity("events", id, &json!({"status": status, "date": date}))
            .unwrap();
    }

    let mut events = db.entities.get_all_with_ids::<Value>("events").unwrap();
    canvass::filter::sort_by_field(&mut events, "date", SortOrder::Ascending);
    let filter = Filter::new().status("scheduled").date_range(
        "date",
        canvass::filter::parse_date("2024-03-01"),
        canvass::filter::parse_date("2024-03-31"),
    );
    let page = canvass::filter::filter_and_paginate(events, &filter, Pagination::default());
    let ids: Vec<&str> = page.items.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids, vec!["e2", "e1"]);
    assert_eq!(page.total, 2);
}

#[test]
fn test_open_with_config_file() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(canvass::CONFIG_FILE_NAME);
    std::fs::write(&path, "[kpi]\nretention_days = 1\n").unwrap();

    let backend = Arc::new(MemoryBackend::new());
    let db = Canvass::open_with_config_file(backend, &path).unwrap();
    assert_eq!(db.store().config().kpi.retention_days, 1);
    assert_eq!(db.store().config().history.max_len, 1000);
    assert!(db.store().connection().is_ready());
}
