//! Connection lifecycle tests
//!
//! Drives the ConnectionManager through outages using MemoryBackend fault
//! injection:
//! - state transitions are observable
//! - calls fail fast while not ready, nothing is queued
//! - a lost connection is re-established in the background
//! - overrunning calls report a distinguishable timeout

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use canvass_core::{Error, SystemClock};
use canvass_engine::{ConnectionState, StoreConfig, StoreHandle};
use canvass_storage::MemoryBackend;
use parking_lot::Mutex;

// ============================================================================
// Test Helpers
// ============================================================================

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn fast_config(max_retries: usize) -> StoreConfig {
    let mut config = StoreConfig::default();
    config.connection.max_retries = max_retries;
    config.connection.base_delay_ms = 1;
    config.connection.max_delay_ms = 5;
    config
}

fn setup(max_retries: usize) -> (StoreHandle, Arc<MemoryBackend>) {
    init_tracing();
    StoreHandle::ephemeral_with(fast_config(max_retries), Arc::new(SystemClock)).unwrap()
}

fn wait_for_state(handle: &StoreHandle, wanted: ConnectionState) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if handle.connection().state() == wanted {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

// ============================================================================
// Startup
// ============================================================================

#[test]
fn test_open_fails_fatally_when_store_never_answers() {
    init_tracing();
    let backend = Arc::new(MemoryBackend::new());
    backend.set_available(false);

    let err = StoreHandle::open(backend.clone(), fast_config(4)).unwrap_err();
    assert!(matches!(err, Error::ConnectFailed { attempts: 4 }));
    assert_eq!(err.http_status(), 503);
    assert_eq!(backend.connect_attempts(), 4);
}

#[test]
fn test_open_survives_transient_refusals() {
    init_tracing();
    let backend = Arc::new(MemoryBackend::new());
    backend.fail_next_connects(3);

    let handle = StoreHandle::open(backend.clone(), fast_config(10)).unwrap();
    assert!(handle.connection().is_ready());
    assert_eq!(backend.connect_attempts(), 4);
}

#[test]
fn test_state_changes_are_observable() {
    init_tracing();
    let backend = Arc::new(MemoryBackend::new());
    let handle = StoreHandle::new(backend, fast_config(3), Arc::new(SystemClock)).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    handle
        .connection()
        .on_state_change(move |from, to| sink.lock().push((from, to)));

    handle.connection().connect().unwrap();
    handle.connection().disconnect().unwrap();

    assert_eq!(
        *seen.lock(),
        vec![
            (ConnectionState::Disconnected, ConnectionState::Connecting),
            (ConnectionState::Connecting, ConnectionState::Ready),
            (ConnectionState::Ready, ConnectionState::Ended),
        ]
    );
}

// ============================================================================
// Outages
// ============================================================================

#[test]
fn test_lost_connection_fails_fast_then_recovers() {
    let (handle, backend) = setup(500);
    handle
        .call("set", |b| b.set("k", "v".into(), None))
        .unwrap();

    backend.set_available(false);
    let err = handle.call("get", |b| b.get("k")).unwrap_err();
    assert!(matches!(err, Error::Unavailable(_)));
    assert!(err.is_retryable());

    // While reconnecting, calls are rejected without reaching the store
    let err = handle
        .call("get", |_| -> canvass_storage::BackendResult<()> {
            panic!("call must not reach the backend")
        })
        .unwrap_err();
    assert!(matches!(err, Error::Unavailable(_)));

    backend.set_available(true);
    assert!(wait_for_state(&handle, ConnectionState::Ready));
    let value = handle.call("get", |b| b.get("k")).unwrap();
    assert_eq!(value.as_deref(), Some("v"));
}

#[test]
fn test_background_reconnect_gives_up_after_budget() {
    let (handle, backend) = setup(3);
    backend.set_available(false);
    assert!(handle.connection().ping().is_err());
    assert!(wait_for_state(&handle, ConnectionState::Ended));
}

#[test]
fn test_disconnect_stops_reconnect_thread() {
    let (handle, backend) = setup(1_000_000);
    backend.set_available(false);
    assert!(handle.connection().ping().is_err());

    let started = Instant::now();
    handle.connection().disconnect().unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(handle.connection().state(), ConnectionState::Ended);

    backend.set_available(true);
    thread::sleep(Duration::from_millis(20));
    assert_eq!(handle.connection().state(), ConnectionState::Ended);
}

#[test]
fn test_connect_after_end_starts_over() {
    let (handle, _backend) = setup(3);
    handle.connection().disconnect().unwrap();
    handle.connection().connect().unwrap();
    assert!(handle.connection().ping().is_ok());
}

#[test]
fn test_disconnect_during_connect_attempt_stays_ended() {
    init_tracing();
    let backend = Arc::new(MemoryBackend::new());
    backend.delay_connects(Duration::from_millis(300));
    let handle = StoreHandle::new(backend.clone(), fast_config(3), Arc::new(SystemClock)).unwrap();

    let connecting = handle.clone();
    let attempt = thread::spawn(move || connecting.connection().connect());
    assert!(wait_for_state(&handle, ConnectionState::Connecting));

    handle.connection().disconnect().unwrap();
    let result = attempt.join().unwrap();

    assert!(matches!(result, Err(Error::Unavailable(_))));
    assert_eq!(handle.connection().state(), ConnectionState::Ended);
    assert_eq!(backend.connect_attempts(), 1);
}

// ============================================================================
// Deadlines
// ============================================================================

#[test]
fn test_slow_call_reports_timeout() {
    init_tracing();
    let mut config = fast_config(3);
    config.connection.op_timeout_ms = 5;
    let (handle, _backend) = StoreHandle::ephemeral_with(config, Arc::new(SystemClock)).unwrap();

    let err = handle
        .call("slow_get", |b| {
            thread::sleep(Duration::from_millis(30));
            b.get("k")
        })
        .unwrap_err();
    match err {
        Error::Timeout { op, elapsed_ms } => {
            assert_eq!(op, "slow_get");
            assert!(elapsed_ms >= 5);
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    // A timeout does not drop the connection
    assert!(handle.connection().is_ready());
}
