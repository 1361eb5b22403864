//! Store connection manager
//!
//! Owns the connection lifecycle:
//!
//! ```text
//! Disconnected ──connect()──▶ Connecting ──ok──▶ Ready
//!                                  │               │ connection lost
//!                        retries exhausted         ▼
//!                                  │          Reconnecting ──ok──▶ Ready
//!                                  ▼               │ retries exhausted
//!                                Ended ◀───────────┘
//!                                  ▲
//!                            disconnect()
//! ```
//!
//! Calls made while the state is not `Ready` fail immediately with
//! [`Error::Unavailable`]; nothing is queued during an outage. The first call
//! that observes a lost connection starts one background reconnect thread.

use crate::retry::RetryConfig;
use canvass_core::{Error, Result};
use canvass_storage::{Backend, BackendError, BackendResult};
use parking_lot::{Condvar, Mutex, RwLock};
use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Never connected
    Disconnected,
    /// Initial connection attempts running
    Connecting,
    /// Calls are accepted
    Ready,
    /// Connection lost; a background thread is reconnecting
    Reconnecting,
    /// Disconnected for good (shutdown or retries exhausted)
    Ended,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Ready => "ready",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Ended => "ended",
        };
        f.write_str(name)
    }
}

type StateObserver = Arc<dyn Fn(ConnectionState, ConnectionState) + Send + Sync>;

enum AttemptOutcome {
    Connected,
    Exhausted(usize),
    Stopped,
}

struct Inner {
    backend: Arc<dyn Backend>,
    retry: RetryConfig,
    op_timeout: Duration,
    state: Mutex<ConnectionState>,
    observers: RwLock<Vec<StateObserver>>,
    stop: Mutex<bool>,
    stop_signal: Condvar,
    reconnect: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    fn notify(&self, from: ConnectionState, to: ConnectionState) {
        info!(target: "canvass::connection", %from, %to, "Connection state changed");
        let observers: Vec<StateObserver> = self.observers.read().clone();
        for observer in observers {
            observer(from, to);
        }
    }

    fn transition(&self, to: ConnectionState) {
        let from = std::mem::replace(&mut *self.state.lock(), to);
        if from != to {
            self.notify(from, to);
        }
    }

    /// Move `from → to` only if the current state is `from`
    fn transition_from(&self, from: ConnectionState, to: ConnectionState) -> bool {
        {
            let mut state = self.state.lock();
            if *state != from {
                return false;
            }
            *state = to;
        }
        self.notify(from, to);
        true
    }

    /// Sleep for `delay` unless a shutdown arrives first; `true` if stopped
    fn pause(&self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        let mut stopped = self.stop.lock();
        while !*stopped {
            if self.stop_signal.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        *stopped
    }

    fn is_stopped(&self) -> bool {
        *self.stop.lock()
    }

    fn attempt_connect(&self) -> AttemptOutcome {
        let max = self.retry.max_retries;
        for attempt in 0..max {
            if self.is_stopped() {
                return AttemptOutcome::Stopped;
            }
            match self.backend.connect() {
                Ok(()) => return AttemptOutcome::Connected,
                Err(e) => {
                    warn!(
                        target: "canvass::connection",
                        attempt = attempt + 1,
                        max_retries = max,
                        error = %e,
                        "Connection attempt failed"
                    );
                    if attempt + 1 < max && self.pause(self.retry.calculate_delay(attempt)) {
                        return AttemptOutcome::Stopped;
                    }
                }
            }
        }
        AttemptOutcome::Exhausted(max)
    }

    fn reconnect_loop(self: Arc<Self>) {
        match self.attempt_connect() {
            AttemptOutcome::Connected => {
                if self.transition_from(ConnectionState::Reconnecting, ConnectionState::Ready) {
                    info!(target: "canvass::connection", "Reconnected to store");
                }
            }
            AttemptOutcome::Exhausted(attempts) => {
                error!(target: "canvass::connection", attempts, "Reconnect failed, giving up");
                self.transition_from(ConnectionState::Reconnecting, ConnectionState::Ended);
            }
            AttemptOutcome::Stopped => {}
        }
    }
}

/// Shared handle on the store connection
///
/// Cloning is cheap; all clones observe the same state.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    /// Create a manager over `backend`; nothing connects until [`connect`](Self::connect)
    pub fn new(backend: Arc<dyn Backend>, retry: RetryConfig, op_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                retry,
                op_timeout,
                state: Mutex::new(ConnectionState::Disconnected),
                observers: RwLock::new(Vec::new()),
                stop: Mutex::new(false),
                stop_signal: Condvar::new(),
                reconnect: Mutex::new(None),
            }),
        }
    }

    /// Register a callback invoked with `(from, to)` on every state change
    pub fn on_state_change<F>(&self, observer: F)
    where
        F: Fn(ConnectionState, ConnectionState) + Send + Sync + 'static,
    {
        self.inner.observers.write().push(Arc::new(observer));
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    /// Whether calls are currently accepted
    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    /// Per-call deadline
    pub fn op_timeout(&self) -> Duration {
        self.inner.op_timeout
    }

    /// Connect with bounded exponential backoff
    ///
    /// Returns immediately when already `Ready`. Exhausting the retry budget
    /// moves the state to `Ended` and returns [`Error::ConnectFailed`], which
    /// callers should treat as fatal at startup.
    pub fn connect(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            let from = *state;
            match from {
                ConnectionState::Ready => return Ok(()),
                ConnectionState::Connecting | ConnectionState::Reconnecting => {
                    return Err(Error::unavailable(format!(
                        "connection attempt already in progress ({from})"
                    )));
                }
                ConnectionState::Disconnected | ConnectionState::Ended => {
                    *state = ConnectionState::Connecting;
                    drop(state);
                    *self.inner.stop.lock() = false;
                    self.inner.notify(from, ConnectionState::Connecting);
                }
            }
        }

        match self.inner.attempt_connect() {
            AttemptOutcome::Connected => {
                // disconnect() may have ended the manager while the attempt ran
                if self
                    .inner
                    .transition_from(ConnectionState::Connecting, ConnectionState::Ready)
                {
                    Ok(())
                } else {
                    Err(Error::unavailable("connection shut down"))
                }
            }
            AttemptOutcome::Exhausted(attempts) => {
                error!(target: "canvass::connection", attempts, "Could not connect to store");
                self.inner
                    .transition_from(ConnectionState::Connecting, ConnectionState::Ended);
                Err(Error::ConnectFailed { attempts })
            }
            AttemptOutcome::Stopped => Err(Error::unavailable("connection shut down")),
        }
    }

    /// Run one store call
    ///
    /// Fails fast with [`Error::Unavailable`] unless `Ready`. A lost
    /// connection starts a background reconnect and also reports
    /// `Unavailable`. A call that overruns the per-call deadline reports
    /// [`Error::Timeout`]; its effect on the store is then unknown.
    pub fn call<T>(
        &self,
        op: &str,
        f: impl FnOnce(&dyn Backend) -> BackendResult<T>,
    ) -> Result<T> {
        let state = self.state();
        if state != ConnectionState::Ready {
            return Err(Error::unavailable(format!("store is {state}")));
        }

        let started = Instant::now();
        let result = f(self.inner.backend.as_ref());
        let elapsed = started.elapsed();

        if let Err(BackendError::ConnectionLost(reason)) = &result {
            warn!(target: "canvass::connection", op, %reason, "Connection lost");
            self.begin_reconnect();
            return Err(Error::unavailable(reason.clone()));
        }
        if elapsed > self.inner.op_timeout {
            warn!(
                target: "canvass::connection",
                op,
                elapsed_ms = elapsed.as_millis() as u64,
                "Store call exceeded its deadline"
            );
            return Err(Error::Timeout {
                op: op.to_string(),
                elapsed_ms: elapsed.as_millis() as u64,
            });
        }
        result.map_err(|e| match e {
            BackendError::WrongType { key, expected } => Error::WrongType { key, expected },
            BackendError::InvalidArgument(msg) => Error::InvalidInput(msg),
            BackendError::ConnectionLost(reason) => Error::Unavailable(reason),
        })
    }

    /// Liveness check through the normal call path
    pub fn ping(&self) -> Result<()> {
        self.call("ping", |backend| backend.ping())
    }

    /// Graceful shutdown: stop reconnecting, close the backend, end the state
    pub fn disconnect(&self) -> Result<()> {
        {
            *self.inner.stop.lock() = true;
            self.inner.stop_signal.notify_all();
        }
        let pending = self.inner.reconnect.lock().take();
        if let Some(handle) = pending {
            if handle.join().is_err() {
                warn!(target: "canvass::connection", "Reconnect thread panicked");
            }
        }
        if let Err(e) = self.inner.backend.close() {
            warn!(target: "canvass::connection", error = %e, "Error while closing store");
        }
        self.inner.transition(ConnectionState::Ended);
        Ok(())
    }

    fn begin_reconnect(&self) {
        if !self
            .inner
            .transition_from(ConnectionState::Ready, ConnectionState::Reconnecting)
        {
            return;
        }
        let inner = Arc::clone(&self.inner);
        let spawned = std::thread::Builder::new()
            .name("canvass-reconnect".into())
            .spawn(move || inner.reconnect_loop());
        match spawned {
            Ok(handle) => {
                *self.inner.reconnect.lock() = Some(handle);
            }
            Err(e) => {
                error!(target: "canvass::connection", error = %e, "Failed to spawn reconnect thread");
                self.inner.transition(ConnectionState::Ended);
            }
        }
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state())
            .field("retry", &self.inner.retry)
            .field("op_timeout", &self.inner.op_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvass_storage::MemoryBackend;

    fn fast_retry(max_retries: usize) -> RetryConfig {
        RetryConfig::new()
            .with_max_retries(max_retries)
            .with_base_delay_ms(1)
            .with_max_delay_ms(5)
    }

    fn manager(backend: &Arc<MemoryBackend>) -> ConnectionManager {
        ConnectionManager::new(backend.clone(), fast_retry(3), Duration::from_secs(5))
    }

    #[test]
    fn test_starts_disconnected_and_rejects_calls() {
        let backend = Arc::new(MemoryBackend::new());
        let conn = manager(&backend);
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(matches!(conn.ping(), Err(Error::Unavailable(_))));
    }

    #[test]
    fn test_connect_is_idempotent() {
        let backend = Arc::new(MemoryBackend::new());
        let conn = manager(&backend);
        conn.connect().unwrap();
        conn.connect().unwrap();
        assert!(conn.is_ready());
        assert_eq!(backend.connect_attempts(), 1);
    }

    #[test]
    fn test_connect_retries_then_succeeds() {
        let backend = Arc::new(MemoryBackend::new());
        backend.fail_next_connects(2);
        let conn = manager(&backend);
        conn.connect().unwrap();
        assert_eq!(backend.connect_attempts(), 3);
        assert!(conn.ping().is_ok());
    }

    #[test]
    fn test_connect_exhaustion_is_fatal() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_available(false);
        let conn = manager(&backend);
        let err = conn.connect().unwrap_err();
        assert!(matches!(err, Error::ConnectFailed { attempts: 3 }));
        assert_eq!(conn.state(), ConnectionState::Ended);
        assert_eq!(backend.connect_attempts(), 3);
    }

    #[test]
    fn test_backend_errors_map_to_core_errors() {
        let backend = Arc::new(MemoryBackend::new());
        let conn = manager(&backend);
        conn.connect().unwrap();
        conn.call("set", |b| b.set("k", "v".into(), None)).unwrap();

        let err = conn.call("lpush", |b| b.lpush("k", "x".into())).unwrap_err();
        assert!(matches!(err, Error::WrongType { expected: "list", .. }));

        let err = conn
            .call("geoadd", |b| b.geoadd("g", 500.0, 0.0, "m"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_disconnect_ends_and_closes() {
        let backend = Arc::new(MemoryBackend::new());
        let conn = manager(&backend);
        conn.connect().unwrap();
        conn.disconnect().unwrap();
        assert_eq!(conn.state(), ConnectionState::Ended);
        assert!(!backend.is_connected());
        assert!(matches!(conn.ping(), Err(Error::Unavailable(_))));
    }

    #[test]
    fn test_display_state() {
        assert_eq!(ConnectionState::Reconnecting.to_string(), "reconnecting");
    }
}
