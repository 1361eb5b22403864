//! Background expiry sweep
//!
//! Reads already hide expired keys; the sweeper reclaims their memory so
//! keys nobody reads again (stale refresh tokens, old KPI records) do not
//! pile up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::trace;

use crate::MemoryBackend;

/// Shortest interval between sweeps
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Periodically evicts expired keys from a [`MemoryBackend`]
///
/// ```ignore
/// let backend = Arc::new(MemoryBackend::new());
/// let sweeper = TtlSweeper::new(Arc::clone(&backend), Duration::from_secs(1));
/// let handle = sweeper.start();
/// // ...
/// sweeper.shutdown();
/// handle.join().unwrap();
/// ```
pub struct TtlSweeper {
    backend: Arc<MemoryBackend>,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
}

impl TtlSweeper {
    /// Create a sweeper running every `interval`, at least every millisecond
    pub fn new(backend: Arc<MemoryBackend>, interval: Duration) -> Self {
        Self {
            backend,
            interval: interval.max(MIN_INTERVAL),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawn the sweep thread; it runs until [`TtlSweeper::shutdown`]
    pub fn start(&self) -> JoinHandle<()> {
        let backend = Arc::clone(&self.backend);
        let shutdown = Arc::clone(&self.shutdown);
        let interval = self.interval;

        thread::Builder::new()
            .name("canvass-ttl-sweeper".into())
            .spawn(move || {
                // Short slices so shutdown is noticed promptly
                let slice = Duration::from_millis(50).min(interval);
                while !shutdown.load(Ordering::Relaxed) {
                    let mut waited = Duration::ZERO;
                    while waited < interval {
                        if shutdown.load(Ordering::Relaxed) {
                            return;
                        }
                        thread::sleep(slice);
                        waited += slice;
                    }
                    let evicted = backend.purge_expired();
                    trace!(target: "canvass::storage", evicted, "ttl sweep");
                }
            })
            .unwrap_or_else(|e| panic!("failed to spawn ttl sweeper: {e}"))
    }

    /// Ask the sweep thread to stop
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Time between sweeps
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether shutdown was requested
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}
