//! The store handle passed to every component
//!
//! One [`StoreHandle`] is built at startup and cloned into each repository,
//! queue and index. There is no global connection.

use crate::config::StoreConfig;
use crate::connection::ConnectionManager;
use canvass_core::{Clock, Result, SystemClock, Timestamp};
use canvass_storage::{Backend, BackendResult, MemoryBackend, TtlSweeper};
use std::sync::Arc;
use tracing::info;

/// Connection, configuration and clock, shared
#[derive(Clone, Debug)]
pub struct StoreHandle {
    connection: ConnectionManager,
    config: Arc<StoreConfig>,
    clock: Arc<dyn Clock>,
}

impl StoreHandle {
    /// Build a handle without connecting
    pub fn new(backend: Arc<dyn Backend>, config: StoreConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let connection = ConnectionManager::new(backend, config.retry(), config.op_timeout());
        Ok(Self {
            connection,
            config: Arc::new(config),
            clock,
        })
    }

    /// Build a handle on the system clock and connect
    ///
    /// Fails with `ConnectFailed` when the store stays unreachable through
    /// every retry.
    pub fn open(backend: Arc<dyn Backend>, config: StoreConfig) -> Result<Self> {
        let handle = Self::new(backend, config, Arc::new(SystemClock))?;
        handle.connection.connect()?;
        info!(target: "canvass::store", "Store handle ready");
        Ok(handle)
    }

    /// Connected handle over a fresh in-memory store
    pub fn ephemeral() -> Result<Self> {
        Self::ephemeral_with(StoreConfig::default(), Arc::new(SystemClock)).map(|(handle, _)| handle)
    }

    /// Connected handle over a fresh in-memory store driven by `clock`
    ///
    /// The backend is returned too so tests can inject faults.
    pub fn ephemeral_with_clock(clock: Arc<dyn Clock>) -> Result<(Self, Arc<MemoryBackend>)> {
        Self::ephemeral_with(StoreConfig::default(), clock)
    }

    /// Connected handle over a fresh in-memory store with explicit settings
    pub fn ephemeral_with(
        config: StoreConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<(Self, Arc<MemoryBackend>)> {
        let backend = Arc::new(MemoryBackend::with_clock(Arc::clone(&clock)));
        let handle = Self::new(backend.clone(), config, clock)?;
        handle.connection.connect()?;
        Ok((handle, backend))
    }

    /// Expiry sweeper for an in-memory backend, at the configured interval
    pub fn sweeper(&self, backend: Arc<MemoryBackend>) -> TtlSweeper {
        TtlSweeper::new(backend, self.config.sweep_interval())
    }

    /// Connection manager
    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// Configuration
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Clock
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Current time
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Run one store call, see [`ConnectionManager::call`]
    pub fn call<T>(&self, op: &str, f: impl FnOnce(&dyn Backend) -> BackendResult<T>) -> Result<T> {
        self.connection.call(op, f)
    }
}
