//! The `Canvass` handle: every facade over one store

use canvass_core::Result;
use canvass_engine::{StoreConfig, StoreHandle};
use canvass_primitives::{
    EntityRepository, GeoIndex, IndexMaintainer, JobQueue, KpiRecorder, SessionTokens,
};
use canvass_storage::Backend;
use std::path::Path;
use std::sync::Arc;

/// All data-access facades sharing one [`StoreHandle`]
///
/// Access each facade through its field, e.g. `db.queue.enqueue(..)`.
#[derive(Clone, Debug)]
pub struct Canvass {
    /// Documents
    pub entities: EntityRepository,
    /// Scope sets and history lists
    pub index: IndexMaintainer,
    /// Job queues
    pub queue: JobQueue,
    /// Territory points
    pub geo: GeoIndex,
    /// Metric records
    pub kpi: KpiRecorder,
    /// Refresh tokens
    pub sessions: SessionTokens,
    store: StoreHandle,
}

impl Canvass {
    /// Build every facade on `store`
    pub fn from_handle(store: StoreHandle) -> Self {
        Self {
            entities: EntityRepository::new(store.clone()),
            index: IndexMaintainer::new(store.clone()),
            queue: JobQueue::new(store.clone()),
            geo: GeoIndex::new(store.clone()),
            kpi: KpiRecorder::new(store.clone()),
            sessions: SessionTokens::new(store.clone()),
            store,
        }
    }

    /// Connect to `backend` with `config`
    pub fn open(backend: Arc<dyn Backend>, config: StoreConfig) -> Result<Self> {
        StoreHandle::open(backend, config).map(Self::from_handle)
    }

    /// Connect to `backend` with settings from a `canvass.toml` file
    pub fn open_with_config_file(backend: Arc<dyn Backend>, path: &Path) -> Result<Self> {
        Self::open(backend, StoreConfig::from_file(path)?)
    }

    /// Fresh in-memory store with default settings
    pub fn ephemeral() -> Result<Self> {
        StoreHandle::ephemeral().map(Self::from_handle)
    }

    /// The shared store handle
    pub fn store(&self) -> &StoreHandle {
        &self.store
    }
}
