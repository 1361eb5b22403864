//! Canvass - data-access layer for campaign operations
//!
//! Canvass stores documents, scope indices, job queues, territory points,
//! metrics and refresh tokens in one structured key-value store.
//!
//! # Quick Start
//!
//! ```
//! use canvass::{Canvass, DistanceUnit};
//! use serde_json::json;
//!
//! let db = Canvass::ephemeral()?;
//!
//! db.entities.set_entity("volunteers", "v1", &json!({"name": "Ana"}))?;
//! db.queue.enqueue("events", json!({"type": "created", "id": "e1"}))?;
//! db.geo.index_location("t1", -74.07, 4.71, &json!({"name": "Centro"}))?;
//!
//! let near = db.geo.query_radius(-74.07, 4.71, 5.0, DistanceUnit::Kilometers)?;
//! assert_eq!(near[0].key, "t1");
//! # Ok::<(), canvass::Error>(())
//! ```
//!
//! # Architecture
//!
//! Every facade is built from one [`StoreHandle`]; there is no global
//! connection. The handle owns the connection state machine and the
//! settings read from `canvass.toml`.

mod db;

pub use db::Canvass;

pub use canvass_core::keys;
pub use canvass_core::{Clock, DistanceUnit, Error, JsonScalar, ManualClock, Result, SystemClock, Timestamp};
pub use canvass_engine::{ConnectionState, RetryConfig, StoreConfig, StoreHandle, CONFIG_FILE_NAME};
pub use canvass_primitives::filter;
pub use canvass_primitives::{
    collections, Collection, EntityRepository, Filter, GeoIndex, GeoMatch, IndexMaintainer, Job,
    JobQueue, KpiRecord, KpiRecorder, Page, Pagination, ScopeResolution, SessionTokens, SortOrder,
    TypedRepository,
};
pub use canvass_storage::{Backend, MemoryBackend, TtlSweeper};
