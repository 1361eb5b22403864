//! Campaign data primitives for Canvass
//!
//! Stateless facades over a shared [`StoreHandle`](canvass_engine::StoreHandle):
//! - **EntityRepository**: JSON documents, one hash per collection
//! - **IndexMaintainer**: scope membership sets and capped history lists
//! - **JobQueue**: FIFO job lists with optional claim/ack delivery
//! - **GeoIndex**: named points with payloads and radius queries
//! - **KpiRecorder**: expiring metric records with a time index
//! - **SessionTokens**: expiring refresh tokens
//! - **filter**: predicates and pagination over fetched documents
//!
//! ## Stateless Facades
//!
//! Each facade holds only a cloned handle. Any number of them may share one
//! store; none caches data between calls.
//!
//! ```
//! use canvass_core::keys::scope_key;
//! use canvass_engine::StoreHandle;
//! use canvass_primitives::{EntityRepository, IndexMaintainer};
//! use serde_json::json;
//!
//! let store = StoreHandle::ephemeral().unwrap();
//! let index = IndexMaintainer::new(store.clone());
//! let scope = scope_key("territory", "t1", "volunteers");
//! index
//!     .put_with_scope("volunteers", "v1", &json!({"name": "Ana"}), &scope)
//!     .unwrap();
//!
//! let repo = EntityRepository::new(store);
//! let doc: Option<serde_json::Value> = repo.get_entity("volunteers", "v1").unwrap();
//! assert_eq!(doc.unwrap()["name"], "Ana");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod codec;
pub mod entity;
pub mod filter;
pub mod geo;
pub mod index;
pub mod kpi;
pub mod queue;
pub mod session;

pub use entity::{collections, Collection, EntityRepository, TypedRepository};
pub use filter::{
    filter_and_paginate, paginate, sort_by_field, Document, Filter, Page, Pagination, SortOrder,
};
pub use geo::{GeoIndex, GeoMatch, RadiusQuery};
pub use index::{IndexMaintainer, ScopeResolution};
pub use kpi::{KpiRecord, KpiRecorder};
pub use queue::{Job, JobQueue};
pub use session::SessionTokens;
