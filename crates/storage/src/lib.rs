//! Storage layer for Canvass
//!
//! This crate defines the structured-store boundary and its in-process
//! implementation:
//! - Backend: scalars, hashes, lists, sets, sorted sets, geo, expiry and
//!   atomic write batches
//! - MemoryBackend: DashMap-sharded store with lazy expiry
//! - TtlIndex: expiry timestamp → keys, for bulk sweeps
//! - TtlSweeper: background thread evicting expired keys
//! - glob_match: key pattern matching for scans

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
mod entry;
pub mod geo;
pub mod memory;
pub mod pattern;
pub mod sweeper;
pub mod ttl;

pub use backend::{Backend, BackendError, BackendResult, GeoHit, KeyKind, WriteOp};
pub use memory::MemoryBackend;
pub use pattern::glob_match;
pub use sweeper::TtlSweeper;
pub use ttl::TtlIndex;
