//! Core types for Canvass
//!
//! This crate defines the foundational types shared by every layer:
//! - Error: the error taxonomy (unavailable, timeout, not found, corruption)
//! - keys: the key-naming scheme for every structure kept in the store
//! - Timestamp: millisecond-precision wall-clock instant
//! - Clock: injectable time source (system or manual)
//! - DistanceUnit: units accepted by proximity queries
//! - JsonScalar: scalar values used by document filters

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod error;
pub mod keys;
pub mod scalar;
pub mod timestamp;
pub mod units;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use scalar::JsonScalar;
pub use timestamp::Timestamp;
pub use units::DistanceUnit;
