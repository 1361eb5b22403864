//! Store engine for Canvass
//!
//! This crate sits between the storage boundary and the primitives:
//! - StoreConfig: `canvass.toml` settings
//! - RetryConfig: bounded exponential backoff for connecting
//! - ConnectionManager: connection state machine, reconnect thread,
//!   fail-fast calls with per-call deadlines
//! - StoreHandle: the explicit store value every component is built from

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod connection;
pub mod handle;
pub mod retry;

pub use config::{StoreConfig, CONFIG_FILE_NAME};
pub use connection::{ConnectionManager, ConnectionState};
pub use handle::StoreHandle;
pub use retry::RetryConfig;
