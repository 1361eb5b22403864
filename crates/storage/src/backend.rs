//! The structured-store boundary
//!
//! [`Backend`] is the full set of primitives the data-access layer relies
//! on: scalars, hashes, lists, sets, sorted sets, a geo index, key expiry,
//! and an all-or-nothing write batch. Anything implementing it can sit under
//! the connection manager; [`crate::MemoryBackend`] is the in-process one.
//!
//! ## Key types
//!
//! A key holds exactly one structure. Using a key through another family
//! returns [`BackendError::WrongType`]. A collection emptied by a removal
//! (last field, last member, last element) deletes its key. Expired keys are
//! invisible to every read.
//!
//! ## Ranges
//!
//! List ranges take inclusive `start`/`stop` indices; negative values count
//! from the tail (`-1` is the last element).

use std::fmt;
use std::time::Duration;

/// Result of a backend call
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Failure reported by a backend
#[derive(Debug, Clone, PartialEq)]
pub enum BackendError {
    /// Not connected, or the connection dropped during the call
    ConnectionLost(String),
    /// Key holds another structure
    WrongType {
        /// Offending key
        key: String,
        /// Structure the call needed
        expected: &'static str,
    },
    /// Argument rejected by the store
    InvalidArgument(String),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::ConnectionLost(reason) => write!(f, "connection lost: {reason}"),
            BackendError::WrongType { key, expected } => {
                write!(f, "key '{key}' does not hold a {expected}")
            }
            BackendError::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
        }
    }
}

impl std::error::Error for BackendError {}

/// Structure a key can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    /// Scalar string
    Scalar,
    /// Field → value map
    Hash,
    /// Ordered list
    List,
    /// Unordered unique members
    Set,
    /// Members ordered by score
    SortedSet,
    /// Named points
    Geo,
}

impl KeyKind {
    /// Name used in errors
    pub fn name(self) -> &'static str {
        match self {
            KeyKind::Scalar => "string",
            KeyKind::Hash => "hash",
            KeyKind::List => "list",
            KeyKind::Set => "set",
            KeyKind::SortedSet => "zset",
            KeyKind::Geo => "geo",
        }
    }
}

/// A point found by a radius query
#[derive(Debug, Clone, PartialEq)]
pub struct GeoHit {
    /// Member name
    pub member: String,
    /// Great-circle distance from the query center, in meters
    pub distance_m: f64,
    /// Member longitude
    pub longitude: f64,
    /// Member latitude
    pub latitude: f64,
}

/// One write inside an atomic batch
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Replace a scalar, optionally with expiry
    Set {
        /// Key
        key: String,
        /// Value
        value: String,
        /// Expiry
        ttl: Option<Duration>,
    },
    /// Delete a key of any type
    Del {
        /// Key
        key: String,
    },
    /// Set an expiry on an existing key
    Expire {
        /// Key
        key: String,
        /// Expiry
        ttl: Duration,
    },
    /// Set a hash field
    HSet {
        /// Key
        key: String,
        /// Field
        field: String,
        /// Value
        value: String,
    },
    /// Remove a hash field
    HDel {
        /// Key
        key: String,
        /// Field
        field: String,
    },
    /// Prepend to a list
    LPush {
        /// Key
        key: String,
        /// Value
        value: String,
    },
    /// Append to a list
    RPush {
        /// Key
        key: String,
        /// Value
        value: String,
    },
    /// Add a set member
    SAdd {
        /// Key
        key: String,
        /// Member
        member: String,
    },
    /// Remove a set member
    SRem {
        /// Key
        key: String,
        /// Member
        member: String,
    },
    /// Add or rescore a sorted-set member
    ZAdd {
        /// Key
        key: String,
        /// Score
        score: f64,
        /// Member
        member: String,
    },
    /// Remove a sorted-set member
    ZRem {
        /// Key
        key: String,
        /// Member
        member: String,
    },
    /// Add or move a geo member
    GeoAdd {
        /// Key
        key: String,
        /// Longitude in degrees
        longitude: f64,
        /// Latitude in degrees
        latitude: f64,
        /// Member
        member: String,
    },
    /// Remove a geo member
    GeoRem {
        /// Key
        key: String,
        /// Member
        member: String,
    },
}

impl WriteOp {
    /// Key this op writes
    pub fn key(&self) -> &str {
        match self {
            WriteOp::Set { key, .. }
            | WriteOp::Del { key }
            | WriteOp::Expire { key, .. }
            | WriteOp::HSet { key, .. }
            | WriteOp::HDel { key, .. }
            | WriteOp::LPush { key, .. }
            | WriteOp::RPush { key, .. }
            | WriteOp::SAdd { key, .. }
            | WriteOp::SRem { key, .. }
            | WriteOp::ZAdd { key, .. }
            | WriteOp::ZRem { key, .. }
            | WriteOp::GeoAdd { key, .. }
            | WriteOp::GeoRem { key, .. } => key,
        }
    }

    /// Structure the op requires, `None` for type-agnostic ops
    pub fn kind(&self) -> Option<KeyKind> {
        match self {
            WriteOp::Set { .. } | WriteOp::Del { .. } | WriteOp::Expire { .. } => None,
            WriteOp::HSet { .. } | WriteOp::HDel { .. } => Some(KeyKind::Hash),
            WriteOp::LPush { .. } | WriteOp::RPush { .. } => Some(KeyKind::List),
            WriteOp::SAdd { .. } | WriteOp::SRem { .. } => Some(KeyKind::Set),
            WriteOp::ZAdd { .. } | WriteOp::ZRem { .. } => Some(KeyKind::SortedSet),
            WriteOp::GeoAdd { .. } | WriteOp::GeoRem { .. } => Some(KeyKind::Geo),
        }
    }
}

/// Structured key-value store
///
/// All methods are single round trips. No method blocks waiting for data.
pub trait Backend: Send + Sync {
    // ========== Lifecycle ==========

    /// Open the connection
    fn connect(&self) -> BackendResult<()>;

    /// Liveness check
    fn ping(&self) -> BackendResult<()>;

    /// Close the connection
    fn close(&self) -> BackendResult<()>;

    // ========== Scalars and keys ==========

    /// Read a scalar
    fn get(&self, key: &str) -> BackendResult<Option<String>>;

    /// Replace the key with a scalar; `ttl` of `None` clears any expiry
    fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> BackendResult<()>;

    /// Delete a key of any type
    fn del(&self, key: &str) -> BackendResult<bool>;

    /// Whether a live key exists
    fn exists(&self, key: &str) -> BackendResult<bool>;

    /// Live keys matching a glob pattern (`*`, `?`, `[...]`)
    fn keys(&self, pattern: &str) -> BackendResult<Vec<String>>;

    /// Set an expiry; `false` if the key does not exist
    fn expire(&self, key: &str, ttl: Duration) -> BackendResult<bool>;

    /// Remaining time to live; `None` if missing or persistent
    fn ttl(&self, key: &str) -> BackendResult<Option<Duration>>;

    // ========== Hashes ==========

    /// Read a hash field
    fn hget(&self, key: &str, field: &str) -> BackendResult<Option<String>>;

    /// Write a hash field; `true` if the field is new
    fn hset(&self, key: &str, field: &str, value: String) -> BackendResult<bool>;

    /// Remove a hash field; `true` if it existed
    fn hdel(&self, key: &str, field: &str) -> BackendResult<bool>;

    /// Every field of a hash, in no defined order
    fn hgetall(&self, key: &str) -> BackendResult<Vec<(String, String)>>;

    /// Whether a hash field exists
    fn hexists(&self, key: &str, field: &str) -> BackendResult<bool>;

    /// Number of fields
    fn hlen(&self, key: &str) -> BackendResult<usize>;

    // ========== Lists ==========

    /// Prepend; returns the new length
    fn lpush(&self, key: &str, value: String) -> BackendResult<usize>;

    /// Append; returns the new length
    fn rpush(&self, key: &str, value: String) -> BackendResult<usize>;

    /// Remove and return the head
    fn lpop(&self, key: &str) -> BackendResult<Option<String>>;

    /// Remove and return the tail
    fn rpop(&self, key: &str) -> BackendResult<Option<String>>;

    /// Elements between two inclusive indices
    fn lrange(&self, key: &str, start: i64, stop: i64) -> BackendResult<Vec<String>>;

    /// List length
    fn llen(&self, key: &str) -> BackendResult<usize>;

    /// Keep only the elements between two inclusive indices
    fn ltrim(&self, key: &str, start: i64, stop: i64) -> BackendResult<()>;

    /// Remove occurrences of `value`: `count > 0` from the head, `< 0` from
    /// the tail, `0` all; returns how many were removed
    fn lrem(&self, key: &str, count: i64, value: &str) -> BackendResult<usize>;

    /// Atomically pop the head of `source` and append it to `destination`
    fn lmove_head_to_tail(&self, source: &str, destination: &str)
        -> BackendResult<Option<String>>;

    // ========== Sets ==========

    /// Add a member; `true` if it was not present
    fn sadd(&self, key: &str, member: &str) -> BackendResult<bool>;

    /// Remove a member; `true` if it was present
    fn srem(&self, key: &str, member: &str) -> BackendResult<bool>;

    /// All members, in no defined order
    fn smembers(&self, key: &str) -> BackendResult<Vec<String>>;

    /// Membership test
    fn sismember(&self, key: &str, member: &str) -> BackendResult<bool>;

    /// Number of members
    fn scard(&self, key: &str) -> BackendResult<usize>;

    // ========== Sorted sets ==========

    /// Add or rescore a member; `true` if it was new
    fn zadd(&self, key: &str, score: f64, member: &str) -> BackendResult<bool>;

    /// Members with `min <= score <= max`, ascending by score then member
    fn zrange_by_score(&self, key: &str, min: f64, max: f64)
        -> BackendResult<Vec<(String, f64)>>;

    /// Remove a member; `true` if it was present
    fn zrem(&self, key: &str, member: &str) -> BackendResult<bool>;

    /// Number of members
    fn zcard(&self, key: &str) -> BackendResult<usize>;

    // ========== Geo ==========

    /// Add or move a point; `true` if the member is new
    fn geoadd(&self, key: &str, longitude: f64, latitude: f64, member: &str)
        -> BackendResult<bool>;

    /// Position of a member as `(longitude, latitude)`
    fn geopos(&self, key: &str, member: &str) -> BackendResult<Option<(f64, f64)>>;

    /// Remove a point; `true` if it was present
    fn georem(&self, key: &str, member: &str) -> BackendResult<bool>;

    /// Points within `radius_m` meters of the center, in no defined order
    fn georadius(
        &self,
        key: &str,
        longitude: f64,
        latitude: f64,
        radius_m: f64,
    ) -> BackendResult<Vec<GeoHit>>;

    // ========== Batches ==========

    /// Apply every op or none of them; no reader observes a partial batch
    fn exec_atomic(&self, ops: Vec<WriteOp>) -> BackendResult<()>;
}
