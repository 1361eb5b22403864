//! In-memory backend
//!
//! # Design
//!
//! - DashMap: sharded key → entry map, reads never block other shards
//! - Gate: every call holds a shared gate; atomic batches and cross-key
//!   moves take it exclusively, so no reader observes half a batch
//! - TTL: absolute expiry per entry, checked lazily on access and swept in
//!   bulk through [`TtlIndex`] by [`crate::TtlSweeper`]
//! - Clock: injected, so expiry can be driven by a manual clock in tests
//!
//! # Fault injection
//!
//! [`MemoryBackend::set_available`] simulates the store going away: every
//! call fails with [`BackendError::ConnectionLost`] until it comes back and
//! a new `connect()` succeeds. [`MemoryBackend::fail_next_connects`] makes
//! the next N connection attempts fail.

use crate::backend::{Backend, BackendError, BackendResult, GeoHit, KeyKind, WriteOp};
use crate::entry::{GeoPoint, StoredEntry, Structure};
use crate::geo::{haversine_m, validate_coordinates};
use crate::pattern::glob_match;
use crate::ttl::TtlIndex;
use canvass_core::{Clock, SystemClock, Timestamp};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// In-process structured store
pub struct MemoryBackend {
    data: DashMap<String, StoredEntry>,
    ttl_index: Mutex<TtlIndex>,
    gate: RwLock<()>,
    clock: Arc<dyn Clock>,
    available: AtomicBool,
    connected: AtomicBool,
    failing_connects: AtomicUsize,
    connect_attempts: AtomicUsize,
    connect_delay: Mutex<Duration>,
}

impl MemoryBackend {
    /// Create an empty store on the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store on the given clock
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            data: DashMap::new(),
            ttl_index: Mutex::new(TtlIndex::new()),
            gate: RwLock::new(()),
            clock,
            available: AtomicBool::new(true),
            connected: AtomicBool::new(false),
            failing_connects: AtomicUsize::new(0),
            connect_attempts: AtomicUsize::new(0),
            connect_delay: Mutex::new(Duration::ZERO),
        }
    }

    /// Simulate the store becoming reachable or unreachable
    ///
    /// Going down also drops the current connection.
    pub fn set_available(&self, up: bool) {
        self.available.store(up, Ordering::Release);
        if !up {
            self.connected.store(false, Ordering::Release);
        }
    }

    /// Make the next `n` connection attempts fail
    pub fn fail_next_connects(&self, n: usize) {
        self.failing_connects.store(n, Ordering::Release);
    }

    /// Make every connection attempt take at least `delay`
    pub fn delay_connects(&self, delay: Duration) {
        *self.connect_delay.lock() = delay;
    }

    /// Connection attempts seen so far
    pub fn connect_attempts(&self) -> usize {
        self.connect_attempts.load(Ordering::Acquire)
    }

    /// Whether a connection is open
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Number of stored keys, including expired ones not yet evicted
    pub fn raw_key_count(&self) -> usize {
        self.data.len()
    }

    /// Clock used for expiry
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Evict every key whose expiry has passed; returns keys evicted
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let due = self.ttl_index.lock().find_expired(now);
        let mut evicted = 0;
        for key in due {
            if self.evict_if_expired(&key, now) {
                evicted += 1;
            }
        }
        self.ttl_index.lock().remove_expired(now);
        if evicted > 0 {
            debug!(target: "canvass::storage", evicted, "purged expired keys");
        }
        evicted
    }

    // ========== Gate ==========

    fn check_connection(&self) -> BackendResult<()> {
        if !self.available.load(Ordering::Acquire) {
            return Err(BackendError::ConnectionLost("store is unreachable".into()));
        }
        if !self.connected.load(Ordering::Acquire) {
            return Err(BackendError::ConnectionLost("not connected".into()));
        }
        Ok(())
    }

    fn shared<T>(&self, f: impl FnOnce() -> BackendResult<T>) -> BackendResult<T> {
        self.check_connection()?;
        let _gate = self.gate.read();
        f()
    }

    fn exclusive<T>(&self, f: impl FnOnce() -> BackendResult<T>) -> BackendResult<T> {
        self.check_connection()?;
        let _gate = self.gate.write();
        f()
    }

    // ========== Entry access (caller holds the gate) ==========

    fn live_kind(&self, key: &str, now: Timestamp) -> Option<KeyKind> {
        self.data.get(key).and_then(|entry| {
            if entry.is_expired(now) {
                None
            } else {
                Some(entry.structure.kind())
            }
        })
    }

    fn evict_if_expired(&self, key: &str, now: Timestamp) -> bool {
        match self.data.remove_if(key, |_, entry| entry.is_expired(now)) {
            Some((_, entry)) => {
                if let Some(at) = entry.expires_at {
                    self.ttl_index.lock().remove(at, key);
                }
                true
            }
            None => false,
        }
    }

    fn remove_if_empty(&self, key: &str) {
        if let Some((_, entry)) = self
            .data
            .remove_if(key, |_, entry| entry.structure.is_empty_collection())
        {
            if let Some(at) = entry.expires_at {
                self.ttl_index.lock().remove(at, key);
            }
        }
    }

    /// Read a live entry of any type
    fn peek<T>(&self, key: &str, f: impl FnOnce(&StoredEntry) -> T) -> Option<T> {
        let now = self.clock.now();
        {
            let entry = self.data.get(key)?;
            if !entry.is_expired(now) {
                return Some(f(entry.value()));
            }
        }
        self.evict_if_expired(key, now);
        None
    }

    /// Read a live entry; `f` returns `None` when the structure is the wrong type
    fn read<T>(
        &self,
        key: &str,
        kind: KeyKind,
        f: impl FnOnce(&Structure) -> Option<T>,
    ) -> BackendResult<Option<T>> {
        self.peek(key, |entry| f(&entry.structure).ok_or_else(|| wrong_type(key, kind)))
            .transpose()
    }

    /// Mutate an entry, creating an empty one of `kind` if absent or expired
    fn write<T>(
        &self,
        key: &str,
        kind: KeyKind,
        f: impl FnOnce(&mut Structure) -> Option<T>,
    ) -> BackendResult<T> {
        let now = self.clock.now();
        let (out, emptied) = {
            let mut entry = self
                .data
                .entry(key.to_string())
                .or_insert_with(|| StoredEntry::new(Structure::empty(kind)));
            if entry.is_expired(now) {
                if let Some(at) = entry.expires_at.take() {
                    self.ttl_index.lock().remove(at, key);
                }
                entry.structure = Structure::empty(kind);
            }
            let out = f(&mut entry.structure).ok_or_else(|| wrong_type(key, kind))?;
            (out, entry.structure.is_empty_collection())
        };
        if emptied {
            self.remove_if_empty(key);
        }
        Ok(out)
    }

    /// Mutate an existing live entry; `Ok(None)` if absent
    fn modify<T>(
        &self,
        key: &str,
        kind: KeyKind,
        f: impl FnOnce(&mut Structure) -> Option<T>,
    ) -> BackendResult<Option<T>> {
        let now = self.clock.now();
        let (out, emptied) = {
            let Some(mut entry) = self.data.get_mut(key) else {
                return Ok(None);
            };
            if entry.is_expired(now) {
                drop(entry);
                self.evict_if_expired(key, now);
                return Ok(None);
            }
            let out = f(&mut entry.structure).ok_or_else(|| wrong_type(key, kind))?;
            (out, entry.structure.is_empty_collection())
        };
        if emptied {
            self.remove_if_empty(key);
        }
        Ok(Some(out))
    }

    // ========== Write ops shared by single calls and batches ==========

    fn set_locked(&self, key: &str, value: String, ttl: Option<Duration>) -> BackendResult<()> {
        check_ttl(ttl)?;
        let expires_at = ttl.map(|d| self.clock.now().saturating_add(d));
        let previous = self.data.insert(
            key.to_string(),
            StoredEntry {
                structure: Structure::Scalar(value),
                expires_at,
            },
        );
        let mut index = self.ttl_index.lock();
        if let Some(at) = previous.and_then(|entry| entry.expires_at) {
            index.remove(at, key);
        }
        if let Some(at) = expires_at {
            index.insert(at, key);
        }
        Ok(())
    }

    fn del_locked(&self, key: &str) -> bool {
        let now = self.clock.now();
        match self.data.remove(key) {
            Some((_, entry)) => {
                if let Some(at) = entry.expires_at {
                    self.ttl_index.lock().remove(at, key);
                }
                !entry.is_expired(now)
            }
            None => false,
        }
    }

    fn expire_locked(&self, key: &str, ttl: Duration) -> BackendResult<bool> {
        check_ttl(Some(ttl))?;
        let now = self.clock.now();
        let expires_at = now.saturating_add(ttl);
        let previous = {
            let Some(mut entry) = self.data.get_mut(key) else {
                return Ok(false);
            };
            if entry.is_expired(now) {
                drop(entry);
                self.evict_if_expired(key, now);
                return Ok(false);
            }
            entry.expires_at.replace(expires_at)
        };
        let mut index = self.ttl_index.lock();
        if let Some(at) = previous {
            index.remove(at, key);
        }
        index.insert(expires_at, key);
        Ok(true)
    }

    fn hset_locked(&self, key: &str, field: &str, value: String) -> BackendResult<bool> {
        self.write(key, KeyKind::Hash, |s| match s {
            Structure::Hash(map) => Some(map.insert(field.to_string(), value).is_none()),
            _ => None,
        })
    }

    fn hdel_locked(&self, key: &str, field: &str) -> BackendResult<bool> {
        Ok(self
            .modify(key, KeyKind::Hash, |s| match s {
                Structure::Hash(map) => Some(map.remove(field).is_some()),
                _ => None,
            })?
            .unwrap_or(false))
    }

    fn push_locked(&self, key: &str, value: String, front: bool) -> BackendResult<usize> {
        self.write(key, KeyKind::List, |s| match s {
            Structure::List(list) => {
                if front {
                    list.push_front(value);
                } else {
                    list.push_back(value);
                }
                Some(list.len())
            }
            _ => None,
        })
    }

    fn pop_locked(&self, key: &str, front: bool) -> BackendResult<Option<String>> {
        Ok(self
            .modify(key, KeyKind::List, |s| match s {
                Structure::List(list) => Some(if front {
                    list.pop_front()
                } else {
                    list.pop_back()
                }),
                _ => None,
            })?
            .flatten())
    }

    fn sadd_locked(&self, key: &str, member: &str) -> BackendResult<bool> {
        self.write(key, KeyKind::Set, |s| match s {
            Structure::Set(set) => Some(set.insert(member.to_string())),
            _ => None,
        })
    }

    fn srem_locked(&self, key: &str, member: &str) -> BackendResult<bool> {
        Ok(self
            .modify(key, KeyKind::Set, |s| match s {
                Structure::Set(set) => Some(set.remove(member)),
                _ => None,
            })?
            .unwrap_or(false))
    }

    fn zadd_locked(&self, key: &str, score: f64, member: &str) -> BackendResult<bool> {
        if score.is_nan() {
            return Err(BackendError::InvalidArgument("score is not a number".into()));
        }
        self.write(key, KeyKind::SortedSet, |s| match s {
            Structure::SortedSet(zset) => Some(zset.insert(member, score)),
            _ => None,
        })
    }

    fn zrem_locked(&self, key: &str, member: &str) -> BackendResult<bool> {
        Ok(self
            .modify(key, KeyKind::SortedSet, |s| match s {
                Structure::SortedSet(zset) => Some(zset.remove(member)),
                _ => None,
            })?
            .unwrap_or(false))
    }

    fn geoadd_locked(
        &self,
        key: &str,
        longitude: f64,
        latitude: f64,
        member: &str,
    ) -> BackendResult<bool> {
        validate_coordinates(longitude, latitude).map_err(BackendError::InvalidArgument)?;
        self.write(key, KeyKind::Geo, |s| match s {
            Structure::Geo(points) => Some(
                points
                    .insert(
                        member.to_string(),
                        GeoPoint {
                            longitude,
                            latitude,
                        },
                    )
                    .is_none(),
            ),
            _ => None,
        })
    }

    fn georem_locked(&self, key: &str, member: &str) -> BackendResult<bool> {
        Ok(self
            .modify(key, KeyKind::Geo, |s| match s {
                Structure::Geo(points) => Some(points.remove(member).is_some()),
                _ => None,
            })?
            .unwrap_or(false))
    }

    fn apply_locked(&self, op: WriteOp) -> BackendResult<()> {
        match op {
            WriteOp::Set { key, value, ttl } => self.set_locked(&key, value, ttl),
            WriteOp::Del { key } => {
                self.del_locked(&key);
                Ok(())
            }
            WriteOp::Expire { key, ttl } => self.expire_locked(&key, ttl).map(|_| ()),
            WriteOp::HSet { key, field, value } => self.hset_locked(&key, &field, value).map(|_| ()),
            WriteOp::HDel { key, field } => self.hdel_locked(&key, &field).map(|_| ()),
            WriteOp::LPush { key, value } => self.push_locked(&key, value, true).map(|_| ()),
            WriteOp::RPush { key, value } => self.push_locked(&key, value, false).map(|_| ()),
            WriteOp::SAdd { key, member } => self.sadd_locked(&key, &member).map(|_| ()),
            WriteOp::SRem { key, member } => self.srem_locked(&key, &member).map(|_| ()),
            WriteOp::ZAdd { key, score, member } => {
                self.zadd_locked(&key, score, &member).map(|_| ())
            }
            WriteOp::ZRem { key, member } => self.zrem_locked(&key, &member).map(|_| ()),
            WriteOp::GeoAdd {
                key,
                longitude,
                latitude,
                member,
            } => self
                .geoadd_locked(&key, longitude, latitude, &member)
                .map(|_| ()),
            WriteOp::GeoRem { key, member } => self.georem_locked(&key, &member).map(|_| ()),
        }
    }

    /// Reject a batch that would fail part-way, before anything is applied
    fn precheck_batch(&self, ops: &[WriteOp]) -> BackendResult<()> {
        let now = self.clock.now();
        let mut planned: FxHashMap<&str, Option<KeyKind>> = FxHashMap::default();
        for op in ops {
            match op {
                WriteOp::Set { ttl, .. } => check_ttl(*ttl)?,
                WriteOp::Expire { ttl, .. } => check_ttl(Some(*ttl))?,
                WriteOp::ZAdd { score, .. } if score.is_nan() => {
                    return Err(BackendError::InvalidArgument("score is not a number".into()))
                }
                WriteOp::GeoAdd {
                    longitude,
                    latitude,
                    ..
                } => validate_coordinates(*longitude, *latitude)
                    .map_err(BackendError::InvalidArgument)?,
                _ => {}
            }

            let key = op.key();
            let current = match planned.get(key) {
                Some(kind) => *kind,
                None => self.live_kind(key, now),
            };
            match op {
                WriteOp::Set { .. } => {
                    planned.insert(key, Some(KeyKind::Scalar));
                }
                WriteOp::Del { .. } => {
                    planned.insert(key, None);
                }
                WriteOp::Expire { .. } => {}
                _ => {
                    if let Some(needed) = op.kind() {
                        if current.is_some_and(|kind| kind != needed) {
                            return Err(wrong_type(key, needed));
                        }
                        planned.insert(key, Some(needed));
                    }
                }
            }
        }
        Ok(())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("keys", &self.data.len())
            .field("available", &self.available.load(Ordering::Relaxed))
            .field("connected", &self.connected.load(Ordering::Relaxed))
            .finish()
    }
}

fn wrong_type(key: &str, kind: KeyKind) -> BackendError {
    BackendError::WrongType {
        key: key.to_string(),
        expected: kind.name(),
    }
}

fn check_ttl(ttl: Option<Duration>) -> BackendResult<()> {
    match ttl {
        Some(d) if d.as_millis() == 0 => Err(BackendError::InvalidArgument(
            "ttl must be at least one millisecond".into(),
        )),
        _ => Ok(()),
    }
}

/// Resolve inclusive, possibly negative indices against a length
fn normalize_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

fn remove_occurrences(list: &mut VecDeque<String>, count: i64, value: &str) -> usize {
    let limit = if count == 0 {
        usize::MAX
    } else {
        count.unsigned_abs() as usize
    };
    let mut removed = 0;
    if count >= 0 {
        let mut i = 0;
        while i < list.len() && removed < limit {
            if list[i] == value {
                list.remove(i);
                removed += 1;
            } else {
                i += 1;
            }
        }
    } else {
        let mut i = list.len();
        while i > 0 && removed < limit {
            i -= 1;
            if list[i] == value {
                list.remove(i);
                removed += 1;
            }
        }
    }
    removed
}

impl Backend for MemoryBackend {
    fn connect(&self) -> BackendResult<()> {
        self.connect_attempts.fetch_add(1, Ordering::AcqRel);
        let delay = *self.connect_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        let failing = self
            .failing_connects
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(BackendError::ConnectionLost("connection refused".into()));
        }
        if !self.available.load(Ordering::Acquire) {
            return Err(BackendError::ConnectionLost("store is unreachable".into()));
        }
        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    fn ping(&self) -> BackendResult<()> {
        self.check_connection()
    }

    fn close(&self) -> BackendResult<()> {
        self.connected.store(false, Ordering::Release);
        Ok(())
    }

    // ========== Scalars and keys ==========

    fn get(&self, key: &str) -> BackendResult<Option<String>> {
        self.shared(|| {
            self.read(key, KeyKind::Scalar, |s| match s {
                Structure::Scalar(value) => Some(value.clone()),
                _ => None,
            })
        })
    }

    fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> BackendResult<()> {
        self.shared(|| self.set_locked(key, value, ttl))
    }

    fn del(&self, key: &str) -> BackendResult<bool> {
        self.shared(|| Ok(self.del_locked(key)))
    }

    fn exists(&self, key: &str) -> BackendResult<bool> {
        self.shared(|| Ok(self.peek(key, |_| ()).is_some()))
    }

    fn keys(&self, pattern: &str) -> BackendResult<Vec<String>> {
        self.shared(|| {
            let now = self.clock.now();
            Ok(self
                .data
                .iter()
                .filter(|entry| !entry.value().is_expired(now))
                .filter(|entry| glob_match(pattern, entry.key()))
                .map(|entry| entry.key().clone())
                .collect())
        })
    }

    fn expire(&self, key: &str, ttl: Duration) -> BackendResult<bool> {
        self.shared(|| self.expire_locked(key, ttl))
    }

    fn ttl(&self, key: &str) -> BackendResult<Option<Duration>> {
        self.shared(|| {
            let now = self.clock.now();
            Ok(self
                .peek(key, |entry| entry.expires_at)
                .flatten()
                .and_then(|at| at.duration_since(now)))
        })
    }

    // ========== Hashes ==========

    fn hget(&self, key: &str, field: &str) -> BackendResult<Option<String>> {
        self.shared(|| {
            Ok(self
                .read(key, KeyKind::Hash, |s| match s {
                    Structure::Hash(map) => Some(map.get(field).cloned()),
                    _ => None,
                })?
                .flatten())
        })
    }

    fn hset(&self, key: &str, field: &str, value: String) -> BackendResult<bool> {
        self.shared(|| self.hset_locked(key, field, value))
    }

    fn hdel(&self, key: &str, field: &str) -> BackendResult<bool> {
        self.shared(|| self.hdel_locked(key, field))
    }

    fn hgetall(&self, key: &str) -> BackendResult<Vec<(String, String)>> {
        self.shared(|| {
            Ok(self
                .read(key, KeyKind::Hash, |s| match s {
                    Structure::Hash(map) => Some(
                        map.iter()
                            .map(|(f, v)| (f.clone(), v.clone()))
                            .collect::<Vec<_>>(),
                    ),
                    _ => None,
                })?
                .unwrap_or_default())
        })
    }

    fn hexists(&self, key: &str, field: &str) -> BackendResult<bool> {
        self.shared(|| {
            Ok(self
                .read(key, KeyKind::Hash, |s| match s {
                    Structure::Hash(map) => Some(map.contains_key(field)),
                    _ => None,
                })?
                .unwrap_or(false))
        })
    }

    fn hlen(&self, key: &str) -> BackendResult<usize> {
        self.shared(|| {
            Ok(self
                .read(key, KeyKind::Hash, |s| match s {
                    Structure::Hash(map) => Some(map.len()),
                    _ => None,
                })?
                .unwrap_or(0))
        })
    }

    // ========== Lists ==========

    fn lpush(&self, key: &str, value: String) -> BackendResult<usize> {
        self.shared(|| self.push_locked(key, value, true))
    }

    fn rpush(&self, key: &str, value: String) -> BackendResult<usize> {
        self.shared(|| self.push_locked(key, value, false))
    }

    fn lpop(&self, key: &str) -> BackendResult<Option<String>> {
        self.shared(|| self.pop_locked(key, true))
    }

    fn rpop(&self, key: &str) -> BackendResult<Option<String>> {
        self.shared(|| self.pop_locked(key, false))
    }

    fn lrange(&self, key: &str, start: i64, stop: i64) -> BackendResult<Vec<String>> {
        self.shared(|| {
            Ok(self
                .read(key, KeyKind::List, |s| match s {
                    Structure::List(list) => Some(match normalize_range(list.len(), start, stop) {
                        Some((from, to)) => list.range(from..=to).cloned().collect(),
                        None => Vec::new(),
                    }),
                    _ => None,
                })?
                .unwrap_or_default())
        })
    }

    fn llen(&self, key: &str) -> BackendResult<usize> {
        self.shared(|| {
            Ok(self
                .read(key, KeyKind::List, |s| match s {
                    Structure::List(list) => Some(list.len()),
                    _ => None,
                })?
                .unwrap_or(0))
        })
    }

    fn ltrim(&self, key: &str, start: i64, stop: i64) -> BackendResult<()> {
        self.shared(|| {
            self.modify(key, KeyKind::List, |s| match s {
                Structure::List(list) => {
                    match normalize_range(list.len(), start, stop) {
                        Some((from, to)) => {
                            list.truncate(to + 1);
                            list.drain(..from);
                        }
                        None => list.clear(),
                    }
                    Some(())
                }
                _ => None,
            })
            .map(|_| ())
        })
    }

    fn lrem(&self, key: &str, count: i64, value: &str) -> BackendResult<usize> {
        self.shared(|| {
            Ok(self
                .modify(key, KeyKind::List, |s| match s {
                    Structure::List(list) => Some(remove_occurrences(list, count, value)),
                    _ => None,
                })?
                .unwrap_or(0))
        })
    }

    fn lmove_head_to_tail(
        &self,
        source: &str,
        destination: &str,
    ) -> BackendResult<Option<String>> {
        self.exclusive(|| {
            let now = self.clock.now();
            if self
                .live_kind(destination, now)
                .is_some_and(|kind| kind != KeyKind::List)
            {
                return Err(wrong_type(destination, KeyKind::List));
            }
            let popped = self.pop_locked(source, true)?;
            if let Some(value) = &popped {
                self.push_locked(destination, value.clone(), false)?;
            }
            Ok(popped)
        })
    }

    // ========== Sets ==========

    fn sadd(&self, key: &str, member: &str) -> BackendResult<bool> {
        self.shared(|| self.sadd_locked(key, member))
    }

    fn srem(&self, key: &str, member: &str) -> BackendResult<bool> {
        self.shared(|| self.srem_locked(key, member))
    }

    fn smembers(&self, key: &str) -> BackendResult<Vec<String>> {
        self.shared(|| {
            Ok(self
                .read(key, KeyKind::Set, |s| match s {
                    Structure::Set(set) => Some(set.iter().cloned().collect::<Vec<_>>()),
                    _ => None,
                })?
                .unwrap_or_default())
        })
    }

    fn sismember(&self, key: &str, member: &str) -> BackendResult<bool> {
        self.shared(|| {
            Ok(self
                .read(key, KeyKind::Set, |s| match s {
                    Structure::Set(set) => Some(set.contains(member)),
                    _ => None,
                })?
                .unwrap_or(false))
        })
    }

    fn scard(&self, key: &str) -> BackendResult<usize> {
        self.shared(|| {
            Ok(self
                .read(key, KeyKind::Set, |s| match s {
                    Structure::Set(set) => Some(set.len()),
                    _ => None,
                })?
                .unwrap_or(0))
        })
    }

    // ========== Sorted sets ==========

    fn zadd(&self, key: &str, score: f64, member: &str) -> BackendResult<bool> {
        self.shared(|| self.zadd_locked(key, score, member))
    }

    fn zrange_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> BackendResult<Vec<(String, f64)>> {
        self.shared(|| {
            Ok(self
                .read(key, KeyKind::SortedSet, |s| match s {
                    Structure::SortedSet(zset) => Some(zset.range_by_score(min, max)),
                    _ => None,
                })?
                .unwrap_or_default())
        })
    }

    fn zrem(&self, key: &str, member: &str) -> BackendResult<bool> {
        self.shared(|| self.zrem_locked(key, member))
    }

    fn zcard(&self, key: &str) -> BackendResult<usize> {
        self.shared(|| {
            Ok(self
                .read(key, KeyKind::SortedSet, |s| match s {
                    Structure::SortedSet(zset) => Some(zset.len()),
                    _ => None,
                })?
                .unwrap_or(0))
        })
    }

    // ========== Geo ==========

    fn geoadd(
        &self,
        key: &str,
        longitude: f64,
        latitude: f64,
        member: &str,
    ) -> BackendResult<bool> {
        self.shared(|| self.geoadd_locked(key, longitude, latitude, member))
    }

    fn geopos(&self, key: &str, member: &str) -> BackendResult<Option<(f64, f64)>> {
        self.shared(|| {
            Ok(self
                .read(key, KeyKind::Geo, |s| match s {
                    Structure::Geo(points) => {
                        Some(points.get(member).map(|p| (p.longitude, p.latitude)))
                    }
                    _ => None,
                })?
                .flatten())
        })
    }

    fn georem(&self, key: &str, member: &str) -> BackendResult<bool> {
        self.shared(|| self.georem_locked(key, member))
    }

    fn georadius(
        &self,
        key: &str,
        longitude: f64,
        latitude: f64,
        radius_m: f64,
    ) -> BackendResult<Vec<GeoHit>> {
        validate_coordinates(longitude, latitude).map_err(BackendError::InvalidArgument)?;
        if !radius_m.is_finite() || radius_m < 0.0 {
            return Err(BackendError::InvalidArgument(format!(
                "radius {radius_m} must be a non-negative number"
            )));
        }
        self.shared(|| {
            Ok(self
                .read(key, KeyKind::Geo, |s| match s {
                    Structure::Geo(points) => Some(
                        points
                            .iter()
                            .filter_map(|(member, point)| {
                                let distance_m = haversine_m(
                                    longitude,
                                    latitude,
                                    point.longitude,
                                    point.latitude,
                                );
                                (distance_m <= radius_m).then(|| GeoHit {
                                    member: member.clone(),
                                    distance_m,
                                    longitude: point.longitude,
                                    latitude: point.latitude,
                                })
                            })
                            .collect::<Vec<_>>(),
                    ),
                    _ => None,
                })?
                .unwrap_or_default())
        })
    }

    // ========== Batches ==========

    fn exec_atomic(&self, ops: Vec<WriteOp>) -> BackendResult<()> {
        self.exclusive(|| {
            self.precheck_batch(&ops)?;
            let count = ops.len();
            for op in ops {
                self.apply_locked(op)?;
            }
            debug!(target: "canvass::storage", ops = count, "applied atomic batch");
            Ok(())
        })
    }
}
