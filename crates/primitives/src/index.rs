//! Secondary index maintainer
//!
//! Two kinds of derived structures relate entities to each other:
//!
//! - **Scope sets** (`<scope>:<scopeId>:<childType>`): unordered member ids,
//!   e.g. the volunteers of a territory
//! - **History lists** (`<entityType>:<entityId>:<historyType>`): records
//!   prepended newest-first, e.g. the contacts of a voter
//!
//! ## Consistency
//!
//! Membership is advisory. Writing an entity and updating its scope are two
//! calls; a failure between them leaves an orphaned member or an unindexed
//! entity. Readers must re-check that a member still exists, which
//! [`IndexMaintainer::resolve_scope`] does, and [`IndexMaintainer::prune_scope`]
//! repairs a set after the fact.
//!
//! Where the pair must not diverge, [`IndexMaintainer::put_with_scope`] and
//! [`IndexMaintainer::delete_with_scope`] apply both writes as one atomic
//! batch.
//!
//! ## Growth
//!
//! History lists are trimmed to `history.max_len` newest entries. With
//! `max_len = 0` they grow without bound and a `capacity_risk` warning is
//! logged each time a list passes another thousand entries.

use crate::codec::{decode, encode};
use canvass_core::keys::validate_segment;
use canvass_core::Result;
use canvass_engine::StoreHandle;
use canvass_storage::WriteOp;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Lists longer than a multiple of this trigger a capacity warning when uncapped
const UNBOUNDED_WARN_EVERY: usize = 1000;

/// Outcome of resolving a scope against its collection
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeResolution<T> {
    /// `(id, document)` for members that still exist
    pub documents: Vec<(String, T)>,
    /// Members whose document is gone
    pub stale: Vec<String>,
}

/// Maintains scope sets and history lists
#[derive(Clone, Debug)]
pub struct IndexMaintainer {
    store: StoreHandle,
}

impl IndexMaintainer {
    /// Create a maintainer on `store`
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    // ========== Scope sets ==========

    /// Add a member; `true` if it was not already present
    pub fn add_to_scope(&self, scope_key: &str, member_id: &str) -> Result<bool> {
        validate_segment("scope key", scope_key)?;
        validate_segment("member id", member_id)?;
        self.store.call("add_to_scope", |b| b.sadd(scope_key, member_id))
    }

    /// Remove a member; `true` if it was present
    pub fn remove_from_scope(&self, scope_key: &str, member_id: &str) -> Result<bool> {
        self.store
            .call("remove_from_scope", |b| b.srem(scope_key, member_id))
    }

    /// Members in no defined order; they may reference deleted documents
    pub fn scope_members(&self, scope_key: &str) -> Result<Vec<String>> {
        self.store.call("scope_members", |b| b.smembers(scope_key))
    }

    /// Membership test
    pub fn is_in_scope(&self, scope_key: &str, member_id: &str) -> Result<bool> {
        self.store
            .call("is_in_scope", |b| b.sismember(scope_key, member_id))
    }

    /// Number of members
    pub fn scope_size(&self, scope_key: &str) -> Result<usize> {
        self.store.call("scope_size", |b| b.scard(scope_key))
    }

    // ========== Atomic pairing ==========

    /// Write `collection[id]` and add `id` to `scope_key` in one batch
    pub fn put_with_scope<T: Serialize + ?Sized>(
        &self,
        collection: &str,
        id: &str,
        doc: &T,
        scope_key: &str,
    ) -> Result<()> {
        validate_segment("collection", collection)?;
        validate_segment("id", id)?;
        validate_segment("scope key", scope_key)?;
        let raw = encode("document", doc)?;
        let ops = vec![
            WriteOp::HSet {
                key: collection.to_string(),
                field: id.to_string(),
                value: raw,
            },
            WriteOp::SAdd {
                key: scope_key.to_string(),
                member: id.to_string(),
            },
        ];
        self.store.call("put_with_scope", |b| b.exec_atomic(ops))
    }

    /// Delete `collection[id]` and remove `id` from `scope_key` in one batch
    pub fn delete_with_scope(&self, collection: &str, id: &str, scope_key: &str) -> Result<()> {
        let ops = vec![
            WriteOp::HDel {
                key: collection.to_string(),
                field: id.to_string(),
            },
            WriteOp::SRem {
                key: scope_key.to_string(),
                member: id.to_string(),
            },
        ];
        self.store.call("delete_with_scope", |b| b.exec_atomic(ops))
    }

    // ========== Repair ==========

    /// Remove members whose document no longer exists in `collection`
    ///
    /// Returns the removed ids. A member re-added concurrently may be
    /// removed; run it when writers are quiet or re-run afterwards.
    pub fn prune_scope(&self, scope_key: &str, collection: &str) -> Result<Vec<String>> {
        let mut removed = Vec::new();
        for member in self.scope_members(scope_key)? {
            let exists = self
                .store
                .call("prune_scope", |b| b.hexists(collection, &member))?;
            if !exists && self.remove_from_scope(scope_key, &member)? {
                removed.push(member);
            }
        }
        if !removed.is_empty() {
            info!(target: "canvass::index", scope_key, collection, removed = removed.len(), "Pruned stale scope members");
        }
        Ok(removed)
    }

    /// Fetch the documents of every member, reporting the stale ones
    pub fn resolve_scope<T: DeserializeOwned>(
        &self,
        scope_key: &str,
        collection: &str,
    ) -> Result<ScopeResolution<T>> {
        let mut resolution = ScopeResolution {
            documents: Vec::new(),
            stale: Vec::new(),
        };
        for member in self.scope_members(scope_key)? {
            let raw = self
                .store
                .call("resolve_scope", |b| b.hget(collection, &member))?;
            match raw {
                Some(raw) => {
                    let doc = decode(&format!("{collection}/{member}"), &raw)?;
                    resolution.documents.push((member, doc));
                }
                None => resolution.stale.push(member),
            }
        }
        if !resolution.stale.is_empty() {
            debug!(target: "canvass::index", scope_key, stale = resolution.stale.len(), "Scope references missing documents");
        }
        Ok(resolution)
    }

    // ========== History lists ==========

    /// Prepend a record; returns the list length afterwards
    pub fn append_to_history<T: Serialize + ?Sized>(&self, history_key: &str, record: &T) -> Result<usize> {
        validate_segment("history key", history_key)?;
        let raw = encode("history record", record)?;
        let len = self
            .store
            .call("append_to_history", |b| b.lpush(history_key, raw))?;

        let max_len = self.store.config().history.max_len;
        if max_len == 0 {
            if len % UNBOUNDED_WARN_EVERY == 0 {
                warn!(
                    target: "canvass::index",
                    capacity_risk = true,
                    history_key,
                    len,
                    "History list keeps growing without a cap"
                );
            }
            return Ok(len);
        }
        if len > max_len {
            self.store.call("trim_history", |b| {
                b.ltrim(history_key, 0, max_len as i64 - 1)
            })?;
            debug!(target: "canvass::index", history_key, dropped = len - max_len, "Trimmed history");
            return Ok(max_len);
        }
        Ok(len)
    }

    /// Records newest first, skipping `offset` and returning at most `limit`
    pub fn history<T: DeserializeOwned>(&self, history_key: &str, offset: usize, limit: usize) -> Result<Vec<T>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        // An offset past i64 is past the end of any list
        let Ok(start) = i64::try_from(offset) else {
            return Ok(Vec::new());
        };
        // A limit past i64 reads to the end
        let stop = i64::try_from(limit).map_or(-1, |limit| start.saturating_add(limit - 1));
        let raws = self
            .store
            .call("history", |b| b.lrange(history_key, start, stop))?;
        raws.iter()
            .enumerate()
            .map(|(i, raw)| decode(&format!("{history_key}[{}]", offset + i), raw))
            .collect()
    }

    /// Number of records in a history list
    pub fn history_len(&self, history_key: &str) -> Result<usize> {
        self.store.call("history_len", |b| b.llen(history_key))
    }
}
