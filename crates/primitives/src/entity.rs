//! Entity repository: documents stored one hash per collection
//!
//! ## Layout
//!
//! A collection is one hash keyed by the collection name; each field is a
//! document id and its value the JSON-encoded document. Writes replace the
//! whole document (last writer wins, no merge, no version check).
//!
//! ## Ordering
//!
//! Bulk reads return documents in **no defined order**. Any order observed
//! is an artifact of the store; sort explicitly (see
//! [`crate::filter::sort_by_field`]) when presentation order matters.
//!
//! ## Secondary indices
//!
//! Deleting a document never touches scope sets or history lists that
//! mention it. Use [`crate::IndexMaintainer`] alongside writes.

use crate::codec::{decode, document_location, encode};
use canvass_core::keys::validate_segment;
use canvass_core::{Error, JsonScalar, Result};
use canvass_engine::StoreHandle;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;
use tracing::{debug, warn};

/// Generic per-collection CRUD
///
/// Stateless facade over a [`StoreHandle`]; clones share the connection.
#[derive(Clone, Debug)]
pub struct EntityRepository {
    store: StoreHandle,
}

impl EntityRepository {
    /// Create a repository on `store`
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    /// Store handle
    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    /// Write `doc` as `collection[id]`, replacing any previous value
    pub fn set_entity<T: Serialize + ?Sized>(&self, collection: &str, id: &str, doc: &T) -> Result<()> {
        validate_segment("collection", collection)?;
        validate_segment("id", id)?;
        let raw = encode("document", doc)?;
        self.store
            .call("set_entity", |b| b.hset(collection, id, raw))
            .map(|_| ())
    }

    /// Read `collection[id]`; `Ok(None)` when absent
    pub fn get_entity<T: DeserializeOwned>(&self, collection: &str, id: &str) -> Result<Option<T>> {
        let raw = self.store.call("get_entity", |b| b.hget(collection, id))?;
        raw.map(|raw| decode(&document_location(collection, id), &raw))
            .transpose()
    }

    /// Read `collection[id]`, failing with `NotFound` when absent
    pub fn require_entity<T: DeserializeOwned>(&self, collection: &str, id: &str) -> Result<T> {
        self.get_entity(collection, id)?
            .ok_or_else(|| Error::not_found(collection, id))
    }

    /// Every document of a collection, in no defined order
    ///
    /// Fails with `Corruption` on the first document that does not decode.
    pub fn get_all_entities<T: DeserializeOwned>(&self, collection: &str) -> Result<Vec<T>> {
        Ok(self
            .get_all_with_ids(collection)?
            .into_iter()
            .map(|(_, doc)| doc)
            .collect())
    }

    /// Every `(id, document)` pair of a collection, in no defined order
    pub fn get_all_with_ids<T: DeserializeOwned>(&self, collection: &str) -> Result<Vec<(String, T)>> {
        let fields = self.store.call("get_all_entities", |b| b.hgetall(collection))?;
        fields
            .into_iter()
            .map(|(id, raw)| {
                let doc = decode(&document_location(collection, &id), &raw)?;
                Ok((id, doc))
            })
            .collect()
    }

    /// Every decodable document plus the ids of those that failed to decode
    ///
    /// For repair tooling; normal reads should use
    /// [`get_all_entities`](Self::get_all_entities).
    pub fn get_all_entities_lossy<T: DeserializeOwned>(
        &self,
        collection: &str,
    ) -> Result<(Vec<(String, T)>, Vec<String>)> {
        let fields = self.store.call("get_all_entities", |b| b.hgetall(collection))?;
        let mut docs = Vec::with_capacity(fields.len());
        let mut corrupt = Vec::new();
        for (id, raw) in fields {
            match decode::<T>(&document_location(collection, &id), &raw) {
                Ok(doc) => docs.push((id, doc)),
                Err(e) => {
                    warn!(target: "canvass::entity", collection, id = %id, error = %e, "Skipping corrupt document");
                    corrupt.push(id);
                }
            }
        }
        Ok((docs, corrupt))
    }

    /// Remove `collection[id]`; `true` if it existed
    ///
    /// Scope sets and history lists that reference the id are left as they are.
    pub fn delete_entity(&self, collection: &str, id: &str) -> Result<bool> {
        self.store.call("delete_entity", |b| b.hdel(collection, id))
    }

    /// First document whose top-level `field` equals `value`
    ///
    /// This is a full scan of the collection, O(collection size) per call.
    /// With several matches, which one is returned is unspecified.
    pub fn get_entity_by_field<T: DeserializeOwned>(
        &self,
        collection: &str,
        field: &str,
        value: impl Into<JsonScalar>,
    ) -> Result<Option<T>> {
        let expected = value.into();
        let docs: Vec<(String, Value)> = self.get_all_with_ids(collection)?;
        debug!(target: "canvass::entity", collection, field, scanned = docs.len(), "Field lookup by full scan");
        let found = docs
            .into_iter()
            .find(|(_, doc)| doc.get(field).is_some_and(|v| expected.matches_json(v)));
        match found {
            Some((id, doc)) => serde_json::from_value(doc)
                .map(Some)
                .map_err(|e| Error::corruption(document_location(collection, &id), e.to_string())),
            None => Ok(None),
        }
    }

    /// Whether `collection[id]` exists
    pub fn exists(&self, collection: &str, id: &str) -> Result<bool> {
        self.store.call("entity_exists", |b| b.hexists(collection, id))
    }

    /// Number of documents in a collection
    pub fn count(&self, collection: &str) -> Result<usize> {
        self.store.call("entity_count", |b| b.hlen(collection))
    }
}

// ============================================================================
// Typed collections
// ============================================================================

/// A named collection with a fixed document type
pub trait Collection {
    /// Hash key of the collection
    const NAME: &'static str;
    /// Document type
    type Doc: Serialize + DeserializeOwned;
}

/// [`EntityRepository`] bound to one [`Collection`]
///
/// Decode failures surface as `Corruption` errors typed against `C::Doc`.
pub struct TypedRepository<C: Collection> {
    repo: EntityRepository,
    _collection: PhantomData<fn() -> C>,
}

impl<C: Collection> Clone for TypedRepository<C> {
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
            _collection: PhantomData,
        }
    }
}

impl<C: Collection> fmt::Debug for TypedRepository<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedRepository")
            .field("collection", &C::NAME)
            .finish()
    }
}

impl<C: Collection> TypedRepository<C> {
    /// Create a repository on `store`
    pub fn new(store: StoreHandle) -> Self {
        Self {
            repo: EntityRepository::new(store),
            _collection: PhantomData,
        }
    }

    /// Collection name
    pub fn name(&self) -> &'static str {
        C::NAME
    }

    /// Write a document
    pub fn put(&self, id: &str, doc: &C::Doc) -> Result<()> {
        self.repo.set_entity(C::NAME, id, doc)
    }

    /// Read a document
    pub fn get(&self, id: &str) -> Result<Option<C::Doc>> {
        self.repo.get_entity(C::NAME, id)
    }

    /// Read a document that must exist
    pub fn require(&self, id: &str) -> Result<C::Doc> {
        self.repo.require_entity(C::NAME, id)
    }

    /// Every `(id, document)`, in no defined order
    pub fn all(&self) -> Result<Vec<(String, C::Doc)>> {
        self.repo.get_all_with_ids(C::NAME)
    }

    /// Remove a document
    pub fn delete(&self, id: &str) -> Result<bool> {
        self.repo.delete_entity(C::NAME, id)
    }

    /// Full-scan lookup, see [`EntityRepository::get_entity_by_field`]
    pub fn find_by_field(&self, field: &str, value: impl Into<JsonScalar>) -> Result<Option<C::Doc>> {
        self.repo.get_entity_by_field(C::NAME, field, value)
    }

    /// Whether a document exists
    pub fn exists(&self, id: &str) -> Result<bool> {
        self.repo.exists(C::NAME, id)
    }

    /// Number of documents
    pub fn count(&self) -> Result<usize> {
        self.repo.count(C::NAME)
    }
}

/// The campaign collections
///
/// Documents are schema-less JSON; any other collection can be reached by
/// name through [`EntityRepository`].
pub mod collections {
    use super::Collection;

    macro_rules! json_collection {
        ($(#[$doc:meta])* $ty:ident => $name:literal) => {
            $(#[$doc])*
            #[derive(Debug, Clone, Copy)]
            pub struct $ty;

            impl Collection for $ty {
                const NAME: &'static str = $name;
                type Doc = serde_json::Value;
            }
        };
    }

    json_collection!(
        /// `users`
        Users => "users"
    );
    json_collection!(
        /// `events`
        Events => "events"
    );
    json_collection!(
        /// `messages`
        Messages => "messages"
    );
    json_collection!(
        /// `message_templates`
        MessageTemplates => "message_templates"
    );
    json_collection!(
        /// `volunteers`
        Volunteers => "volunteers"
    );
    json_collection!(
        /// `alerts`
        Alerts => "alerts"
    );
    json_collection!(
        /// `n8n_workflows`: workflow definitions handed to the orchestrator
        Workflows => "n8n_workflows"
    );
    json_collection!(
        /// `executions`
        Executions => "executions"
    );
    json_collection!(
        /// `territory_metrics`
        TerritoryMetrics => "territory_metrics"
    );
}
