//! Document store adapter layer.
//!
//! Architecture:
//! ```text
//! ┌──────────────┐   insert / find / update / delete   ┌────────────────┐
//! │ UpdateLog    │ ──────────────────────────────────► │ DocumentStore  │
//! │ SV cache     │                                     │ (adapter)      │
//! │ MetaStore    │                                     └───────┬────────┘
//! └──────────────┘                                             │
//!                                         ┌────────────────────┼──────────────┐
//!                                         ▼                    ▼              ▼
//!                                  "updates"           "state_vectors"     "meta"
//!                               (doc_name, clock)        (doc_name)    (doc_name, key)
//! ```
//!
//! Every collection is ordered by its natural key, and that key is the only
//! unique index an adapter has to support. Two adapters ship with the crate:
//! [`MemoryStore`] and [`RocksStore`].

pub mod memory;
pub mod rocks;

pub use memory::MemoryStore;
pub use rocks::{RocksConfig, RocksStore};

use async_trait::async_trait;
use std::sync::Arc;

/// Position of an update in a document's append log.
pub type Clock = u64;

/// Named collections of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Append log: one record per `(doc_name, clock)`
    Updates,
    /// Cached state vectors: one record per `doc_name`
    StateVectors,
    /// Per-document key/value metadata: one record per `(doc_name, key)`
    Meta,
}

impl Collection {
    /// All collections, in the order they are created and cleared.
    pub const ALL: [Collection; 3] = [Collection::Updates, Collection::StateVectors, Collection::Meta];

    /// Collection name as used by adapters.
    pub fn name(self) -> &'static str {
        match self {
            Collection::Updates => "updates",
            Collection::StateVectors => "state_vectors",
            Collection::Meta => "meta",
        }
    }

    /// Fields of the natural (unique) key.
    pub fn key_fields(self) -> &'static [&'static str] {
        match self {
            Collection::Updates => &["doc_name", "clock"],
            Collection::StateVectors => &["doc_name"],
            Collection::Meta => &["doc_name", "key"],
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One entry in a document's append log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRecord {
    pub doc_name: String,
    pub clock: Clock,
    /// Opaque update blob, only understood by the merge engine
    pub payload: Vec<u8>,
}

/// Cached summary of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateVectorRecord {
    pub doc_name: String,
    pub state_vector: Vec<u8>,
    /// Highest update clock known when the summary was computed
    pub clock: Clock,
}

/// One key/value entry in a document's metadata namespace.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaRecord {
    pub doc_name: String,
    pub key: String,
    pub value: serde_json::Value,
}

/// A record of any collection.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Update(UpdateRecord),
    StateVector(StateVectorRecord),
    Meta(MetaRecord),
}

impl Record {
    /// Collection this record belongs to.
    pub fn collection(&self) -> Collection {
        match self {
            Record::Update(_) => Collection::Updates,
            Record::StateVector(_) => Collection::StateVectors,
            Record::Meta(_) => Collection::Meta,
        }
    }

    pub fn doc_name(&self) -> &str {
        match self {
            Record::Update(r) => &r.doc_name,
            Record::StateVector(r) => &r.doc_name,
            Record::Meta(r) => &r.doc_name,
        }
    }

    pub fn into_update(self) -> Result<UpdateRecord, StoreError> {
        match self {
            Record::Update(r) => Ok(r),
            other => Err(StoreError::unexpected(Collection::Updates, &other)),
        }
    }

    pub fn into_state_vector(self) -> Result<StateVectorRecord, StoreError> {
        match self {
            Record::StateVector(r) => Ok(r),
            other => Err(StoreError::unexpected(Collection::StateVectors, &other)),
        }
    }

    pub fn into_meta(self) -> Result<MetaRecord, StoreError> {
        match self {
            Record::Meta(r) => Ok(r),
            other => Err(StoreError::unexpected(Collection::Meta, &other)),
        }
    }
}

/// Predicate on update clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockFilter {
    Eq(Clock),
    Below(Clock),
}

impl ClockFilter {
    fn matches(self, clock: Clock) -> bool {
        match self {
            ClockFilter::Eq(c) => clock == c,
            ClockFilter::Below(c) => clock < c,
        }
    }
}

/// Record filter. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    pub doc_name: Option<String>,
    pub key: Option<String>,
    pub clock: Option<ClockFilter>,
}

impl Filter {
    /// Match every record of a collection.
    pub fn all() -> Self {
        Self::default()
    }

    /// Match all records of one document.
    pub fn doc(doc_name: impl Into<String>) -> Self {
        Self {
            doc_name: Some(doc_name.into()),
            ..Self::default()
        }
    }

    /// Match one metadata entry.
    pub fn meta_key(doc_name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            doc_name: Some(doc_name.into()),
            key: Some(key.into()),
            clock: None,
        }
    }

    pub fn clock_eq(mut self, clock: Clock) -> Self {
        self.clock = Some(ClockFilter::Eq(clock));
        self
    }

    pub fn clock_below(mut self, clock: Clock) -> Self {
        self.clock = Some(ClockFilter::Below(clock));
        self
    }

    /// Evaluate the filter against a record.
    ///
    /// `key` only constrains metadata records and `clock` only constrains
    /// update records.
    pub fn matches(&self, record: &Record) -> bool {
        if let Some(name) = &self.doc_name {
            if record.doc_name() != name {
                return false;
            }
        }
        match record {
            Record::Update(r) => self.clock.map_or(true, |c| c.matches(r.clock)),
            Record::Meta(r) => self.key.as_ref().map_or(true, |k| &r.key == k),
            Record::StateVector(_) => true,
        }
    }
}

/// Result ordering, over the collection's natural key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sort {
    #[default]
    Ascending,
    Descending,
}

/// Storage errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A unique key already exists
    DuplicateKey { collection: Collection, key: String },
    /// The adapter cannot maintain the requested index
    UnsupportedIndex { collection: Collection, fields: Vec<String> },
    /// Backend internal error
    DatabaseError(String),
    /// The backing store cannot be reached
    ConnectionError(String),
    /// The adapter was closed
    Closed,
    /// A record of the wrong kind was found or supplied
    UnexpectedRecord { collection: Collection, found: Collection },
    /// Serialization failed
    SerializationError(String),
    /// Deserialization failed
    DeserializationError(String),
    /// Compression error
    CompressionError(String),
}

impl StoreError {
    fn unexpected(collection: Collection, found: &Record) -> Self {
        StoreError::UnexpectedRecord {
            collection,
            found: found.collection(),
        }
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::DuplicateKey { collection, key } => {
                write!(f, "Duplicate key in {collection}: {key}")
            }
            StoreError::UnsupportedIndex { collection, fields } => {
                write!(f, "Unsupported index on {collection}: {}", fields.join(", "))
            }
            StoreError::DatabaseError(e) => write!(f, "Database error: {e}"),
            StoreError::ConnectionError(e) => write!(f, "Connection error: {e}"),
            StoreError::Closed => write!(f, "Store is closed"),
            StoreError::UnexpectedRecord { collection, found } => {
                write!(f, "Expected a {collection} record, found a {found} record")
            }
            StoreError::SerializationError(e) => write!(f, "Serialization error: {e}"),
            StoreError::DeserializationError(e) => write!(f, "Deserialization error: {e}"),
            StoreError::CompressionError(e) => write!(f, "Compression error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Validate an index declaration against a collection's natural key.
pub(crate) fn check_index(collection: Collection, fields: &[&str]) -> Result<(), StoreError> {
    if fields == collection.key_fields() {
        Ok(())
    } else {
        Err(StoreError::UnsupportedIndex {
            collection,
            fields: fields.iter().map(|f| (*f).to_string()).collect(),
        })
    }
}

/// Collection-scoped document store.
///
/// Implementations are shared by reference across one persistence instance;
/// the persistence layer never holds a record beyond a single operation.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Declare an index. Only the collection's natural key is supported, and
    /// it is unique whenever declared.
    async fn create_index(
        &self,
        collection: Collection,
        fields: &[&str],
        unique: bool,
    ) -> Result<(), StoreError>;

    /// Insert a record; fails with [`StoreError::DuplicateKey`] if its key exists.
    async fn insert_one(&self, record: Record) -> Result<(), StoreError>;

    /// First matching record in ascending key order.
    async fn find_one(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<Option<Record>, StoreError>;

    /// Matching records in key order, truncated to `limit`.
    async fn find(
        &self,
        collection: Collection,
        filter: &Filter,
        sort: Sort,
        limit: Option<usize>,
    ) -> Result<Vec<Record>, StoreError>;

    /// Replace the first matching record with `record`, or insert it when
    /// nothing matches and `upsert` is set. Returns the number of matched records.
    async fn update_one(
        &self,
        collection: Collection,
        filter: &Filter,
        record: Record,
        upsert: bool,
    ) -> Result<u64, StoreError>;

    /// Delete the first matching record. Returns the number deleted.
    async fn delete_one(&self, collection: Collection, filter: &Filter) -> Result<u64, StoreError>;

    /// Delete all matching records. Returns the number deleted.
    async fn delete_many(&self, collection: Collection, filter: &Filter)
        -> Result<u64, StoreError>;

    /// Release the backend. Later calls fail with [`StoreError::Closed`].
    async fn close(&self) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: DocumentStore + ?Sized> DocumentStore for Arc<T> {
    async fn create_index(
        &self,
        collection: Collection,
        fields: &[&str],
        unique: bool,
    ) -> Result<(), StoreError> {
        (**self).create_index(collection, fields, unique).await
    }

    async fn insert_one(&self, record: Record) -> Result<(), StoreError> {
        (**self).insert_one(record).await
    }

    async fn find_one(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<Option<Record>, StoreError> {
        (**self).find_one(collection, filter).await
    }

    async fn find(
        &self,
        collection: Collection,
        filter: &Filter,
        sort: Sort,
        limit: Option<usize>,
    ) -> Result<Vec<Record>, StoreError> {
        (**self).find(collection, filter, sort, limit).await
    }

    async fn update_one(
        &self,
        collection: Collection,
        filter: &Filter,
        record: Record,
        upsert: bool,
    ) -> Result<u64, StoreError> {
        (**self).update_one(collection, filter, record, upsert).await
    }

    async fn delete_one(&self, collection: Collection, filter: &Filter) -> Result<u64, StoreError> {
        (**self).delete_one(collection, filter).await
    }

    async fn delete_many(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<u64, StoreError> {
        (**self).delete_many(collection, filter).await
    }

    async fn close(&self) -> Result<(), StoreError> {
        (**self).close().await
    }
}
