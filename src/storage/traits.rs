//! Storage trait definitions

use crate::entity::{Attributes, DataSourceId, EntityKind, LocalEntity, LocalId};
use serde_json::Value;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParse(String),

    #[error("Unknown entity kind: {0}")]
    UnknownKind(String),

    #[error("Connection lock poisoned")]
    LockPoisoned,

    #[error("Transaction error: {0}")]
    Transaction(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Ids bound per statement when a filter carries an id set
pub const ID_CHUNK: usize = 500;

/// Comparison applied to a single attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredicateOp {
    Eq,
    /// Not equal; a missing attribute also matches
    Ne,
    Lt,
}

/// Filter on one attribute value
#[derive(Debug, Clone, PartialEq)]
pub struct AttributePredicate {
    pub field: String,
    pub op: PredicateOp,
    pub value: Value,
}

/// Filter criteria for entity operations
///
/// Every filter is scoped to one entity kind.
#[derive(Debug, Clone)]
pub struct EntityFilter {
    pub kind: EntityKind,
    /// Only entities owned by this data source
    pub data_source: Option<DataSourceId>,
    /// Only entities NOT owned by this data source
    pub exclude_data_source: Option<DataSourceId>,
    pub origin_id: Option<String>,
    /// Only entities whose local id is in this set
    pub ids: Option<Vec<LocalId>>,
    pub predicates: Vec<AttributePredicate>,
}

impl EntityFilter {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            data_source: None,
            exclude_data_source: None,
            origin_id: None,
            ids: None,
            predicates: Vec::new(),
        }
    }

    /// Filter matching the (data source, origin id) key of the upsert engine
    pub fn by_origin(kind: EntityKind, data_source: &DataSourceId, origin_id: &str) -> Self {
        Self::new(kind)
            .with_data_source(data_source.clone())
            .with_origin_id(origin_id)
    }

    /// Filter matching exactly one local id
    pub fn by_id(kind: EntityKind, id: &LocalId) -> Self {
        Self::new(kind).with_ids(vec![id.clone()])
    }

    pub fn with_data_source(mut self, data_source: DataSourceId) -> Self {
        self.data_source = Some(data_source);
        self
    }

    pub fn excluding_data_source(mut self, data_source: DataSourceId) -> Self {
        self.exclude_data_source = Some(data_source);
        self
    }

    pub fn with_origin_id(mut self, origin_id: impl Into<String>) -> Self {
        self.origin_id = Some(origin_id.into());
        self
    }

    pub fn with_ids(mut self, ids: Vec<LocalId>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn with_predicate(mut self, field: impl Into<String>, op: PredicateOp, value: Value) -> Self {
        self.predicates.push(AttributePredicate {
            field: field.into(),
            op,
            value,
        });
        self
    }
}

/// Trait for entity storage backends
///
/// The upsert engine and the reconciler need only the five filter-scoped
/// operations; the import session additionally wraps a run in one
/// transaction.
pub trait EntityStore: Send + Sync {
    /// Insert a new entity. Fails if the (kind, id) key is taken.
    fn create(&self, entity: &LocalEntity) -> StorageResult<()>;

    /// Overwrite the given attributes on every matching entity, leaving
    /// other attributes untouched. Returns the number of entities updated.
    fn update(&self, filter: &EntityFilter, attributes: &Attributes) -> StorageResult<usize>;

    /// Count matching entities
    fn count(&self, filter: &EntityFilter) -> StorageResult<usize>;

    /// Load matching entities
    fn query(&self, filter: &EntityFilter) -> StorageResult<Vec<LocalEntity>>;

    /// Load entities matching `filter` whose id is in `ids`, one query per
    /// [`ID_CHUNK`] ids.
    fn query_ids(&self, filter: &EntityFilter, ids: &[LocalId]) -> StorageResult<Vec<LocalEntity>> {
        let mut found = Vec::new();
        for chunk in ids.chunks(ID_CHUNK) {
            found.extend(self.query(&filter.clone().with_ids(chunk.to_vec()))?);
        }
        Ok(found)
    }

    /// Delete matching entities, returning how many were removed
    fn delete(&self, filter: &EntityFilter) -> StorageResult<usize>;

    // === Transactions ===

    fn begin(&self) -> StorageResult<()>;

    fn commit(&self) -> StorageResult<()>;

    fn rollback(&self) -> StorageResult<()>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: EntityStore + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}
