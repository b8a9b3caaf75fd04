//! Error taxonomy of an import run

use crate::config::ConfigError;
use crate::entity::{DataSourceId, EntityKind};
use crate::fetch::FetchError;
use crate::storage::StorageError;
use thiserror::Error;

/// Errors raised by the synchronization engine.
///
/// Everything except [`SyncError::SafetyThreshold`] aborts the import
/// session and rolls back its transaction.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Remote fetch failed: bad status, retries or page budget exhausted
    #[error("transport error: {0}")]
    Transport(#[from] FetchError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// More than one local entity shares a (data source, origin id) key
    #[error(
        "data integrity violation: {count} {kind} entities in data source {data_source} \
         share origin id {origin_id}"
    )]
    DataIntegrity {
        kind: EntityKind,
        data_source: DataSourceId,
        origin_id: String,
        count: usize,
    },

    /// A relation is absent from the identity map it must resolve through
    #[error("cannot resolve {field} reference {reference} to a local {target} id")]
    UnresolvableReference {
        field: String,
        reference: String,
        target: EntityKind,
    },

    /// The sweep would delete more than the configured threshold allows
    #[error(
        "refusing to delete {to_delete} of {existing} {kind} entities in data source \
         {data_source}; rerun with force to override"
    )]
    SafetyThreshold {
        kind: EntityKind,
        data_source: DataSourceId,
        to_delete: usize,
        existing: usize,
    },

    #[error("invalid origin record: {0}")]
    InvalidRecord(String),

    /// A destructive child recreate was requested for a field outside its allow-list
    #[error("field '{field}' is not allowed to recreate child rows")]
    RecreateNotAllowed { field: String },
}

impl SyncError {
    /// False for conditions the session reports and continues past.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::SafetyThreshold { .. })
    }
}

/// Result type for synchronization operations
pub type SyncResult<T> = Result<T, SyncError>;
