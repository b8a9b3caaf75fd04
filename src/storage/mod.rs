//! Storage backends for the synchronizer
//!
//! The engine consumes persistence through the `EntityStore` trait.
//! The bundled implementation is `SqliteStore`.

mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{
    AttributePredicate, EntityFilter, EntityStore, OpenStore, PredicateOp, StorageError,
    StorageResult, ID_CHUNK,
};
