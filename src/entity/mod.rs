//! Entity model shared by every stage of the synchronizer

mod id;
mod local;
mod record;

pub use id::{DataSourceId, LocalId};
pub use local::{Attributes, DeletePolicy, EntityKind, EntityMetadata, LocalEntity};
pub use record::{relation_id, OriginRecord, Relation};
