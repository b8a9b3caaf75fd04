//! Two-phase field mapping pipeline and upsert engine
//!
//! Phase 1 (pre-mapping) turns an origin record into the attributes that
//! are written when the entity is created or updated. Phase 2
//! (post-mapping) runs after every record of a kind has been upserted and
//! can therefore resolve references into the kind's own identity map.

mod builtin;
mod mapper;
mod pipeline;

pub use builtin::{MapToLocalId, MapToLocalIds, MapToSelfId, Multilingual, RecreateChildren, Timestamp};
pub use mapper::{FieldMappers, PostMapContext, PostMapper, PreMapper};
pub use pipeline::{
    import_origin_records, import_record, post_map, upsert, BatchStats, ImportSpec, UpsertOutcome,
};
