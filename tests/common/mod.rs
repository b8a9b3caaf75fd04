//! Common test utilities for import session tests
//!
//! Remote payload builders plus store inspection helpers.

#![allow(dead_code)]

pub mod fixtures;

pub use fixtures::*;

use registry_sync::{
    DataSourceId, EntityFilter, EntityKind, EntityStore, LocalEntity, LocalId, PredicateOp, SqliteStore,
};
use serde_json::{json, Value};

/// Live entities of `kind` owned by `data_source`; soft-deleted rows excluded
pub fn live(store: &SqliteStore, kind: EntityKind, data_source: &str) -> Vec<LocalEntity> {
    store
        .query(
            &EntityFilter::new(kind)
                .with_data_source(DataSourceId::from(data_source))
                .with_predicate("deleted", PredicateOp::Ne, json!(true)),
        )
        .expect("query")
}

pub fn count_live(store: &SqliteStore, kind: EntityKind, data_source: &str) -> usize {
    live(store, kind, data_source).len()
}

pub fn by_origin(store: &SqliteStore, kind: EntityKind, origin_id: &str) -> LocalEntity {
    store
        .query(&EntityFilter::by_origin(kind, &DATA_SOURCE.into(), origin_id))
        .expect("query")
        .pop()
        .unwrap_or_else(|| panic!("no {kind} with origin id {origin_id}"))
}

/// Children of `kind` pointing at `event_id`
pub fn children(store: &SqliteStore, kind: EntityKind, event_id: &LocalId) -> Vec<LocalEntity> {
    store
        .query(&EntityFilter::new(kind).with_predicate(
            "event_id",
            PredicateOp::Eq,
            Value::String(event_id.to_string()),
        ))
        .expect("query")
}

/// Store an entity owned by another data source, addressed by its local id
pub fn seed_common(store: &SqliteStore, kind: EntityKind, id: &str, data_source: &str) {
    let entity = LocalEntity::new(kind, LocalId::from(id), DataSourceId::from(data_source))
        .with_attribute("name", json!(id));
    store.create(&entity).expect("seed");
}

/// Every entity with metadata stripped, for comparing store states
pub fn snapshot(store: &SqliteStore) -> Vec<(EntityKind, String, Value)> {
    let kinds = [
        EntityKind::Organization,
        EntityKind::Place,
        EntityKind::Keyword,
        EntityKind::Event,
        EntityKind::Offer,
        EntityKind::ExternalLink,
    ];
    kinds
        .into_iter()
        .flat_map(|kind| store.query(&EntityFilter::new(kind)).expect("query"))
        .map(|e| (e.kind, e.id.to_string(), Value::Object(e.attributes)))
        .collect()
}
