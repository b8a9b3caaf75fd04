//! Origin id → local id translation for one entity kind

use crate::entity::{EntityKind, LocalEntity, LocalId, Relation};
use crate::error::{SyncError, SyncResult};
use std::collections::BTreeMap;

/// Maps origin ids to local ids for one entity kind within one import session.
///
/// Seeded with entities shared from other data sources, then extended as
/// each origin record is upserted.
#[derive(Debug, Clone)]
pub struct IdentityMap {
    kind: EntityKind,
    entries: BTreeMap<String, LocalId>,
}

impl IdentityMap {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            entries: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn insert(&mut self, origin_id: impl Into<String>, local_id: LocalId) {
        self.entries.insert(origin_id.into(), local_id);
    }

    /// Seed with entities owned by another data source: `existing.id → existing.id`.
    pub fn seed_common(&mut self, common: &[LocalEntity]) {
        for entity in common {
            self.entries.insert(entity.id.to_string(), entity.id.clone());
        }
    }

    pub fn get(&self, origin_id: &str) -> Option<&LocalId> {
        self.entries.get(origin_id)
    }

    pub fn contains(&self, origin_id: &str) -> bool {
        self.entries.contains_key(origin_id)
    }

    /// Resolve a relation, failing if its id was never mapped.
    pub fn resolve(&self, field: &str, relation: &Relation) -> SyncResult<LocalId> {
        self.get(relation.id())
            .cloned()
            .ok_or_else(|| SyncError::UnresolvableReference {
                field: field.to_string(),
                reference: relation.id().to_string(),
                target: self.kind,
            })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
