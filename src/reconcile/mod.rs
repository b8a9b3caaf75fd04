//! Mark-and-sweep reconciliation of one entity kind under one data source

mod threshold;

pub use threshold::SafetyThreshold;

use crate::entity::{Attributes, DataSourceId, DeletePolicy, EntityKind, LocalId};
use crate::error::{SyncError, SyncResult};
use crate::storage::{EntityFilter, EntityStore, PredicateOp, ID_CHUNK};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Outcome of a completed sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Entities that existed before the run
    pub existing: usize,
    /// Pre-existing entities marked or pinned during the run
    pub kept: usize,
    /// Entities removed or soft-deleted
    pub deleted: usize,
}

/// Tracks which pre-existing entities are still present remotely.
///
/// `finish` consumes the reconciler so a sweep runs at most once.
#[derive(Debug)]
pub struct Reconciler {
    kind: EntityKind,
    data_source: DataSourceId,
    policy: DeletePolicy,
    threshold: SafetyThreshold,
    existing: BTreeSet<LocalId>,
    marked: BTreeSet<LocalId>,
}

impl Reconciler {
    /// Snapshot the ids of every entity of `kind` owned by `data_source`.
    ///
    /// Under the soft-delete policy, rows already flagged `deleted` are not
    /// candidates.
    pub fn load(
        store: &dyn EntityStore,
        kind: EntityKind,
        data_source: &DataSourceId,
        policy: DeletePolicy,
        threshold: SafetyThreshold,
    ) -> SyncResult<Self> {
        let mut filter = EntityFilter::new(kind).with_data_source(data_source.clone());
        if policy == DeletePolicy::Soft {
            filter = filter.with_predicate("deleted", PredicateOp::Ne, Value::Bool(true));
        }
        let existing: BTreeSet<LocalId> = store.query(&filter)?.into_iter().map(|e| e.id).collect();
        debug!(kind = %kind, data_source = %data_source, existing = existing.len(), "reconciler loaded");

        Ok(Self {
            kind,
            data_source: data_source.clone(),
            policy,
            threshold,
            existing,
            marked: BTreeSet::new(),
        })
    }

    /// Record that an entity is present remotely. Idempotent.
    pub fn mark(&mut self, id: &LocalId) {
        self.marked.insert(id.clone());
    }

    /// Keep entities alive although they were absent from the fetch.
    pub fn pin<'a>(&mut self, ids: impl IntoIterator<Item = &'a LocalId>) {
        for id in ids {
            self.mark(id);
        }
    }

    /// Pin every entity of this reconciler's kind and data source matching `filter`.
    ///
    /// Returns the number of entities matched.
    pub fn pin_matching(&mut self, store: &dyn EntityStore, filter: EntityFilter) -> SyncResult<usize> {
        let filter = EntityFilter {
            kind: self.kind,
            data_source: Some(self.data_source.clone()),
            ..filter
        };
        let matched = store.query(&filter)?;
        for entity in &matched {
            self.mark(&entity.id);
        }
        Ok(matched.len())
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Pre-existing ids that have not been marked
    pub fn pending_deletions(&self) -> Vec<LocalId> {
        self.existing.difference(&self.marked).cloned().collect()
    }

    /// Sweep unmarked pre-existing entities.
    ///
    /// Without `force`, a sweep that trips the safety threshold deletes
    /// nothing and fails with [`SyncError::SafetyThreshold`].
    pub fn finish(self, store: &dyn EntityStore, force: bool) -> SyncResult<SweepReport> {
        let to_delete = self.pending_deletions();
        let existing = self.existing.len();

        if !force && self.threshold.is_exceeded(to_delete.len(), existing) {
            return Err(SyncError::SafetyThreshold {
                kind: self.kind,
                data_source: self.data_source,
                to_delete: to_delete.len(),
                existing,
            });
        }

        let mut deleted = 0;
        for chunk in to_delete.chunks(ID_CHUNK) {
            let filter = EntityFilter::new(self.kind)
                .with_data_source(self.data_source.clone())
                .with_ids(chunk.to_vec());
            deleted += match self.policy {
                DeletePolicy::Hard => store.delete(&filter)?,
                DeletePolicy::Soft => {
                    let mut flag = Attributes::new();
                    flag.insert("deleted".to_string(), Value::Bool(true));
                    store.update(&filter, &flag)?
                }
            };
        }

        if deleted > 0 {
            info!(kind = %self.kind, data_source = %self.data_source, deleted, "swept stale entities");
        }

        Ok(SweepReport {
            existing,
            kept: existing - to_delete.len(),
            deleted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::LocalEntity;
    use crate::storage::{OpenStore, SqliteStore};
    use serde_json::json;

    fn store_with(kind: EntityKind, ds: &str, ids: &[&str]) -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        for id in ids {
            let entity = LocalEntity::new(kind, LocalId::from_string(*id), ds.into())
                .with_origin_id(*id)
                .with_attribute("name", json!(id));
            store.create(&entity).unwrap();
        }
        store
    }

    fn ids(store: &SqliteStore, kind: EntityKind, ds: &str) -> Vec<String> {
        store
            .query(&EntityFilter::new(kind).with_data_source(ds.into()))
            .unwrap()
            .into_iter()
            .map(|e| e.id.to_string())
            .collect()
    }

    #[test]
    fn sweeps_unmarked_entities() {
        let store = store_with(EntityKind::Place, "espoo", &["a", "b", "c", "d"]);
        let mut rec = Reconciler::load(
            &store,
            EntityKind::Place,
            &"espoo".into(),
            DeletePolicy::Hard,
            SafetyThreshold::unlimited(),
        )
        .unwrap();

        rec.mark(&LocalId::from("a"));
        rec.mark(&LocalId::from("c"));
        rec.mark(&LocalId::from("c"));
        // Not pre-existing; never a sweep candidate
        rec.mark(&LocalId::from("z"));

        let report = rec.finish(&store, false).unwrap();
        assert_eq!(report, SweepReport { existing: 4, kept: 2, deleted: 2 });
        assert_eq!(ids(&store, EntityKind::Place, "espoo"), vec!["a", "c"]);
    }

    #[test]
    fn other_kinds_and_sources_untouched() {
        let store = store_with(EntityKind::Place, "espoo", &["a"]);
        store
            .create(&LocalEntity::new(EntityKind::Place, "b".into(), "common".into()))
            .unwrap();
        store
            .create(&LocalEntity::new(EntityKind::Keyword, "a".into(), "espoo".into()))
            .unwrap();

        let rec = Reconciler::load(
            &store,
            EntityKind::Place,
            &"espoo".into(),
            DeletePolicy::Hard,
            SafetyThreshold::unlimited(),
        )
        .unwrap();
        let report = rec.finish(&store, false).unwrap();

        assert_eq!(report.deleted, 1);
        assert_eq!(ids(&store, EntityKind::Place, "common"), vec!["b"]);
        assert_eq!(ids(&store, EntityKind::Keyword, "espoo"), vec!["a"]);
    }

    #[test]
    fn empty_batch_trips_safety_valve() {
        let store = store_with(EntityKind::Keyword, "espoo", &["a", "b", "c"]);
        let load = |store: &SqliteStore| {
            Reconciler::load(
                store,
                EntityKind::Keyword,
                &"espoo".into(),
                DeletePolicy::Hard,
                SafetyThreshold::default(),
            )
            .unwrap()
        };

        let err = load(&store).finish(&store, false).unwrap_err();
        assert!(matches!(
            err,
            SyncError::SafetyThreshold { to_delete: 3, existing: 3, .. }
        ));
        assert_eq!(ids(&store, EntityKind::Keyword, "espoo").len(), 3);

        let report = load(&store).finish(&store, true).unwrap();
        assert_eq!(report.deleted, 3);
        assert!(ids(&store, EntityKind::Keyword, "espoo").is_empty());
    }

    #[test]
    fn soft_delete_flags_instead_of_removing() {
        let store = store_with(EntityKind::Event, "espoo", &["e1", "e2"]);
        let mut rec = Reconciler::load(
            &store,
            EntityKind::Event,
            &"espoo".into(),
            DeletePolicy::Soft,
            SafetyThreshold::unlimited(),
        )
        .unwrap();
        rec.mark(&LocalId::from("e1"));
        assert_eq!(rec.finish(&store, false).unwrap().deleted, 1);

        let events = store.query(&EntityFilter::new(EntityKind::Event)).unwrap();
        assert_eq!(events.len(), 2);
        let e2 = events.iter().find(|e| e.id.as_str() == "e2").unwrap();
        assert!(e2.is_deleted());

        // Already soft-deleted rows are not candidates on the next run
        let rec = Reconciler::load(
            &store,
            EntityKind::Event,
            &"espoo".into(),
            DeletePolicy::Soft,
            SafetyThreshold::unlimited(),
        )
        .unwrap();
        assert_eq!(rec.pending_deletions(), vec![LocalId::from("e1")]);
    }

    #[test]
    fn pinned_entities_survive() {
        let store = store_with(EntityKind::Event, "espoo", &["old", "new"]);
        store
            .update(
                &EntityFilter::by_id(EntityKind::Event, &"old".into()),
                &json!({"end_time": "2020-01-01T00:00:00Z"}).as_object().unwrap().clone(),
            )
            .unwrap();

        let mut rec = Reconciler::load(
            &store,
            EntityKind::Event,
            &"espoo".into(),
            DeletePolicy::Soft,
            SafetyThreshold::unlimited(),
        )
        .unwrap();
        let pinned = rec
            .pin_matching(
                &store,
                EntityFilter::new(EntityKind::Event).with_predicate(
                    "end_time",
                    PredicateOp::Lt,
                    json!("2021-01-01T00:00:00Z"),
                ),
            )
            .unwrap();
        assert_eq!(pinned, 1);
        assert_eq!(rec.pending_deletions(), vec![LocalId::from("new")]);
    }
}
