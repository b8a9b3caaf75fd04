//! Import session: one synchronization run for one data source
//!
//! A run fetches everything first, then imports organizations, places,
//! keywords and events in dependency order inside a single store
//! transaction, and finally sweeps what disappeared remotely.

mod remote;
mod report;
mod specs;

pub use report::{ImportReport, SkippedSweep};
pub use specs::RECREATE_FIELDS;

use crate::config::SyncConfig;
use crate::entity::{DataSourceId, DeletePolicy, EntityKind, LocalEntity, LocalId, OriginRecord};
use crate::error::{SyncError, SyncResult};
use crate::fetch::Fetcher;
use crate::identity::{split_common, IdentityMap};
use crate::mapping::{import_origin_records, ImportSpec};
use crate::reconcile::Reconciler;
use crate::storage::{EntityFilter, EntityStore, PredicateOp};
use chrono::{DateTime, SecondsFormat, Utc};
use remote::{fetch_remote, RemoteData};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

/// Synchronize the local store with the remote API described by `config`.
///
/// Configuration and transport errors surface before anything is written.
/// Any other fatal error rolls back the whole run. A sweep refused by the
/// safety threshold is reported in [`ImportReport::skipped_sweeps`] unless
/// `force` is set; entities that unswept records still reference survive.
pub async fn run_import(
    store: &dyn EntityStore,
    fetcher: &dyn Fetcher,
    config: &SyncConfig,
    force: bool,
) -> SyncResult<ImportReport> {
    let history_cutoff = config.history_cutoff()?;
    let remote = fetch_remote(fetcher, store, config).await?;

    store.begin()?;
    let result = ImportSession::new(store, config, history_cutoff, force)
        .import(remote)
        .and_then(|report| {
            store.commit()?;
            Ok(report)
        });

    if let Err(e) = &result {
        warn!(error = %e, "import failed, rolling back");
        if let Err(rollback) = store.rollback() {
            warn!(error = %rollback, "rollback failed");
        }
    }
    result
}

/// Write phase of a run. Owns the identity maps and reconcilers, so
/// nothing is cached between runs.
struct ImportSession<'a> {
    store: &'a dyn EntityStore,
    config: &'a SyncConfig,
    data_source: DataSourceId,
    history_cutoff: DateTime<Utc>,
    force: bool,
    report: ImportReport,
}

/// Identity map and pending sweep of one imported kind
struct Imported {
    identity: IdentityMap,
    reconciler: Reconciler,
}

impl<'a> ImportSession<'a> {
    fn new(
        store: &'a dyn EntityStore,
        config: &'a SyncConfig,
        history_cutoff: DateTime<Utc>,
        force: bool,
    ) -> Self {
        Self {
            store,
            config,
            data_source: config.data_source_id(),
            history_cutoff,
            force,
            report: ImportReport::default(),
        }
    }

    fn import(mut self, remote: RemoteData) -> SyncResult<ImportReport> {
        self.report.pruned = remote.pruned;
        let config = self.config;
        let languages = &config.languages;

        let mut organizations = self.import_kind(
            &specs::organization(),
            remote.organizations,
            remote.local_publishers,
        )?;
        let mut places = self.import_kind(
            &specs::place(languages, &organizations.identity),
            remote.places,
            Vec::new(),
        )?;
        let mut keywords = self.import_kind(
            &specs::keyword(languages, &organizations.identity),
            remote.keywords,
            Vec::new(),
        )?;
        let mut events = self.import_kind(
            &specs::event(
                languages,
                &organizations.identity,
                &places.identity,
                &keywords.identity,
            ),
            remote.events,
            Vec::new(),
        )?;

        self.pin_history(&mut events.reconciler)?;
        self.sweep(events.reconciler)?;

        let referenced = self.referenced_by_live(&[EntityKind::Event])?;
        retain_referenced(&mut places.reconciler, &referenced);
        retain_referenced(&mut keywords.reconciler, &referenced);
        retain_referenced(&mut organizations.reconciler, &referenced);
        self.sweep(keywords.reconciler)?;
        self.sweep(places.reconciler)?;

        let referenced = self.referenced_by_live(&[EntityKind::Keyword, EntityKind::Place])?;
        retain_referenced(&mut organizations.reconciler, &referenced);
        self.sweep(organizations.reconciler)?;

        info!(
            data_source = %self.data_source,
            deleted = self.report.total_deleted(),
            skipped_sweeps = self.report.skipped_sweeps.len(),
            "import finished"
        );
        Ok(self.report)
    }

    /// Deduplicate against other data sources, then upsert the batch.
    ///
    /// `extra_common` are entities of other data sources that the batch
    /// references without listing them.
    fn import_kind(
        &mut self,
        spec: &ImportSpec,
        records: Vec<OriginRecord>,
        extra_common: Vec<LocalEntity>,
    ) -> SyncResult<Imported> {
        let (mut common, records) = split_common(self.store, spec.kind, &self.data_source, records)?;
        for entity in extra_common {
            if !common.iter().any(|c| c.id == entity.id) {
                common.push(entity);
            }
        }

        let mut reconciler = Reconciler::load(
            self.store,
            spec.kind,
            &self.data_source,
            spec.kind.delete_policy(),
            self.config.safety,
        )?;
        let (identity, stats) = import_origin_records(
            self.store,
            spec,
            &self.data_source,
            &common,
            &records,
            &mut reconciler,
        )?;
        self.report.stats.insert(spec.kind, stats);
        Ok(Imported {
            identity,
            reconciler,
        })
    }

    /// Keep events that ended before the history window and their parents.
    fn pin_history(&self, events: &mut Reconciler) -> SyncResult<()> {
        let cutoff = self.history_cutoff.to_rfc3339_opts(SecondsFormat::Secs, true);
        let mut pinned = self.store.query(
            &self
                .live(EntityKind::Event)
                .with_predicate("end_time", PredicateOp::Lt, Value::String(cutoff)),
        )?;

        let mut seen: BTreeSet<LocalId> = pinned.iter().map(|e| e.id.clone()).collect();
        let mut frontier = parent_ids(&pinned, &seen);
        while !frontier.is_empty() {
            seen.extend(frontier.iter().cloned());
            let parents = self
                .store
                .query_ids(&EntityFilter::new(EntityKind::Event), &frontier)?;
            frontier = parent_ids(&parents, &seen);
            pinned.extend(parents);
        }

        events.pin(pinned.iter().map(|e| &e.id));
        if !pinned.is_empty() {
            info!(events = pinned.len(), "pinned historical events");
        }
        Ok(())
    }

    /// Entities of this data source that are not deleted
    fn live(&self, kind: EntityKind) -> EntityFilter {
        let filter = EntityFilter::new(kind).with_data_source(self.data_source.clone());
        match kind.delete_policy() {
            DeletePolicy::Soft => filter.with_predicate("deleted", PredicateOp::Ne, Value::Bool(true)),
            DeletePolicy::Hard => filter,
        }
    }

    /// Local ids referenced by live entities of `kinds`, by target kind
    fn referenced_by_live(&self, kinds: &[EntityKind]) -> SyncResult<BTreeMap<EntityKind, Vec<LocalId>>> {
        let mut referenced: BTreeMap<EntityKind, Vec<LocalId>> = BTreeMap::new();
        for kind in kinds {
            for entity in self.store.query(&self.live(*kind))? {
                for (target, id) in references(&entity) {
                    referenced.entry(target).or_default().push(id);
                }
            }
        }
        Ok(referenced)
    }

    fn sweep(&mut self, reconciler: Reconciler) -> SyncResult<()> {
        let kind = reconciler.kind();
        match reconciler.finish(self.store, self.force) {
            Ok(sweep) => {
                self.report.deleted.insert(kind, sweep.deleted);
                Ok(())
            }
            Err(SyncError::SafetyThreshold {
                kind,
                to_delete,
                existing,
                ..
            }) => {
                warn!(
                    kind = %kind,
                    to_delete,
                    existing,
                    "sweep exceeds safety threshold, skipping deletions"
                );
                self.report.skipped_sweeps.push(SkippedSweep {
                    kind,
                    to_delete,
                    existing,
                });
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Pin what live entities still reference, so a skipped or partial sweep
/// upstream never leaves a dangling relation.
fn retain_referenced(reconciler: &mut Reconciler, referenced: &BTreeMap<EntityKind, Vec<LocalId>>) {
    let Some(ids) = referenced.get(&reconciler.kind()) else {
        return;
    };
    let before = reconciler.pending_deletions().len();
    reconciler.pin(ids);
    let retained = before - reconciler.pending_deletions().len();
    if retained > 0 {
        info!(
            kind = %reconciler.kind(),
            retained,
            "kept stale entities still referenced by live entities"
        );
    }
}

/// Relations of a stored entity to other kinds: `location_id`,
/// `publisher_id`, and the `keywords` and `audience` id lists
fn references(entity: &LocalEntity) -> Vec<(EntityKind, LocalId)> {
    let mut refs = Vec::new();
    for (field, target) in [
        ("location_id", EntityKind::Place),
        ("publisher_id", EntityKind::Organization),
    ] {
        if let Some(id) = entity.attribute_str(field) {
            refs.push((target, LocalId::from(id)));
        }
    }
    for field in ["keywords", "audience"] {
        let ids = entity.attribute(field).and_then(Value::as_array);
        refs.extend(
            ids.into_iter()
                .flatten()
                .filter_map(Value::as_str)
                .map(|id| (EntityKind::Keyword, LocalId::from(id))),
        );
    }
    refs
}

/// `super_event_id` values of `events` not yet in `seen`
fn parent_ids(events: &[LocalEntity], seen: &BTreeSet<LocalId>) -> Vec<LocalId> {
    let parents: BTreeSet<LocalId> = events
        .iter()
        .filter_map(|e| e.attribute_str("super_event_id"))
        .map(LocalId::from)
        .filter(|id| !seen.contains(id))
        .collect();
    parents.into_iter().collect()
}
