//! Upsert engine and the per-kind import driver

use super::mapper::{FieldMappers, PostMapContext, PostMapper, PreMapper};
use crate::entity::{Attributes, DataSourceId, EntityKind, LocalEntity, LocalId, OriginRecord};
use crate::error::{SyncError, SyncResult};
use crate::identity::IdentityMap;
use crate::reconcile::Reconciler;
use crate::storage::{EntityFilter, EntityStore};
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

/// How an entity kind is imported
pub struct ImportSpec {
    pub kind: EntityKind,
    /// Generate local ids instead of reusing origin ids
    pub auto_pk: bool,
    /// Fields copied verbatim from the origin record
    pub copy_fields: Vec<String>,
    pub pre_mappers: FieldMappers<dyn PreMapper>,
    pub post_mappers: FieldMappers<dyn PostMapper>,
}

impl ImportSpec {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            auto_pk: kind.uses_auto_pk(),
            copy_fields: Vec::new(),
            pre_mappers: FieldMappers::new(),
            post_mappers: FieldMappers::new(),
        }
    }

    pub fn copy(mut self, fields: &[&str]) -> Self {
        self.copy_fields.extend(fields.iter().map(|f| f.to_string()));
        self
    }

    pub fn pre(mut self, field: impl Into<String>, mapper: impl PreMapper + 'static) -> Self {
        self.pre_mappers.register(field, Box::new(mapper));
        self
    }

    pub fn post(mut self, field: impl Into<String>, mapper: impl PostMapper + 'static) -> Self {
        self.post_mappers.register(field, Box::new(mapper));
        self
    }

    /// Phase 1: copied fields, then every pre-mapper in registration order.
    pub fn pre_map(&self, record: &OriginRecord) -> SyncResult<Attributes> {
        let mut attributes: Attributes = self
            .copy_fields
            .iter()
            .filter_map(|f| record.get(f).map(|v| (f.clone(), v.clone())))
            .collect();

        for (field, mapper) in self.pre_mappers.iter() {
            attributes = mapper.map(field, record.value(field), attributes)?;
        }
        Ok(attributes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Per-kind import counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Records satisfied by entities of another data source
    pub common: usize,
}

impl BatchStats {
    fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Created => self.created += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
        }
    }

    /// Records written or confirmed by this data source
    pub fn imported(&self) -> usize {
        self.created + self.updated + self.unchanged
    }
}

/// Create or update the entity keyed by (kind, data source, origin id).
///
/// Attributes not named in `attributes` are left as stored. Nothing is
/// written when every given attribute already holds the same value.
pub fn upsert(
    store: &dyn EntityStore,
    kind: EntityKind,
    auto_pk: bool,
    data_source: &DataSourceId,
    origin_id: &str,
    attributes: Attributes,
) -> SyncResult<(LocalEntity, UpsertOutcome)> {
    let filter = EntityFilter::by_origin(kind, data_source, origin_id);
    let integrity_error = |count| SyncError::DataIntegrity {
        kind,
        data_source: data_source.clone(),
        origin_id: origin_id.to_string(),
        count,
    };

    match store.count(&filter)? {
        0 => {
            let id = if auto_pk {
                LocalId::generate()
            } else {
                LocalId::from_string(origin_id)
            };
            let entity = LocalEntity::new(kind, id, data_source.clone())
                .with_origin_id(origin_id)
                .with_attributes(attributes);
            store.create(&entity)?;
            Ok((entity, UpsertOutcome::Created))
        }
        1 => {
            let mut entity = store
                .query(&filter)?
                .pop()
                .ok_or_else(|| integrity_error(0))?;
            if entity.has_attributes(&attributes) {
                return Ok((entity, UpsertOutcome::Unchanged));
            }
            store.update(&EntityFilter::by_id(kind, &entity.id), &attributes)?;
            entity.attributes.extend(attributes);
            entity.metadata.modified_at = Some(Utc::now());
            Ok((entity, UpsertOutcome::Updated))
        }
        count => Err(integrity_error(count)),
    }
}

/// Phase 1 for one record: map, upsert, and record the id in `identity`.
pub fn import_record(
    store: &dyn EntityStore,
    spec: &ImportSpec,
    data_source: &DataSourceId,
    record: &OriginRecord,
    identity: &mut IdentityMap,
) -> SyncResult<(LocalEntity, UpsertOutcome)> {
    let attributes = spec.pre_map(record)?;
    let (entity, outcome) = upsert(
        store,
        spec.kind,
        spec.auto_pk,
        data_source,
        record.origin_id(),
        attributes,
    )?;
    identity.insert(record.origin_id(), entity.id.clone());
    debug!(kind = %spec.kind, origin_id = record.origin_id(), id = %entity.id, ?outcome, "upserted");
    Ok((entity, outcome))
}

/// Phase 2 for one saved entity. Returns true if the entity was written.
pub fn post_map(
    store: &dyn EntityStore,
    spec: &ImportSpec,
    record: &OriginRecord,
    entity: &LocalEntity,
    identity: &IdentityMap,
) -> SyncResult<bool> {
    if spec.post_mappers.is_empty() {
        return Ok(false);
    }

    let ctx = PostMapContext {
        entity,
        identity,
        store,
    };
    let mut attributes = Attributes::new();
    for (field, mapper) in spec.post_mappers.iter() {
        attributes.extend(mapper.map(field, record.value(field), Attributes::new(), &ctx)?);
    }

    if attributes.is_empty() || entity.has_attributes(&attributes) {
        return Ok(false);
    }
    store.update(&EntityFilter::by_id(spec.kind, &entity.id), &attributes)?;
    Ok(true)
}

/// Import a batch of one kind.
///
/// `common` are entities of another data source that stand in for records
/// removed from the batch by [`crate::identity::split_common`]. Every saved
/// entity is marked in `reconciler`. Post-mapping runs only after the whole
/// batch is upserted, so self references resolve regardless of order.
pub fn import_origin_records(
    store: &dyn EntityStore,
    spec: &ImportSpec,
    data_source: &DataSourceId,
    common: &[LocalEntity],
    records: &[OriginRecord],
    reconciler: &mut Reconciler,
) -> SyncResult<(IdentityMap, BatchStats)> {
    let mut identity = IdentityMap::new(spec.kind);
    identity.seed_common(common);

    let mut saved = Vec::with_capacity(records.len());
    for record in records {
        let (entity, outcome) = import_record(store, spec, data_source, record, &mut identity)?;
        reconciler.mark(&entity.id);
        saved.push((entity, outcome));
    }

    let mut stats = BatchStats {
        common: common.len(),
        ..Default::default()
    };
    for (record, (entity, outcome)) in records.iter().zip(saved) {
        let written = post_map(store, spec, record, &entity, &identity)?;
        stats.record(match outcome {
            UpsertOutcome::Unchanged if written => UpsertOutcome::Updated,
            other => other,
        });
    }

    info!(
        kind = %spec.kind,
        data_source = %data_source,
        created = stats.created,
        updated = stats.updated,
        unchanged = stats.unchanged,
        common = stats.common,
        "imported batch"
    );
    Ok((identity, stats))
}
