//! Cross-source deduplication

use crate::entity::{DataSourceId, EntityKind, LocalEntity, LocalId, OriginRecord};
use crate::error::SyncResult;
use crate::storage::{EntityFilter, EntityStore};
use std::collections::HashSet;
use tracing::debug;

/// Split a batch into entities already owned by another data source and
/// records that still need importing.
///
/// A record whose origin id equals the local id of an entity of the same
/// kind under a *different* data source refers to a shared, canonical
/// object (e.g. a place from a common place registry). Such records are
/// not re-imported.
pub fn split_common(
    store: &dyn EntityStore,
    kind: EntityKind,
    data_source: &DataSourceId,
    records: Vec<OriginRecord>,
) -> SyncResult<(Vec<LocalEntity>, Vec<OriginRecord>)> {
    let ids: Vec<LocalId> = {
        let mut seen = HashSet::new();
        records
            .iter()
            .map(OriginRecord::origin_id)
            .filter(|id| seen.insert(*id))
            .map(LocalId::from)
            .collect()
    };

    let existing = store.query_ids(
        &EntityFilter::new(kind).excluding_data_source(data_source.clone()),
        &ids,
    )?;

    let common_ids: HashSet<String> = existing.iter().map(|e| e.id.to_string()).collect();
    let remaining: Vec<OriginRecord> = records
        .into_iter()
        .filter(|r| !common_ids.contains(r.origin_id()))
        .collect();

    debug!(
        kind = %kind,
        common = existing.len(),
        remaining = remaining.len(),
        "split shared entities from batch"
    );

    Ok((existing, remaining))
}
