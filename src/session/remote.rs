//! Everything a run needs from the remote API, fetched before any write

use crate::config::SyncConfig;
use crate::entity::{DataSourceId, EntityKind, LocalEntity, LocalId, OriginRecord, Relation};
use crate::error::SyncResult;
use crate::fetch::Fetcher;
use crate::prune::purge_orphans;
use crate::storage::{EntityFilter, EntityStore};
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, info};

/// Related records always embedded in event listings
const EVENT_INCLUDES: &str = "keywords,audience,location";

/// Remote records of one run, grouped by kind
#[derive(Debug, Default)]
pub(crate) struct RemoteData {
    /// Publishers referenced by places, keywords or events
    pub organizations: Vec<OriginRecord>,
    pub places: Vec<OriginRecord>,
    pub keywords: Vec<OriginRecord>,
    pub events: Vec<OriginRecord>,
    /// Referenced publishers already stored under another data source
    pub local_publishers: Vec<LocalEntity>,
    /// Events dropped for an unresolvable `super_event`
    pub pruned: usize,
}

/// Records in first-seen order, unique by origin id
#[derive(Default)]
struct UniqueRecords {
    seen: HashSet<String>,
    records: Vec<OriginRecord>,
}

impl UniqueRecords {
    fn push(&mut self, record: OriginRecord) {
        if self.seen.insert(record.origin_id().to_string()) {
            self.records.push(record);
        }
    }

    fn contains(&self, origin_id: &str) -> bool {
        self.seen.contains(origin_id)
    }
}

pub(crate) async fn fetch_remote(
    fetcher: &dyn Fetcher,
    store: &dyn EntityStore,
    config: &SyncConfig,
) -> SyncResult<RemoteData> {
    let data_source = config.data_source_id();

    let organizations = fetcher.list(&config.resource_url("organization"), &[]).await?;

    let mut params = vec![("include".to_string(), EVENT_INCLUDES.to_string())];
    params.extend(
        config
            .event_query_params
            .iter()
            .map(|(k, v)| (k.clone(), v.clone())),
    );
    let events = fetcher.list(&config.resource_url("event"), &params).await?;

    let fetched = events.len();
    let events = purge_orphans(events, "super_event");
    let pruned = fetched - events.len();

    let places = related_records(fetcher, config, "place", &events, &["location"]).await?;
    let keywords = related_records(fetcher, config, "keyword", &events, &["keywords", "audience"]).await?;

    let (organizations, local_publishers) = publishers(
        fetcher,
        store,
        config,
        &data_source,
        organizations,
        [places.as_slice(), keywords.as_slice(), events.as_slice()],
    )
    .await?;

    info!(
        organizations = organizations.len(),
        places = places.len(),
        keywords = keywords.len(),
        events = events.len(),
        pruned,
        "fetched remote data"
    );

    Ok(RemoteData {
        organizations,
        places,
        keywords,
        events,
        local_publishers,
        pruned,
    })
}

/// Collect the records related through `fields`.
///
/// Embedded records are taken as they are; relations known only by id are
/// fetched one by one from the resource.
async fn related_records(
    fetcher: &dyn Fetcher,
    config: &SyncConfig,
    resource: &str,
    events: &[OriginRecord],
    fields: &[&str],
) -> SyncResult<Vec<OriginRecord>> {
    let mut related = UniqueRecords::default();
    let mut references = Vec::new();

    for event in events {
        for field in fields {
            let value = event.value(field);
            let values: Vec<&Value> = match value.as_array() {
                Some(items) => items.iter().collect(),
                None => vec![value],
            };
            for value in values {
                let Some(relation) = Relation::from_value(value)? else {
                    continue;
                };
                match relation {
                    Relation::Embedded(record) => related.push(record),
                    Relation::Reference(id) => references.push(id),
                }
            }
        }
    }

    for id in references {
        if related.contains(&id) {
            continue;
        }
        debug!(resource, id = %id, "fetching referenced record");
        related.push(fetcher.get(&config.record_url(resource, &id)).await?);
    }
    Ok(related.records)
}

/// Select the organizations to import: listed or individually fetched
/// publishers of the batch. Publishers that already exist locally under
/// another data source are returned as entities instead.
async fn publishers(
    fetcher: &dyn Fetcher,
    store: &dyn EntityStore,
    config: &SyncConfig,
    data_source: &DataSourceId,
    listed: Vec<OriginRecord>,
    batches: [&[OriginRecord]; 3],
) -> SyncResult<(Vec<OriginRecord>, Vec<LocalEntity>)> {
    let mut referenced: Vec<String> = Vec::new();
    for record in batches.into_iter().flatten() {
        if let Some(id) = record.relation_id("publisher")? {
            if !referenced.contains(&id) {
                referenced.push(id);
            }
        }
    }

    let mut selected = UniqueRecords::default();
    for record in listed {
        if referenced.iter().any(|id| id == record.origin_id()) {
            selected.push(record);
        }
    }

    let unlisted: Vec<LocalId> = referenced
        .iter()
        .filter(|id| !selected.contains(id))
        .map(|id| LocalId::from_string(id.as_str()))
        .collect();
    let local = store.query_ids(
        &EntityFilter::new(EntityKind::Organization).excluding_data_source(data_source.clone()),
        &unlisted,
    )?;

    for id in unlisted {
        if local.iter().any(|org| org.id == id) {
            continue;
        }
        debug!(id = %id, "fetching unlisted publisher");
        selected.push(
            fetcher
                .get(&config.record_url("organization", id.as_str()))
                .await?,
        );
    }
    Ok((selected.records, local))
}
