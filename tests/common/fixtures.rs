//! Remote payload builders shaped like LinkedEvents API responses

use chrono::{Duration, SecondsFormat, Utc};
use registry_sync::{SafetyThreshold, StaticFetcher, SyncConfig};
use serde_json::{json, Value};
use std::collections::BTreeMap;

pub const API_URL: &str = "http://localhost/";
pub const DATA_SOURCE: &str = "espoo";

/// Config pointing at [`API_URL`] with no delays and no safety limits
pub fn test_config() -> SyncConfig {
    SyncConfig {
        api_url: API_URL.to_string(),
        data_source: DATA_SOURCE.to_string(),
        event_query_params: BTreeMap::from([("test".to_string(), "1".to_string())]),
        retry_delay_ms: 0,
        page_delay_ms: 0,
        max_retries: 0,
        safety: SafetyThreshold::unlimited(),
        ..Default::default()
    }
}

pub fn org(id: &str) -> Value {
    json!({
        "id": id,
        "name": format!("Organization {id}"),
        "data_source": DATA_SOURCE,
    })
}

pub fn keyword(id: &str, publisher: &str) -> Value {
    json!({
        "id": id,
        "publisher": publisher,
        "name": {"fi": format!("avainsana {id}")},
        "data_source": DATA_SOURCE,
    })
}

pub fn place(id: &str, publisher: &str) -> Value {
    json!({
        "id": id,
        "publisher": publisher,
        "name": {"fi": format!("paikka {id}")},
        "data_source": DATA_SOURCE,
    })
}

/// JSON-LD reference to a remote resource
pub fn jsonld(resource: &str, id: &str) -> Value {
    json!({"@id": format!("{API_URL}v1/{resource}/{id}/")})
}

/// RFC 3339 timestamp `days` from now
pub fn days_from_now(days: i64) -> String {
    (Utc::now() + Duration::days(days)).to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// An upcoming event; extend the returned object for anything else
pub fn event(id: &str, publisher: &str, location: Value, keywords: Vec<Value>, audience: Vec<Value>) -> Value {
    json!({
        "id": id,
        "data_source": DATA_SOURCE,
        "deleted": false,
        "start_time": days_from_now(10),
        "end_time": days_from_now(11),
        "super_event_type": null,
        "name": {"fi": format!("tapahtuma {id}"), "en": format!("event {id}")},
        "description": null,
        "short_description": null,
        "info_url": null,
        "event_status": "EventScheduled",
        "location": location,
        "publisher": publisher,
        "keywords": keywords,
        "audience": audience,
        "offers": [],
        "external_links": [],
        "super_event": null,
    })
}

/// Set `field` on an event object
pub fn with(mut event: Value, field: &str, value: Value) -> Value {
    if let Some(obj) = event.as_object_mut() {
        obj.insert(field.to_string(), value);
    }
    event
}

/// A fetcher serving `orgs` and `events` at the test config's URLs
pub fn remote(orgs: Vec<Value>, events: Vec<Value>) -> StaticFetcher {
    let config = test_config();
    StaticFetcher::new()
        .with_list(config.resource_url("organization"), orgs)
        .with_list(config.resource_url("event"), events)
}
