//! In-memory fetcher serving canned remote data

use super::traits::{FetchError, FetchResult, Fetcher};
use crate::entity::OriginRecord;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// A `Fetcher` that serves pre-registered lists and records.
///
/// Lists are keyed by URL without query string; the parameters of each
/// request are recorded so callers can inspect them.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    lists: HashMap<String, Vec<Value>>,
    records: HashMap<String, Value>,
    requests: Mutex<Vec<(String, Vec<(String, String)>)>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `items` as the complete result of listing `url`.
    pub fn with_list(mut self, url: impl Into<String>, items: Vec<Value>) -> Self {
        self.lists.insert(strip_query(&url.into()), items);
        self
    }

    /// Serve `record` for a single-record GET of `url`.
    pub fn with_record(mut self, url: impl Into<String>, record: Value) -> Self {
        self.records.insert(url.into(), record);
        self
    }

    /// Every request made so far: URL and query parameters
    pub fn requests(&self) -> Vec<(String, Vec<(String, String)>)> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    fn record_request(&self, url: &str, params: &[(String, String)]) {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push((url.to_string(), params.to_vec()));
        }
    }
}

fn strip_query(url: &str) -> String {
    url.split('?').next().unwrap_or(url).to_string()
}

fn to_record(url: &str, value: Value) -> FetchResult<OriginRecord> {
    OriginRecord::from_value(value).map_err(|e| FetchError::InvalidPage {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn list(&self, url: &str, params: &[(String, String)]) -> FetchResult<Vec<OriginRecord>> {
        self.record_request(url, params);
        let items = self
            .lists
            .get(&strip_query(url))
            .ok_or_else(|| FetchError::NotFound(url.to_string()))?;
        items.iter().cloned().map(|item| to_record(url, item)).collect()
    }

    async fn get(&self, url: &str) -> FetchResult<OriginRecord> {
        self.record_request(url, &[]);
        let value = self
            .records
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(url.to_string()))?;
        to_record(url, value)
    }
}
