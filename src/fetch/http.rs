//! HTTP fetcher with bounded retries and a page budget

use super::traits::{FetchError, FetchResult, Fetcher};
use crate::entity::OriginRecord;
use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Status and body of one HTTP GET
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A single-attempt HTTP GET. Retrying is the fetcher's job.
#[async_trait]
pub trait RawClient: Send + Sync {
    async fn get(&self, url: &str) -> FetchResult<RawResponse>;
}

/// `RawClient` backed by reqwest
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    pub fn new(timeout: Duration) -> FetchResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RawClient for ReqwestClient {
    async fn get(&self, url: &str) -> FetchResult<RawResponse> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        Ok(RawResponse { status, body })
    }
}

/// Retry and pagination limits
#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Retries after the first failed attempt
    pub max_retries: u32,
    /// Pages fetched before a listing is considered runaway
    pub max_pages: usize,
    /// Pause before each retry
    pub retry_delay: Duration,
    /// Pause between consecutive pages
    pub page_delay: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            max_retries: 5,
            max_pages: 100,
            retry_delay: Duration::from_secs(5),
            page_delay: Duration::from_secs(1),
        }
    }
}

/// Fetcher for LinkedEvents-style JSON APIs.
///
/// List pages are shaped `{"meta": {"next": url | null}, "data": [...]}`.
pub struct HttpFetcher<C = ReqwestClient> {
    client: C,
    settings: FetchSettings,
}

impl HttpFetcher<ReqwestClient> {
    pub fn new(settings: FetchSettings, timeout: Duration) -> FetchResult<Self> {
        Ok(Self::with_client(ReqwestClient::new(timeout)?, settings))
    }
}

impl<C: RawClient> HttpFetcher<C> {
    pub fn with_client(client: C, settings: FetchSettings) -> Self {
        Self { client, settings }
    }

    /// GET a JSON document, retrying on transport errors, non-success
    /// statuses and undecodable bodies. A 404 is not retried.
    pub async fn get_json(&self, url: &str) -> FetchResult<Value> {
        let attempts = self.settings.max_retries + 1;

        for attempt in 1..=attempts {
            match self.client.get(url).await {
                Ok(resp) if resp.is_success() => match serde_json::from_str::<Value>(&resp.body) {
                    Ok(doc) => return Ok(doc),
                    Err(e) => warn!(url, attempt, error = %e, "remote returned invalid JSON"),
                },
                Ok(resp) if resp.status == 404 => return Err(FetchError::NotFound(url.to_string())),
                Ok(resp) => warn!(url, attempt, status = resp.status, "remote reported HTTP error"),
                Err(e) => warn!(url, attempt, error = %e, "request failed"),
            }

            if attempt < attempts {
                tokio::time::sleep(self.settings.retry_delay).await;
            }
        }

        Err(FetchError::MaxRetries {
            url: url.to_string(),
            attempts,
        })
    }
}

#[async_trait]
impl<C: RawClient> Fetcher for HttpFetcher<C> {
    async fn list(&self, url: &str, params: &[(String, String)]) -> FetchResult<Vec<OriginRecord>> {
        let mut next = Some(compose_url(url, params)?);
        let mut pages = 0;
        let mut records = Vec::new();

        while let Some(page_url) = next {
            if pages >= self.settings.max_pages {
                return Err(FetchError::MaxPages {
                    url: url.to_string(),
                    max_pages: self.settings.max_pages,
                });
            }
            if pages > 0 {
                tokio::time::sleep(self.settings.page_delay).await;
            }

            let doc = self.get_json(&page_url).await?;
            pages += 1;
            let (data, next_url) = parse_page(&page_url, doc)?;
            debug!(url = %page_url, records = data.len(), "fetched page");
            records.extend(data);
            next = next_url;
        }

        Ok(records)
    }

    async fn get(&self, url: &str) -> FetchResult<OriginRecord> {
        let doc = self.get_json(url).await?;
        OriginRecord::from_value(doc).map_err(|e| FetchError::InvalidPage {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Append query parameters to a URL.
pub(crate) fn compose_url(url: &str, params: &[(String, String)]) -> FetchResult<String> {
    if params.is_empty() {
        return Ok(url.to_string());
    }
    let pairs = params.iter().map(|(k, v)| (k.as_str(), v.as_str()));
    Url::parse_with_params(url, pairs)
        .map(String::from)
        .map_err(|e| FetchError::InvalidPage {
            url: url.to_string(),
            reason: e.to_string(),
        })
}

/// Split a list page into its records and the next page URL.
fn parse_page(url: &str, doc: Value) -> FetchResult<(Vec<OriginRecord>, Option<String>)> {
    let invalid = |reason: String| FetchError::InvalidPage {
        url: url.to_string(),
        reason,
    };

    let next = doc
        .get("meta")
        .and_then(|meta| meta.get("next"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let Some(Value::Array(items)) = doc.get("data").cloned() else {
        return Err(invalid("missing 'data' array".to_string()));
    };

    let records = items
        .into_iter()
        .map(|item| OriginRecord::from_value(item).map_err(|e| invalid(e.to_string())))
        .collect::<FetchResult<Vec<_>>>()?;

    Ok((records, next))
}
