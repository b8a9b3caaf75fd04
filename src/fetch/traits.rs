//! Fetcher trait definitions

use crate::entity::OriginRecord;
use async_trait::async_trait;
use thiserror::Error;

/// Errors from remote retrieval. All of them are fatal for an import run.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("remote returned HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("exceeded max retries ({attempts} attempts) for {url}")]
    MaxRetries { url: String, attempts: u32 },

    #[error("exceeded max pages ({max_pages}) listing {url}")]
    MaxPages { url: String, max_pages: usize },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid JSON from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unexpected page shape from {url}: {reason}")]
    InvalidPage { url: String, reason: String },

    #[error("no record at {0}")]
    NotFound(String),
}

/// Result type for fetch operations
pub type FetchResult<T> = Result<T, FetchError>;

/// Source of origin records.
///
/// `list` returns the complete, fully paginated result for one resource;
/// the synchronizer makes no partial-page assumptions.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch every page of a list resource.
    async fn list(&self, url: &str, params: &[(String, String)]) -> FetchResult<Vec<OriginRecord>>;

    /// Fetch a single record.
    async fn get(&self, url: &str) -> FetchResult<OriginRecord>;
}
