//! Remote retrieval of origin records
//!
//! The import session consumes remote data through the `Fetcher` trait:
//! one fully paginated list per resource, plus single-record lookups for
//! relations that were not embedded.

mod http;
mod memory;
mod traits;

pub use http::{FetchSettings, HttpFetcher, RawClient, RawResponse, ReqwestClient};
pub use memory::StaticFetcher;
pub use traits::{FetchError, FetchResult, Fetcher};
