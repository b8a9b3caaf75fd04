//! registry-sync: remote-dataset synchronization for an events registry
//!
//! Pulls organizations, places, keywords and events from a LinkedEvents-style
//! API and reconciles them into a local entity store.
//!
//! # Core Concepts
//!
//! - **Origin records**: remote JSON objects keyed by their origin id
//! - **Local entities**: stored rows owned by one data source
//! - **Identity maps**: per-run origin id → local id translation
//! - **Reconcilers**: mark-and-sweep deletion guarded by a safety threshold
//!
//! # Example
//!
//! ```no_run
//! use registry_sync::{run_import, HttpFetcher, OpenStore, SqliteStore, SyncConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SyncConfig::load()?;
//! let store = SqliteStore::open(config.database_path())?;
//! let fetcher = HttpFetcher::new(config.fetch_settings(), config.timeout())?;
//! let report = run_import(&store, &fetcher, &config, false).await?;
//! println!("{} entities deleted", report.total_deleted());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod entity;
pub mod error;
pub mod fetch;
pub mod identity;
pub mod mapping;
pub mod prune;
pub mod reconcile;
pub mod session;
pub mod storage;

pub use config::{ConfigError, SyncConfig};
pub use entity::{
    Attributes, DataSourceId, DeletePolicy, EntityKind, LocalEntity, LocalId, OriginRecord, Relation,
};
pub use error::{SyncError, SyncResult};
pub use fetch::{FetchError, FetchSettings, Fetcher, HttpFetcher, StaticFetcher};
pub use identity::{split_common, IdentityMap};
pub use mapping::{import_origin_records, BatchStats, ImportSpec, UpsertOutcome};
pub use prune::purge_orphans;
pub use reconcile::{Reconciler, SafetyThreshold, SweepReport};
pub use session::{run_import, ImportReport, SkippedSweep};
pub use storage::{EntityFilter, EntityStore, OpenStore, PredicateOp, SqliteStore, StorageError, StorageResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
