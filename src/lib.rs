//! # mediathek-dl
//!
//! Library for downloading shows from German public-broadcasting media
//! libraries, driven by the MediathekView catalog.
//!
//! ## Design Philosophy
//!
//! mediathek-dl is designed to be:
//! - **Catalog-driven** - One periodically refreshed local catalog, queried offline
//! - **Selective** - A small filter language picks shows, never whole feeds
//! - **Idempotent** - A fingerprint ledger keeps re-runs from re-downloading
//! - **Library-first** - The CLI is a thin consumer of this crate
//!
//! ## Quick Start
//!
//! ```no_run
//! use mediathek_dl::{Catalog, Database, FilterSet, MediaFetcher, QualityPreference, RemoteSource, Settings};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::default();
//!     let client = reqwest::Client::new();
//!
//!     let db = Database::open(&settings.database_path(), settings.lock_timeout).await?;
//!     let source = RemoteSource::new(client.clone(), settings.mirrors.clone(), settings.retry_delay);
//!     let catalog = Catalog::new(db, source, settings.dir.clone(), settings.refresh_after_hours);
//!
//!     let now = chrono::Utc::now();
//!     catalog.ensure_fresh(now).await?;
//!
//!     let filters = vec![FilterSet::compile(&["channel=ARD", "duration+20m"])?];
//!     let shows = catalog.query(&filters, false, now, Some(10)).await?;
//!
//!     let fetcher = MediaFetcher::new(client, settings.dir.clone(), settings.target.clone(), true);
//!     for show in &shows {
//!         fetcher.fetch(show, QualityPreference::standard()).await?;
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Catalog ownership and the query surface
pub mod catalog;
/// Configuration types
pub mod config;
/// SQLite persistence layer
pub mod db;
/// Human-readable duration notation
pub mod durations;
/// Error types
pub mod error;
/// Media retrieval
pub mod fetch;
/// The filter query language
pub mod filter;
/// Catalog payload parsing
pub mod ingest;
/// Remote catalog source with mirror retry
pub mod source;
/// Core types
pub mod types;

// Re-export commonly used types
pub use catalog::Catalog;
pub use config::Settings;
pub use db::Database;
pub use error::{Error, Result};
pub use fetch::{FetchOutcome, MediaFetcher};
pub use filter::{FilterPredicate, FilterSet, read_filter_sets};
pub use source::RemoteSource;
pub use types::{CatalogSnapshot, HistoryEntry, Quality, QualityPreference, ShowRecord};
