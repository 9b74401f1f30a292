//! SQLite persistence layer
//!
//! One database file carries both the catalog store and the history
//! ledger. Methods on [`Database`] are organized by domain:
//! - [`migrations`] — lifecycle and schema migrations
//! - [`catalog`] — catalog snapshot and show rows (replaced wholesale on refresh)
//! - [`history`] — the fingerprint ledger
//!
//! Concurrent processes sharing the file serialize through SQLite's
//! locking; the connection's busy timeout bounds how long a writer waits
//! before failing.

use crate::types::{CatalogSnapshot, HistoryEntry, ShowRecord};
use chrono::{DateTime, Duration, Utc};
use sqlx::{FromRow, sqlite::SqlitePool};

mod catalog;
mod history;
mod migrations;

pub use catalog::ReplaceTx;

/// Show record as stored in SQLite.
#[derive(Debug, Clone, FromRow)]
struct ShowRow {
    hash: String,
    channel: String,
    topic: String,
    title: String,
    description: String,
    region: String,
    website: String,
    size: i64,
    start: i64,
    duration_secs: i64,
    age_secs: i64,
    is_new: i64,
    url: String,
    url_small: Option<String>,
    url_hd: Option<String>,
    url_subtitles: Option<String>,
}

impl From<ShowRow> for ShowRecord {
    fn from(row: ShowRow) -> Self {
        ShowRecord {
            hash: row.hash,
            channel: row.channel,
            topic: row.topic,
            title: row.title,
            description: row.description,
            region: row.region,
            website: row.website,
            size: row.size,
            start: timestamp(row.start),
            duration: Duration::seconds(row.duration_secs),
            age: Duration::seconds(row.age_secs),
            new: row.is_new != 0,
            url: row.url,
            url_small: row.url_small,
            url_hd: row.url_hd,
            url_subtitles: row.url_subtitles,
        }
    }
}

/// History ledger row as stored in SQLite.
#[derive(Debug, Clone, FromRow)]
struct HistoryRow {
    hash: String,
    channel: String,
    topic: String,
    title: String,
    size: i64,
    start: i64,
    duration_secs: i64,
    downloaded_at: i64,
}

impl From<HistoryRow> for HistoryEntry {
    fn from(row: HistoryRow) -> Self {
        HistoryEntry {
            hash: row.hash,
            channel: row.channel,
            topic: row.topic,
            title: row.title,
            size: row.size,
            start: timestamp(row.start),
            duration: Duration::seconds(row.duration_secs),
            downloaded_at: timestamp(row.downloaded_at),
        }
    }
}

/// Catalog snapshot row as stored in SQLite.
#[derive(Debug, Clone, FromRow)]
struct SnapshotRow {
    published_at: i64,
    list_id: String,
    crawler_version: String,
    crawler_agent: String,
    version: String,
    ingested_at: i64,
}

impl From<SnapshotRow> for CatalogSnapshot {
    fn from(row: SnapshotRow) -> Self {
        CatalogSnapshot {
            published_at: timestamp(row.published_at),
            list_id: row.list_id,
            crawler_version: row.crawler_version,
            crawler_agent: row.crawler_agent,
            version: row.version,
            ingested_at: timestamp(row.ingested_at),
        }
    }
}

fn timestamp(epoch_secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(epoch_secs, 0).unwrap_or_default()
}

/// Database handle for the catalog store and history ledger.
pub struct Database {
    pool: SqlitePool,
}
