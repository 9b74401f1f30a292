//! Catalog ownership: freshness policy and the filtered-query surface.
//!
//! A persisted catalog is used as-is only when it was ingested by the same
//! software version and its publication timestamp is younger than the
//! refresh window. Otherwise the whole record set is re-ingested; there is
//! no incremental merge.

use crate::db::Database;
use crate::error::{Error, Result};
use crate::filter::FilterSet;
use crate::ingest;
use crate::source::RemoteSource;
use crate::types::{CatalogSnapshot, ShowRecord};
use chrono::{DateTime, Duration, Utc};
use std::path::PathBuf;

/// Rows per batch handed from the blocking parser to the store writer.
const INSERT_BATCH: usize = 500;

/// The ingested catalog and its query surface.
pub struct Catalog {
    db: Database,
    source: RemoteSource,
    work_dir: PathBuf,
    version: String,
    refresh_after: Duration,
}

impl Catalog {
    /// Wire a catalog over an opened store and a remote source.
    ///
    /// `work_dir` hosts scratch files during refresh; `refresh_after_hours`
    /// is the freshness window for the persisted snapshot.
    pub fn new(
        db: Database,
        source: RemoteSource,
        work_dir: PathBuf,
        refresh_after_hours: i64,
    ) -> Self {
        Self {
            db,
            source,
            work_dir,
            version: env!("CARGO_PKG_VERSION").to_string(),
            refresh_after: Duration::hours(refresh_after_hours),
        }
    }

    /// The underlying store (also carries the history ledger).
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Re-ingest the catalog if none is persisted, if the persisted one was
    /// written by a different version, or if it is older than the refresh
    /// window. Must run before any query.
    pub async fn ensure_fresh(&self, now: DateTime<Utc>) -> Result<()> {
        match self.db.snapshot().await? {
            None => {
                tracing::debug!("no local catalog");
                self.refresh(now).await
            }
            Some(snapshot) if snapshot.version != self.version => {
                tracing::debug!(
                    catalog_version = %snapshot.version,
                    "catalog is from a different version"
                );
                self.refresh(now).await
            }
            Some(snapshot) if now - snapshot.published_at > self.refresh_after => {
                tracing::debug!(
                    age_hours = (now - snapshot.published_at).num_hours(),
                    "catalog is too old"
                );
                self.refresh(now).await
            }
            Some(snapshot) => {
                tracing::debug!(
                    age_hours = (now - snapshot.published_at).num_hours(),
                    "catalog is current"
                );
                Ok(())
            }
        }
    }

    /// Download and ingest a fresh catalog, replacing the persisted record
    /// set. The parser runs on a blocking task and streams record batches
    /// to a single transactional writer.
    pub async fn refresh(&self, now: DateTime<Utc>) -> Result<()> {
        let scratch = tempfile::Builder::new()
            .prefix(".tmp")
            .tempdir_in(&self.work_dir)?;
        let payload = scratch.path().join("Filmliste-akt.xz");
        self.source.fetch_catalog(&payload).await?;

        let (batch_tx, mut batch_rx) = tokio::sync::mpsc::channel::<Vec<ShowRecord>>(8);
        let parser = tokio::task::spawn_blocking(move || {
            let file = std::fs::File::open(&payload)?;
            let mut batch = Vec::with_capacity(INSERT_BATCH);
            let metadata = ingest::parse_compressed(file, now, |record| {
                batch.push(record);
                if batch.len() >= INSERT_BATCH {
                    // A closed channel means the writer failed; stop
                    // parsing, the writer's error wins.
                    return batch_tx.blocking_send(std::mem::take(&mut batch)).is_ok();
                }
                true
            })?;
            if !batch.is_empty() {
                let _ = batch_tx.blocking_send(batch);
            }
            Ok::<_, Error>(metadata)
        });

        let mut tx = self.db.begin_replace().await?;
        let mut total = 0usize;
        while let Some(batch) = batch_rx.recv().await {
            total += batch.len();
            Database::insert_shows(&mut tx, &batch).await?;
        }

        let metadata = parser
            .await
            .map_err(|e| Error::InvalidCatalog(e.to_string()))??;
        let snapshot = CatalogSnapshot {
            published_at: metadata.published_at,
            list_id: metadata.list_id,
            crawler_version: metadata.crawler_version,
            crawler_agent: metadata.crawler_agent,
            version: self.version.clone(),
            ingested_at: now,
        };
        Database::commit_replace(tx, &snapshot).await?;

        tracing::info!(shows = total, "catalog refreshed");
        Ok(())
    }

    /// Run the given filter sets against the store.
    ///
    /// Sets are additive: the result is the concatenation of each set's
    /// matches, in store order within a set. Records starting in the
    /// future are excluded unless `include_future` is set. `limit` caps
    /// the overall result count.
    pub async fn query(
        &self,
        sets: &[FilterSet],
        include_future: bool,
        now: DateTime<Utc>,
        limit: Option<usize>,
    ) -> Result<Vec<ShowRecord>> {
        let shows = self.db.shows().await?;
        let cap = limit.unwrap_or(usize::MAX);

        let mut selected = Vec::new();
        'sets: for set in sets {
            for show in &shows {
                if !include_future && show.start > now {
                    continue;
                }
                if set.matches(show) {
                    selected.push(show.clone());
                    if selected.len() >= cap {
                        break 'sets;
                    }
                }
            }
        }
        Ok(selected)
    }
}
