//! History ledger operations.
//!
//! The ledger is a persistent set of fingerprints marked downloaded, with
//! a denormalized copy of the show's descriptive fields for display. Each
//! mutation is a single atomic statement, so an interrupted run never
//! leaves a half-written entry.

use crate::Result;
use crate::types::HistoryEntry;
use chrono::{DateTime, Utc};

use super::{Database, HistoryRow};

impl Database {
    /// Mark a fingerprint downloaded. Idempotent: marking again replaces
    /// the entry, so the latest timestamp wins and exactly one row remains.
    pub async fn mark_downloaded(&self, entry: &HistoryEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO history (
                hash, channel, topic, title, size, start, duration_secs, downloaded_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.hash)
        .bind(&entry.channel)
        .bind(&entry.topic)
        .bind(&entry.title)
        .bind(entry.size)
        .bind(entry.start.timestamp())
        .bind(entry.duration.num_seconds())
        .bind(entry.downloaded_at.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// When the given fingerprint was downloaded, if it ever was.
    pub async fn downloaded_at(&self, hash: &str) -> Result<Option<DateTime<Utc>>> {
        let epoch: Option<i64> =
            sqlx::query_scalar("SELECT downloaded_at FROM history WHERE hash = ?")
                .bind(hash)
                .fetch_optional(&self.pool)
                .await?;

        Ok(epoch.and_then(|e| DateTime::from_timestamp(e, 0)))
    }

    /// All ledger entries, oldest download first.
    pub async fn history(&self) -> Result<Vec<HistoryEntry>> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT hash, channel, topic, title, size, start, duration_secs, downloaded_at
            FROM history
            ORDER BY downloaded_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(HistoryEntry::from).collect())
    }

    /// Remove a single fingerprint. Returns false if it was not present;
    /// the ledger is left untouched in that case.
    pub async fn remove_history(&self, hash: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM history WHERE hash = ?")
            .bind(hash)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Drop the whole ledger. Returns the number of entries removed.
    pub async fn purge_history(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM history")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
