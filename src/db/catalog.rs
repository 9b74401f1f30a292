//! Catalog store operations.
//!
//! A refresh replaces the entire record set inside one transaction: the
//! old rows and snapshot are deleted, new rows stream in batches, and the
//! snapshot is written last so a crashed refresh never leaves a catalog
//! that looks current.

use crate::Result;
use crate::types::{CatalogSnapshot, ShowRecord};

use super::{Database, ShowRow, SnapshotRow};

/// An in-progress catalog replacement.
pub type ReplaceTx = sqlx::Transaction<'static, sqlx::Sqlite>;

impl Database {
    /// Metadata of the currently persisted catalog, if one exists.
    pub async fn snapshot(&self) -> Result<Option<CatalogSnapshot>> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            r#"
            SELECT published_at, list_id, crawler_version, crawler_agent, version, ingested_at
            FROM catalog_snapshot
            WHERE id = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(CatalogSnapshot::from))
    }

    /// Start a catalog replacement: opens a transaction and clears the
    /// previous record set and snapshot.
    pub async fn begin_replace(&self) -> Result<ReplaceTx> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM shows").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM catalog_snapshot")
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    /// Insert a batch of records into an in-progress replacement.
    pub async fn insert_shows(tx: &mut ReplaceTx, shows: &[ShowRecord]) -> Result<()> {
        for show in shows {
            sqlx::query(
                r#"
                INSERT INTO shows (
                    hash, channel, topic, title, description, region, website,
                    size, start, duration_secs, age_secs, is_new,
                    url, url_small, url_hd, url_subtitles
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&show.hash)
            .bind(&show.channel)
            .bind(&show.topic)
            .bind(&show.title)
            .bind(&show.description)
            .bind(&show.region)
            .bind(&show.website)
            .bind(show.size)
            .bind(show.start.timestamp())
            .bind(show.duration.num_seconds())
            .bind(show.age.num_seconds())
            .bind(show.new as i64)
            .bind(&show.url)
            .bind(&show.url_small)
            .bind(&show.url_hd)
            .bind(&show.url_subtitles)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    /// Write the snapshot and commit the replacement.
    pub async fn commit_replace(mut tx: ReplaceTx, snapshot: &CatalogSnapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO catalog_snapshot (
                id, published_at, list_id, crawler_version, crawler_agent, version, ingested_at
            )
            VALUES (1, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(snapshot.published_at.timestamp())
        .bind(&snapshot.list_id)
        .bind(&snapshot.crawler_version)
        .bind(&snapshot.crawler_agent)
        .bind(&snapshot.version)
        .bind(snapshot.ingested_at.timestamp())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// All persisted records in store order (catalog insertion order).
    pub async fn shows(&self) -> Result<Vec<ShowRecord>> {
        let rows = sqlx::query_as::<_, ShowRow>(
            r#"
            SELECT hash, channel, topic, title, description, region, website,
                   size, start, duration_secs, age_secs, is_new,
                   url, url_small, url_hd, url_subtitles
            FROM shows
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ShowRecord::from).collect())
    }

    /// Number of persisted records.
    pub async fn show_count(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM shows")
            .fetch_one(&self.pool)
            .await?)
    }
}
