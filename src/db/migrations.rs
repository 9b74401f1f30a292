//! Database lifecycle and schema migrations.

use crate::Result;
use sqlx::SqliteConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};
use std::path::Path;
use std::time::Duration;

use super::Database;

impl Database {
    /// Open (creating if necessary) the database at `path` and run
    /// migrations.
    ///
    /// `lock_timeout` bounds how long any statement waits on another
    /// process holding the file lock before failing with a busy error.
    pub async fn open(path: &Path, lock_timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(lock_timeout);

        let pool = SqlitePool::connect_with(options).await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&mut *conn)
        .await?;

        let current_version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
                .fetch_one(&mut *conn)
                .await?;
        let current_version = current_version.unwrap_or(0);

        if current_version < 1 {
            Self::migrate_v1(&mut conn).await?;
        }

        Ok(())
    }

    /// Migration v1: catalog store, snapshot metadata and history ledger.
    async fn migrate_v1(conn: &mut SqliteConnection) -> Result<()> {
        tracing::info!("applying database migration v1");

        sqlx::query(
            r#"
            CREATE TABLE shows (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                hash TEXT NOT NULL,
                channel TEXT NOT NULL,
                topic TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                region TEXT NOT NULL,
                website TEXT NOT NULL,
                size INTEGER NOT NULL,
                start INTEGER NOT NULL,
                duration_secs INTEGER NOT NULL,
                age_secs INTEGER NOT NULL,
                is_new INTEGER NOT NULL,
                url TEXT NOT NULL,
                url_small TEXT,
                url_hd TEXT,
                url_subtitles TEXT
            )
            "#,
        )
        .execute(&mut *conn)
        .await?;

        sqlx::query("CREATE INDEX idx_shows_hash ON shows (hash)")
            .execute(&mut *conn)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE catalog_snapshot (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                published_at INTEGER NOT NULL,
                list_id TEXT NOT NULL,
                crawler_version TEXT NOT NULL,
                crawler_agent TEXT NOT NULL,
                version TEXT NOT NULL,
                ingested_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&mut *conn)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE history (
                hash TEXT PRIMARY KEY,
                channel TEXT NOT NULL,
                topic TEXT NOT NULL,
                title TEXT NOT NULL,
                size INTEGER NOT NULL,
                start INTEGER NOT NULL,
                duration_secs INTEGER NOT NULL,
                downloaded_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&mut *conn)
        .await?;

        sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES (1, unixepoch())")
            .execute(&mut *conn)
            .await?;

        Ok(())
    }
}
