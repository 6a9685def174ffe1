use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::domain::PresentationId;

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRegion {
    pub presentation_id: PresentationId,
    pub colo: String,
    pub cached_at: DateTime<Utc>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // Every pooled connection to an in-memory database would see its own empty schema.
        let max_connections = if database_url.starts_with("sqlite::memory:") {
            1
        } else {
            5
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await?;
        let storage = Self { pool };
        storage.ensure_region_table().await?;
        Ok(storage)
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    async fn ensure_region_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS presentation_regions (
                presentation_id TEXT PRIMARY KEY,
                colo            TEXT NOT NULL,
                cached_at       TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to create presentation_regions table")?;
        Ok(())
    }

    pub async fn load_region(&self, presentation_id: &PresentationId) -> Result<Option<StoredRegion>> {
        let row = sqlx::query(
            "SELECT presentation_id, colo, cached_at FROM presentation_regions WHERE presentation_id = ?",
        )
        .bind(presentation_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("failed to load region for presentation '{presentation_id}'"))?;

        row.as_ref().map(region_from_row).transpose()
    }

    /// Stores `colo` unless a value is already cached and returns the value that wins.
    pub async fn store_region_if_absent(
        &self,
        presentation_id: &PresentationId,
        colo: &str,
    ) -> Result<String> {
        sqlx::query(
            "INSERT INTO presentation_regions (presentation_id, colo, cached_at) VALUES (?, ?, ?)
             ON CONFLICT(presentation_id) DO NOTHING",
        )
        .bind(presentation_id.as_str())
        .bind(colo)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to cache region for presentation '{presentation_id}'"))?;

        let stored = self
            .load_region(presentation_id)
            .await?
            .with_context(|| format!("region for presentation '{presentation_id}' vanished"))?;
        Ok(stored.colo)
    }

    pub async fn clear_region(&self, presentation_id: &PresentationId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM presentation_regions WHERE presentation_id = ?")
            .bind(presentation_id.as_str())
            .execute(&self.pool)
            .await
            .with_context(|| {
                format!("failed to clear region for presentation '{presentation_id}'")
            })?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_regions(&self) -> Result<Vec<StoredRegion>> {
        let rows = sqlx::query(
            "SELECT presentation_id, colo, cached_at FROM presentation_regions ORDER BY presentation_id",
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to list cached regions")?;

        rows.iter().map(region_from_row).collect()
    }
}

fn region_from_row(row: &SqliteRow) -> Result<StoredRegion> {
    Ok(StoredRegion {
        presentation_id: PresentationId(row.try_get("presentation_id")?),
        colo: row.try_get("colo")?,
        cached_at: row.try_get("cached_at")?,
    })
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
