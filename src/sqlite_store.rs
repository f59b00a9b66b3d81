//! SQLite-backed [`ResourceStore`] implementation.
//!
//! Maps each store operation onto the schema created by
//! [`migrate::run_migrations`](crate::migrate::run_migrations). Status
//! updates touch only the owning pipeline's columns, and every write is a
//! single statement (or one transaction), so readers never observe a
//! half-written summary or embedding.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use context_db_core::embedding::{blob_to_vec, vec_to_blob};
use context_db_core::models::{
    Embedding, ListEntry, Origin, PipelineKind, PipelineStatus, Resource, SummaryLevel,
};
use context_db_core::store::{list_children, ResourceStore};
use context_db_core::{ContextError, ResourceUri};

const RESOURCE_COLUMNS: &str = "uri, origin_kind, origin, content_type, content_hash, size, \
     embed_status, embed_error, summary_status, summary_error, created_at, updated_at";

/// SQLite implementation of the [`ResourceStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_resource(row: &SqliteRow) -> Result<Resource> {
    let uri: String = row.get("uri");
    let origin_kind: String = row.get("origin_kind");
    let origin: String = row.get("origin");
    let embed_status: String = row.get("embed_status");
    let summary_status: String = row.get("summary_status");
    let size: i64 = row.get("size");

    Ok(Resource {
        uri: ResourceUri::parse(&uri)?,
        origin: Origin::from_parts(&origin_kind, &origin)
            .ok_or_else(|| anyhow!("unknown origin kind '{}' for {}", origin_kind, uri))?,
        content_type: row.get("content_type"),
        content_hash: row.get("content_hash"),
        size: size.max(0) as u64,
        embed_status: embed_status.parse()?,
        embed_error: row.get("embed_error"),
        summary_status: summary_status.parse()?,
        summary_error: row.get("summary_error"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn status_columns(kind: PipelineKind) -> (&'static str, &'static str) {
    match kind {
        PipelineKind::Embed => ("embed_status", "embed_error"),
        PipelineKind::Summarize => ("summary_status", "summary_error"),
    }
}

#[async_trait]
impl ResourceStore for SqliteStore {
    async fn put(&self, resource: &Resource, content: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO resources (uri, origin_kind, origin, content_type, content, content_hash,
                                   size, embed_status, embed_error, summary_status, summary_error,
                                   created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(uri) DO UPDATE SET
                origin_kind = excluded.origin_kind,
                origin = excluded.origin,
                content_type = excluded.content_type,
                content = excluded.content,
                content_hash = excluded.content_hash,
                size = excluded.size,
                embed_status = excluded.embed_status,
                embed_error = excluded.embed_error,
                summary_status = excluded.summary_status,
                summary_error = excluded.summary_error,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(resource.uri.as_str())
        .bind(resource.origin.kind())
        .bind(resource.origin.locator())
        .bind(&resource.content_type)
        .bind(content)
        .bind(&resource.content_hash)
        .bind(resource.size as i64)
        .bind(resource.embed_status.as_str())
        .bind(&resource.embed_error)
        .bind(resource.summary_status.as_str())
        .bind(&resource.summary_error)
        .bind(resource.created_at)
        .bind(resource.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, uri: &ResourceUri) -> Result<Option<Resource>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM resources WHERE uri = ?",
            RESOURCE_COLUMNS
        ))
        .bind(uri.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_resource).transpose()
    }

    async fn content(&self, uri: &ResourceUri) -> Result<Option<String>> {
        let content: Option<String> =
            sqlx::query_scalar("SELECT content FROM resources WHERE uri = ?")
                .bind(uri.as_str())
                .fetch_optional(&self.pool)
                .await?;
        Ok(content)
    }

    async fn resources(&self) -> Result<Vec<Resource>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM resources ORDER BY uri ASC",
            RESOURCE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_resource).collect()
    }

    async fn list(&self, prefix: &ResourceUri) -> Result<Vec<ListEntry>> {
        let dir_prefix = format!("{}/", prefix);
        let rows = sqlx::query("SELECT uri, size FROM resources WHERE substr(uri, 1, ?) = ?")
            .bind(dir_prefix.chars().count() as i64)
            .bind(&dir_prefix)
            .fetch_all(&self.pool)
            .await?;

        let mut stored = Vec::with_capacity(rows.len());
        for row in &rows {
            let uri: String = row.get("uri");
            let size: i64 = row.get("size");
            stored.push((ResourceUri::parse(&uri)?, size.max(0) as u64));
        }

        Ok(list_children(prefix, stored.iter().map(|(u, s)| (u, *s))))
    }

    async fn set_status(
        &self,
        uri: &ResourceUri,
        kind: PipelineKind,
        status: PipelineStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let (status_col, error_col) = status_columns(kind);
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(&format!(
            "UPDATE resources SET {} = ?, {} = ?, updated_at = ? WHERE uri = ?",
            status_col, error_col
        ))
        .bind(status.as_str())
        .bind(error)
        .bind(now)
        .bind(uri.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ContextError::NotFound(uri.to_string()).into());
        }
        Ok(())
    }

    async fn put_summary(&self, uri: &ResourceUri, level: SummaryLevel, text: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO derived (uri, level, text, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(uri, level) DO UPDATE SET
                text = excluded.text,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(uri.as_str())
        .bind(level.as_str())
        .bind(text)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_summary(&self, uri: &ResourceUri, level: SummaryLevel) -> Result<Option<String>> {
        let text: Option<String> =
            sqlx::query_scalar("SELECT text FROM derived WHERE uri = ? AND level = ?")
                .bind(uri.as_str())
                .bind(level.as_str())
                .fetch_optional(&self.pool)
                .await?;
        Ok(text)
    }

    async fn put_embedding(&self, uri: &ResourceUri, embedding: &Embedding) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO embeddings (uri, model, dims, content_hash, vector, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(uri) DO UPDATE SET
                model = excluded.model,
                dims = excluded.dims,
                content_hash = excluded.content_hash,
                vector = excluded.vector,
                created_at = excluded.created_at
            "#,
        )
        .bind(uri.as_str())
        .bind(&embedding.model)
        .bind(embedding.dims as i64)
        .bind(&embedding.content_hash)
        .bind(vec_to_blob(&embedding.vector))
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn embeddings(&self) -> Result<Vec<(ResourceUri, Embedding)>> {
        let rows = sqlx::query("SELECT uri, model, dims, content_hash, vector FROM embeddings")
            .fetch_all(&self.pool)
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let uri: String = row.get("uri");
            let dims: i64 = row.get("dims");
            let blob: Vec<u8> = row.get("vector");
            out.push((
                ResourceUri::parse(&uri)?,
                Embedding {
                    vector: blob_to_vec(&blob),
                    model: row.get("model"),
                    dims: dims.max(0) as usize,
                    content_hash: row.get("content_hash"),
                },
            ));
        }
        Ok(out)
    }
}
