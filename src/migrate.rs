use anyhow::Result;
use sqlx::SqlitePool;

/// Create every table and index. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // One row per resource; each pipeline owns its own status/error pair.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS resources (
            uri TEXT PRIMARY KEY,
            origin_kind TEXT NOT NULL,
            origin TEXT NOT NULL,
            content_type TEXT NOT NULL DEFAULT 'text/plain',
            content TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            size INTEGER NOT NULL,
            embed_status TEXT NOT NULL DEFAULT 'pending',
            embed_error TEXT,
            summary_status TEXT NOT NULL DEFAULT 'pending',
            summary_error TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Generated L0/L1 levels
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS derived (
            uri TEXT NOT NULL,
            level TEXT NOT NULL,
            text TEXT NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (uri, level),
            FOREIGN KEY (uri) REFERENCES resources(uri)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS embeddings (
            uri TEXT PRIMARY KEY,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            content_hash TEXT NOT NULL,
            vector BLOB NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (uri) REFERENCES resources(uri)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_resources_embed_status ON resources(embed_status)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_resources_summary_status ON resources(summary_status)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
