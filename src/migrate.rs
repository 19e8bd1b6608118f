use anyhow::Result;
use sqlx::SqlitePool;

/// Layout version written into `index_meta`; bump when the tables change.
pub const SCHEMA_VERSION: &str = "1";

/// Create the index tables in a freshly opened file.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Key/value metadata: model, dims, kind, schema version, built_at
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One row per embedded chunk
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            chunk_index INTEGER NOT NULL,
            source TEXT NOT NULL,
            text TEXT NOT NULL,
            hash TEXT NOT NULL,
            embedding BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source, chunk_index)")
        .execute(pool)
        .await?;

    Ok(())
}
