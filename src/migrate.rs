//! Schema creation. All statements are idempotent so `init` can be
//! re-run safely against an existing store.

use anyhow::Result;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    // Documents: one row per ingested source file.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            source_path TEXT NOT NULL UNIQUE,
            title TEXT,
            kind TEXT NOT NULL DEFAULT 'reference',
            versions_json TEXT NOT NULL DEFAULT '[]',
            tags_json TEXT NOT NULL DEFAULT '[]',
            body TEXT NOT NULL,
            fingerprint TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Chunks: derived rows, ids are "{document_id}.{chunk_index}".
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            content TEXT NOT NULL,
            title TEXT,
            breadcrumb TEXT,
            section_headers_json TEXT NOT NULL DEFAULT '[]',
            start_line INTEGER NOT NULL,
            end_line INTEGER NOT NULL,
            token_count INTEGER NOT NULL,
            warnings_json TEXT NOT NULL DEFAULT '[]',
            UNIQUE(document_id, chunk_index),
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Links: cross-references found in document content. Resolution
    // columns stay NULL while the target has not been ingested.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS links (
            id TEXT PRIMARY KEY,
            source_document_id TEXT NOT NULL,
            source_chunk_id TEXT,
            target_path TEXT NOT NULL,
            fragment TEXT,
            display_text TEXT NOT NULL DEFAULT '',
            source_line INTEGER NOT NULL,
            resolved_document_id TEXT,
            resolved_chunk_id TEXT,
            FOREIGN KEY (source_document_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Edges: the resolved graph retrieval walks for link boosting and
    // the related command.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS edges (
            id TEXT PRIMARY KEY,
            source_id TEXT NOT NULL,
            source_kind TEXT NOT NULL,
            target_id TEXT NOT NULL,
            target_kind TEXT NOT NULL,
            relation TEXT NOT NULL,
            UNIQUE(source_id, source_kind, target_id, target_kind, relation)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Vectors: one embedding per document or chunk, little-endian f32.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vectors (
            owner_id TEXT NOT NULL,
            owner_kind TEXT NOT NULL,
            document_id TEXT NOT NULL,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            PRIMARY KEY (owner_id, owner_kind)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id)")
        .execute(&pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_source_path ON documents(source_path)",
    )
    .execute(&pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_links_source_document ON links(source_document_id)",
    )
    .execute(&pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_links_target_path ON links(target_path)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source_id)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_id)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_vectors_document ON vectors(document_id)")
        .execute(&pool)
        .await?;

    pool.close().await;
    Ok(())
}
