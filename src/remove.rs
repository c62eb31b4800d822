//! Document removal.
//!
//! Deletes a document and everything derived from it. Links from other
//! documents that resolved to the removed document revert to dangling,
//! so a later re-ingestion at the same path can backfill them again.

use anyhow::{bail, Result};
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Remove a document by id or source path.
pub async fn run_remove(config: &Config, target: &str) -> Result<()> {
    let pool = db::connect(config).await?;

    let doc: Option<(String, Option<String>)> =
        sqlx::query_as("SELECT id, source_path FROM documents WHERE id = ?1 OR source_path = ?1")
            .bind(target)
            .fetch_optional(&pool)
            .await?;

    let Some((doc_id, source_path)) = doc else {
        pool.close().await;
        bail!("document not found: {}", target);
    };

    remove_document(&pool, &doc_id).await?;
    pool.close().await;

    println!("removed {}", doc_id);
    if let Some(path) = source_path {
        println!("  source: {}", path);
    }
    println!("ok");
    Ok(())
}

/// Delete the document row and all derived rows in one transaction.
pub async fn remove_document(pool: &SqlitePool, doc_id: &str) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM vectors WHERE document_id = ?")
        .bind(doc_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM chunks WHERE document_id = ?")
        .bind(doc_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM links WHERE source_document_id = ?")
        .bind(doc_id)
        .execute(&mut *tx)
        .await?;

    // Incoming links revert to dangling so backfill can resolve them
    // again if the document comes back.
    sqlx::query(
        "UPDATE links SET resolved_document_id = NULL, resolved_chunk_id = NULL WHERE resolved_document_id = ?",
    )
    .bind(doc_id)
    .execute(&mut *tx)
    .await?;

    // Edges touching the document or its chunks, in either direction.
    sqlx::query(
        r#"
        DELETE FROM edges
        WHERE source_id = ?1 OR source_id LIKE ?1 || '.%'
           OR target_id = ?1 OR target_id LIKE ?1 || '.%'
        "#,
    )
    .bind(doc_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM documents WHERE id = ?")
        .bind(doc_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}
