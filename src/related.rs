//! Graph neighborhood queries.
//!
//! Walks the edge relation outward from a document or chunk to a bounded
//! depth using a recursive CTE, so callers can see what a unit of
//! knowledge references, directly or through intermediaries.

use anyhow::{bail, Result};
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::models::ChunkId;

/// One entity reached by the traversal.
#[derive(Debug, Clone)]
pub struct RelatedEntity {
    pub id: String,
    pub depth: i64,
    pub label: String,
}

/// Walk outgoing edges from `start` up to `depth` hops.
pub async fn related_entities(
    pool: &SqlitePool,
    start: &str,
    depth: i64,
) -> Result<Vec<RelatedEntity>> {
    let rows = sqlx::query(
        r#"
        WITH RECURSIVE walk(id, depth) AS (
            SELECT ?, 0
            UNION
            SELECT e.target_id, w.depth + 1
            FROM edges e
            JOIN walk w ON e.source_id = w.id
            WHERE w.depth < ?
        )
        SELECT id, MIN(depth) AS depth
        FROM walk
        WHERE depth > 0
        GROUP BY id
        ORDER BY depth ASC, id ASC
        "#,
    )
    .bind(start)
    .bind(depth)
    .fetch_all(pool)
    .await?;

    let mut out = Vec::with_capacity(rows.len());
    for row in &rows {
        let id: String = row.get("id");
        let depth: i64 = row.get("depth");
        let label = entity_label(pool, &id).await?;
        out.push(RelatedEntity { id, depth, label });
    }
    Ok(out)
}

/// Human-readable label for a document or chunk id.
async fn entity_label(pool: &SqlitePool, id: &str) -> Result<String> {
    if ChunkId::parse(id).is_some() {
        let row = sqlx::query(
            r#"
            SELECT c.title AS chunk_title, c.breadcrumb, d.title AS doc_title
            FROM chunks c
            JOIN documents d ON d.id = c.document_id
            WHERE c.id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;
        if let Some(row) = row {
            let breadcrumb: Option<String> = row.get("breadcrumb");
            let chunk_title: Option<String> = row.get("chunk_title");
            let doc_title: Option<String> = row.get("doc_title");
            return Ok(breadcrumb
                .or(chunk_title)
                .or(doc_title)
                .unwrap_or_else(|| "(chunk)".to_string()));
        }
    }

    let title: Option<Option<String>> =
        sqlx::query_scalar("SELECT title FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;
    Ok(title
        .flatten()
        .unwrap_or_else(|| "(untitled)".to_string()))
}

/// CLI entry point: print the neighborhood of a document or chunk.
pub async fn run_related(config: &Config, id: &str, depth: i64) -> Result<()> {
    if depth < 1 {
        bail!("depth must be >= 1");
    }

    let pool = db::connect(config).await?;

    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM documents WHERE id = ?1) OR EXISTS(SELECT 1 FROM chunks WHERE id = ?1)",
    )
    .bind(id)
    .fetch_one(&pool)
    .await?;
    if !exists {
        pool.close().await;
        bail!("entity not found: {}", id);
    }

    let entities = related_entities(&pool, id, depth).await?;
    pool.close().await;

    if entities.is_empty() {
        println!("No related entities.");
        return Ok(());
    }

    println!("related {} (depth {})", id, depth);
    for entity in &entities {
        println!(
            "  {}{} {} ({})",
            "  ".repeat((entity.depth - 1).max(0) as usize),
            "->",
            entity.label,
            entity.id
        );
    }

    Ok(())
}
