//! Database statistics overview.
//!
//! Summarizes what is indexed: document and chunk counts, link
//! resolution state, edge counts, and embedding coverage.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;

pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let total_docs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(&pool)
        .await?;

    let total_chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
        .fetch_one(&pool)
        .await?;

    let total_links: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM links")
        .fetch_one(&pool)
        .await?;

    let resolved_links: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM links WHERE resolved_document_id IS NOT NULL")
            .fetch_one(&pool)
            .await?;

    let total_edges: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM edges")
        .fetch_one(&pool)
        .await?;

    let embedded_chunks: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM vectors WHERE owner_kind = 'chunk'")
            .fetch_one(&pool)
            .await?;

    let embedded_docs: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM vectors WHERE owner_kind = 'document'")
            .fetch_one(&pool)
            .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Quarry — Database Stats");
    println!("=======================");
    println!();
    println!("  Database:   {}", config.db.path.display());
    println!("  Size:       {}", format_bytes(db_size));
    println!();
    println!("  Documents:  {}", total_docs);
    println!("  Chunks:     {}", total_chunks);
    println!(
        "  Links:      {} ({} resolved, {} dangling)",
        total_links,
        resolved_links,
        total_links - resolved_links
    );
    println!("  Edges:      {}", total_edges);
    println!(
        "  Embedded:   {} / {} chunks ({}%), {} / {} documents",
        embedded_chunks,
        total_chunks,
        if total_chunks > 0 {
            (embedded_chunks * 100) / total_chunks
        } else {
            0
        },
        embedded_docs,
        total_docs
    );

    // Per-kind breakdown
    let kind_rows = sqlx::query(
        r#"
        SELECT d.kind, COUNT(DISTINCT d.id) AS doc_count, COUNT(c.id) AS chunk_count
        FROM documents d
        LEFT JOIN chunks c ON c.document_id = d.id
        GROUP BY d.kind
        ORDER BY doc_count DESC
        "#,
    )
    .fetch_all(&pool)
    .await?;

    if !kind_rows.is_empty() {
        println!();
        println!("  By kind:");
        println!("  {:<16} {:>6} {:>8}", "KIND", "DOCS", "CHUNKS");
        println!("  {}", "-".repeat(32));
        for row in &kind_rows {
            let kind: String = row.get("kind");
            let doc_count: i64 = row.get("doc_count");
            let chunk_count: i64 = row.get("chunk_count");
            println!("  {:<16} {:>6} {:>8}", kind, doc_count, chunk_count);
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
