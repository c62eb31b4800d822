//! Document retrieval by id.
//!
//! Fetches a full document with its chunks and outgoing links. The id
//! may be a document id or a chunk id; chunk ids are resolved to their
//! parent document.

use anyhow::{bail, Result};
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::models::ChunkId;

#[derive(Debug, Clone, Serialize)]
pub struct DocumentResponse {
    pub id: String,
    pub source_path: Option<String>,
    pub title: Option<String>,
    pub kind: String,
    pub versions: Vec<String>,
    pub tags: Vec<String>,
    pub created_at: String, // ISO8601
    pub updated_at: String, // ISO8601
    pub body: String,
    pub chunks: Vec<ChunkResponse>,
    pub links: Vec<LinkResponse>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkResponse {
    pub id: String,
    pub index: i64,
    pub title: Option<String>,
    pub breadcrumb: Option<String>,
    pub section_headers: Vec<String>,
    pub start_line: i64,
    pub end_line: i64,
    pub token_count: i64,
    pub warnings: Vec<String>,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkResponse {
    pub target_path: String,
    pub fragment: Option<String>,
    pub resolved_document_id: Option<String>,
    pub resolved_chunk_id: Option<String>,
}

/// Fetch a document by document or chunk id.
pub async fn get_document(pool: &SqlitePool, id: &str) -> Result<DocumentResponse> {
    // A chunk id resolves to its parent document.
    let doc_id = match ChunkId::parse(id) {
        Some(cid) => cid.document_id,
        None => id.to_string(),
    };
    // Try the literal id first so document ids containing dots win.
    let doc_row = fetch_doc_row(pool, id).await?;
    let doc_row = match doc_row {
        Some(row) => row,
        None => match fetch_doc_row(pool, &doc_id).await? {
            Some(row) => row,
            None => bail!("document not found: {}", id),
        },
    };

    let resolved_id: String = doc_row.get("id");
    let created_at: i64 = doc_row.get("created_at");
    let updated_at: i64 = doc_row.get("updated_at");
    let versions_json: String = doc_row.get("versions_json");
    let tags_json: String = doc_row.get("tags_json");

    let chunk_rows = sqlx::query(
        r#"
        SELECT id, chunk_index, title, breadcrumb, section_headers_json,
               start_line, end_line, token_count, warnings_json, content
        FROM chunks WHERE document_id = ? ORDER BY chunk_index ASC
        "#,
    )
    .bind(&resolved_id)
    .fetch_all(pool)
    .await?;

    let chunks: Vec<ChunkResponse> = chunk_rows
        .iter()
        .map(|row| {
            let sections: String = row.get("section_headers_json");
            let warnings: String = row.get("warnings_json");
            ChunkResponse {
                id: row.get("id"),
                index: row.get("chunk_index"),
                title: row.get("title"),
                breadcrumb: row.get("breadcrumb"),
                section_headers: serde_json::from_str(&sections).unwrap_or_default(),
                start_line: row.get("start_line"),
                end_line: row.get("end_line"),
                token_count: row.get("token_count"),
                warnings: serde_json::from_str(&warnings).unwrap_or_default(),
                content: row.get("content"),
            }
        })
        .collect();

    let link_rows = sqlx::query(
        r#"
        SELECT target_path, fragment, resolved_document_id, resolved_chunk_id
        FROM links WHERE source_document_id = ? ORDER BY source_line ASC
        "#,
    )
    .bind(&resolved_id)
    .fetch_all(pool)
    .await?;

    let links: Vec<LinkResponse> = link_rows
        .iter()
        .map(|row| LinkResponse {
            target_path: row.get("target_path"),
            fragment: row.get("fragment"),
            resolved_document_id: row.get("resolved_document_id"),
            resolved_chunk_id: row.get("resolved_chunk_id"),
        })
        .collect();

    Ok(DocumentResponse {
        id: resolved_id,
        source_path: doc_row.get("source_path"),
        title: doc_row.get("title"),
        kind: doc_row.get("kind"),
        versions: serde_json::from_str(&versions_json).unwrap_or_default(),
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        created_at: format_ts_iso(created_at),
        updated_at: format_ts_iso(updated_at),
        body: doc_row.get("body"),
        chunks,
        links,
    })
}

async fn fetch_doc_row(
    pool: &SqlitePool,
    id: &str,
) -> Result<Option<sqlx::sqlite::SqliteRow>> {
    let row = sqlx::query(
        r#"
        SELECT id, source_path, title, kind, versions_json, tags_json,
               body, created_at, updated_at
        FROM documents WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// CLI entry point: fetch and print a document.
pub async fn run_get(config: &Config, id: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let doc = get_document(&pool, id).await;
    pool.close().await;
    let doc = doc?;

    println!("--- Document ---");
    println!("id:         {}", doc.id);
    println!(
        "title:      {}",
        doc.title.as_deref().unwrap_or("(untitled)")
    );
    if let Some(ref path) = doc.source_path {
        println!("source:     {}", path);
    }
    println!("kind:       {}", doc.kind);
    println!("versions:   {}", doc.versions.join(", "));
    if !doc.tags.is_empty() {
        println!("tags:       {}", doc.tags.join(", "));
    }
    println!("created_at: {}", doc.created_at);
    println!("updated_at: {}", doc.updated_at);
    println!();

    println!("--- Chunks ({}) ---", doc.chunks.len());
    for chunk in &doc.chunks {
        println!(
            "[{}] lines {}-{} ({} tokens)",
            chunk.id, chunk.start_line, chunk.end_line, chunk.token_count
        );
        if let Some(ref crumb) = chunk.breadcrumb {
            println!("breadcrumb: {}", crumb);
        }
        if !chunk.warnings.is_empty() {
            println!("warnings: {}", chunk.warnings.join(", "));
        }
        println!("{}", chunk.content);
        println!();
    }

    if !doc.links.is_empty() {
        println!("--- Links ({}) ---", doc.links.len());
        for link in &doc.links {
            let state = match (&link.resolved_document_id, &link.resolved_chunk_id) {
                (Some(_), Some(chunk)) => format!("resolved -> {}", chunk),
                (Some(doc), None) => format!("resolved -> {}", doc),
                _ => "dangling".to_string(),
            };
            let frag = link
                .fragment
                .as_deref()
                .map(|f| format!("#{}", f))
                .unwrap_or_default();
            println!("{}{} ({})", link.target_path, frag, state);
        }
    }

    Ok(())
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}
