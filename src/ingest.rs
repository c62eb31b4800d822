//! Ingestion pipeline orchestration.
//!
//! Coordinates the full flow per document: fingerprint → chunk → extract
//! links → resolve → persist (one transaction) → backfill dangling links
//! → inline embedding (non-fatal on failure). Directory ingestion walks
//! the tree with include/exclude globs; one malformed file never aborts
//! the rest of a batch.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use sqlx::{Sqlite, SqlitePool, Transaction};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::chunk::{chunk_document, ChunkingReport};
use crate::config::Config;
use crate::db;
use crate::embedding::{self, create_provider};
use crate::links::{self, ExtractedLink};
use crate::models::{Chunk, DocKind, EntityKind, Link, RELATION_LINKS_TO, UNVERSIONED};

/// Caller-supplied metadata for an ingestion run.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub kind: DocKind,
    pub versions: Vec<String>,
    pub tags: Vec<String>,
    /// Re-ingest even when the content fingerprint is unchanged.
    pub force: bool,
}

impl IngestOptions {
    /// Version set actually stored: non-empty, defaulting to the sentinel.
    fn effective_versions(&self) -> Vec<String> {
        if self.versions.is_empty() {
            vec![UNVERSIONED.to_string()]
        } else {
            self.versions.clone()
        }
    }
}

/// Outcome of ingesting one document.
pub struct DocOutcome {
    pub document_id: String,
    pub skipped: bool,
    pub report: Option<ChunkingReport>,
    pub links_extracted: usize,
    pub links_resolved: usize,
    pub backfilled: usize,
    pub embeddings_written: usize,
    pub embeddings_pending: usize,
}

/// Ingest a file or a directory tree.
pub async fn run_ingest(config: &Config, path: &Path, opts: &IngestOptions) -> Result<()> {
    let pool = db::connect(config).await?;

    let mut files: Vec<PathBuf> = Vec::new();
    if path.is_dir() {
        files = collect_files(config, path)?;
        if files.is_empty() {
            println!("ingest {}", path.display());
            println!("  no matching files");
            pool.close().await;
            return Ok(());
        }
    } else if path.is_file() {
        files.push(path.to_path_buf());
    } else {
        bail!("Path does not exist: {}", path.display());
    }

    let mut ingested = 0usize;
    let mut skipped = 0usize;
    let mut failed = 0usize;

    for file in &files {
        match ingest_file(config, &pool, file, opts).await {
            Ok(outcome) => {
                print_outcome(config, file.display().to_string().as_str(), &outcome);
                if outcome.skipped {
                    skipped += 1;
                } else {
                    ingested += 1;
                }
            }
            Err(e) => {
                // One malformed file never aborts the batch.
                eprintln!("error: {}: {:#}", file.display(), e);
                failed += 1;
            }
        }
    }

    if files.len() > 1 {
        println!("ingest {}", path.display());
        println!("  files ingested: {}", ingested);
        println!("  files skipped: {}", skipped);
        if failed > 0 {
            println!("  files failed: {}", failed);
        }
    }
    println!("ok");

    pool.close().await;
    Ok(())
}

/// Ingest literal text under a caller-chosen source path.
pub async fn run_ingest_text(
    config: &Config,
    source_path: &str,
    text: &str,
    opts: &IngestOptions,
) -> Result<()> {
    let pool = db::connect(config).await?;
    let source_path = links::normalize_path(source_path);
    let title = derive_title(&source_path, text);
    let outcome = ingest_document(config, &pool, &source_path, title, text, opts).await?;
    print_outcome(config, &source_path, &outcome);
    println!("ok");
    pool.close().await;
    Ok(())
}

async fn ingest_file(
    config: &Config,
    pool: &SqlitePool,
    file: &Path,
    opts: &IngestOptions,
) -> Result<DocOutcome> {
    let absolute = file
        .canonicalize()
        .with_context(|| format!("Failed to resolve path: {}", file.display()))?;
    let source_path = absolute.to_string_lossy().to_string();
    let body = std::fs::read_to_string(&absolute)
        .with_context(|| format!("Failed to read file: {}", absolute.display()))?;
    let title = derive_title(&source_path, &body);
    ingest_document(config, pool, &source_path, title, &body, opts).await
}

/// Document title: first markdown header, falling back to the file stem.
fn derive_title(source_path: &str, body: &str) -> Option<String> {
    for line in body.lines() {
        let trimmed = line.trim_start();
        if let Some(rest) = trimmed.strip_prefix('#') {
            let text = rest.trim_start_matches('#').trim();
            if !text.is_empty() {
                return Some(text.to_string());
            }
        }
    }
    source_path
        .rsplit('/')
        .next()
        .map(|name| name.trim_end_matches(".md").trim_end_matches(".txt").to_string())
        .filter(|s| !s.is_empty())
}

/// Ingest one document end to end.
///
/// Write order inside the transaction is chunks before links before
/// edges; readers never observe a half-rebuilt document.
pub async fn ingest_document(
    config: &Config,
    pool: &SqlitePool,
    source_path: &str,
    title: Option<String>,
    body: &str,
    opts: &IngestOptions,
) -> Result<DocOutcome> {
    let fingerprint = fingerprint(body);

    let existing: Option<(String, String)> =
        sqlx::query_as("SELECT id, fingerprint FROM documents WHERE source_path = ?")
            .bind(source_path)
            .fetch_optional(pool)
            .await?;

    if let Some((id, old_fp)) = &existing {
        if *old_fp == fingerprint && !opts.force {
            tracing::debug!(source_path, "fingerprint unchanged, skipping");
            return Ok(DocOutcome {
                document_id: id.clone(),
                skipped: true,
                report: None,
                links_extracted: 0,
                links_resolved: 0,
                backfilled: 0,
                embeddings_written: 0,
                embeddings_pending: 0,
            });
        }
    }

    let doc_id = existing
        .map(|(id, _)| id)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let (chunks, report) = chunk_document(&doc_id, body, &config.chunking);

    let extracted = links::extract_links(source_path, body);
    let links_extracted = extracted.len();
    let resolved = resolve_links(pool, &doc_id, source_path, &chunks, extracted).await?;
    let links_resolved = resolved
        .iter()
        .filter(|l| l.resolved_document_id.is_some())
        .count();

    let now = chrono::Utc::now().timestamp();

    let mut tx = pool.begin().await?;

    upsert_document(
        &mut tx,
        &doc_id,
        source_path,
        title.as_deref(),
        body,
        &fingerprint,
        opts,
        now,
    )
    .await?;
    delete_derived(&mut tx, &doc_id).await?;
    insert_chunks(&mut tx, &chunks).await?;
    insert_links(&mut tx, &resolved).await?;
    for link in &resolved {
        insert_link_edge(&mut tx, link).await?;
    }
    let backfilled = backfill_dangling(&mut tx, &doc_id, source_path, &chunks).await?;

    tx.commit().await?;

    let (embeddings_written, embeddings_pending) =
        embed_inline(config, pool, &doc_id, body, &chunks).await;

    Ok(DocOutcome {
        document_id: doc_id,
        skipped: false,
        report: Some(report),
        links_extracted,
        links_resolved,
        backfilled,
        embeddings_written,
        embeddings_pending,
    })
}

fn fingerprint(body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ============ Link resolution ============

/// Attribute extracted links to chunks and resolve targets against the
/// store. Same-document targets resolve in memory against the fresh
/// chunk set, since those rows are not persisted yet. Self-links are
/// discarded.
async fn resolve_links(
    pool: &SqlitePool,
    doc_id: &str,
    source_path: &str,
    chunks: &[Chunk],
    extracted: Vec<ExtractedLink>,
) -> Result<Vec<Link>> {
    let own_sections: Vec<(String, Vec<String>)> = chunks
        .iter()
        .map(|c| (c.id.clone(), c.section_headers.clone()))
        .collect();

    let mut out = Vec::with_capacity(extracted.len());

    for link in extracted {
        let source_chunk_id =
            links::chunk_for_line(chunks, link.source_line).map(|c| c.id.clone());

        let (resolved_document_id, resolved_chunk_id) = if link.target_path == source_path {
            let chunk = link
                .fragment
                .as_deref()
                .and_then(|f| links::match_fragment(&own_sections, f))
                .map(|id| id.to_string());
            (Some(doc_id.to_string()), chunk)
        } else {
            resolve_against_store(pool, &link.target_path, link.fragment.as_deref()).await?
        };

        // Self-references within the same chunk are noise.
        if resolved_chunk_id.is_some() && resolved_chunk_id == source_chunk_id {
            tracing::debug!(target = %link.raw_target, "discarding self-link");
            continue;
        }

        if resolved_document_id.is_none() {
            tracing::debug!(target = %link.target_path, "link is dangling");
        }

        out.push(Link {
            id: Uuid::new_v4().to_string(),
            source_document_id: doc_id.to_string(),
            source_chunk_id,
            raw_target: link.raw_target,
            target_path: link.target_path,
            fragment: link.fragment,
            display_text: link.display_text,
            source_line: link.source_line as i64,
            resolved_document_id,
            resolved_chunk_id,
        });
    }

    Ok(out)
}

/// Look up a target path in the store and match the fragment against the
/// target document's chunk section headers.
async fn resolve_against_store(
    pool: &SqlitePool,
    target_path: &str,
    fragment: Option<&str>,
) -> Result<(Option<String>, Option<String>)> {
    let target_doc: Option<String> =
        sqlx::query_scalar("SELECT id FROM documents WHERE source_path = ?")
            .bind(target_path)
            .fetch_optional(pool)
            .await?;

    let Some(target_doc) = target_doc else {
        return Ok((None, None));
    };

    let chunk = match fragment {
        Some(frag) => {
            let sections = fetch_sections(pool, &target_doc).await?;
            links::match_fragment(&sections, frag).map(|id| id.to_string())
        }
        None => None,
    };

    Ok((Some(target_doc), chunk))
}

/// Chunk ids paired with their section-header lists for one document.
async fn fetch_sections(
    pool: &SqlitePool,
    document_id: &str,
) -> Result<Vec<(String, Vec<String>)>> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT id, section_headers_json FROM chunks WHERE document_id = ? ORDER BY chunk_index",
    )
    .bind(document_id)
    .fetch_all(pool)
    .await?;

    let mut out = Vec::with_capacity(rows.len());
    for (id, json) in rows {
        let headers: Vec<String> = serde_json::from_str(&json).unwrap_or_default();
        out.push((id, headers));
    }
    Ok(out)
}

// ============ Persistence ============

#[allow(clippy::too_many_arguments)]
async fn upsert_document(
    tx: &mut Transaction<'_, Sqlite>,
    doc_id: &str,
    source_path: &str,
    title: Option<&str>,
    body: &str,
    fingerprint: &str,
    opts: &IngestOptions,
    now: i64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO documents (id, source_path, title, kind, versions_json, tags_json, body, fingerprint, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(source_path) DO UPDATE SET
            title = excluded.title,
            kind = excluded.kind,
            versions_json = excluded.versions_json,
            tags_json = excluded.tags_json,
            body = excluded.body,
            fingerprint = excluded.fingerprint,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(doc_id)
    .bind(source_path)
    .bind(title)
    .bind(opts.kind.as_str())
    .bind(serde_json::to_string(&opts.effective_versions())?)
    .bind(serde_json::to_string(&opts.tags)?)
    .bind(body)
    .bind(fingerprint)
    .bind(now)
    .bind(now)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Delete a document's derived rows: chunks, vectors, outgoing links,
/// outgoing edges. Incoming links and edges from other documents are
/// left untouched.
async fn delete_derived(tx: &mut Transaction<'_, Sqlite>, doc_id: &str) -> Result<()> {
    sqlx::query("DELETE FROM vectors WHERE document_id = ?")
        .bind(doc_id)
        .execute(&mut **tx)
        .await?;
    sqlx::query("DELETE FROM chunks WHERE document_id = ?")
        .bind(doc_id)
        .execute(&mut **tx)
        .await?;
    sqlx::query("DELETE FROM links WHERE source_document_id = ?")
        .bind(doc_id)
        .execute(&mut **tx)
        .await?;
    // Outgoing edges from the document itself and from its chunks.
    sqlx::query("DELETE FROM edges WHERE source_id = ? OR source_id LIKE ? || '.%'")
        .bind(doc_id)
        .bind(doc_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn insert_chunks(tx: &mut Transaction<'_, Sqlite>, chunks: &[Chunk]) -> Result<()> {
    for chunk in chunks {
        sqlx::query(
            r#"
            INSERT INTO chunks (id, document_id, chunk_index, content, title, breadcrumb, section_headers_json, start_line, end_line, token_count, warnings_json)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&chunk.id)
        .bind(&chunk.document_id)
        .bind(chunk.chunk_index)
        .bind(&chunk.content)
        .bind(&chunk.title)
        .bind(&chunk.breadcrumb)
        .bind(serde_json::to_string(&chunk.section_headers)?)
        .bind(chunk.start_line)
        .bind(chunk.end_line)
        .bind(chunk.token_count)
        .bind(serde_json::to_string(&chunk.warnings)?)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn insert_links(tx: &mut Transaction<'_, Sqlite>, links: &[Link]) -> Result<()> {
    for link in links {
        sqlx::query(
            r#"
            INSERT INTO links (id, source_document_id, source_chunk_id, target_path, fragment, display_text, source_line, resolved_document_id, resolved_chunk_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&link.id)
        .bind(&link.source_document_id)
        .bind(&link.source_chunk_id)
        .bind(&link.target_path)
        .bind(&link.fragment)
        .bind(&link.display_text)
        .bind(link.source_line)
        .bind(&link.resolved_document_id)
        .bind(&link.resolved_chunk_id)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

/// Materialize the `links_to` edge for a resolved link. The edge runs
/// from the most specific known source to the most specific known target.
async fn insert_link_edge(tx: &mut Transaction<'_, Sqlite>, link: &Link) -> Result<()> {
    let Some(target_doc) = &link.resolved_document_id else {
        return Ok(());
    };

    let (source_id, source_kind) = match &link.source_chunk_id {
        Some(id) => (id.as_str(), EntityKind::Chunk),
        None => (link.source_document_id.as_str(), EntityKind::Document),
    };
    let (target_id, target_kind) = match &link.resolved_chunk_id {
        Some(id) => (id.as_str(), EntityKind::Chunk),
        None => (target_doc.as_str(), EntityKind::Document),
    };

    sqlx::query(
        r#"
        INSERT INTO edges (id, source_id, source_kind, target_id, target_kind, relation)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(source_id, source_kind, target_id, target_kind, relation) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(source_id)
    .bind(source_kind.as_str())
    .bind(target_id)
    .bind(target_kind.as_str())
    .bind(RELATION_LINKS_TO)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Resolve previously dangling links that point at the document being
/// ingested, and materialize their edges. Referrers do not need to be
/// re-ingested.
async fn backfill_dangling(
    tx: &mut Transaction<'_, Sqlite>,
    doc_id: &str,
    source_path: &str,
    chunks: &[Chunk],
) -> Result<usize> {
    let dangling: Vec<(String, String, Option<String>, Option<String>)> = sqlx::query_as(
        r#"
        SELECT id, source_document_id, source_chunk_id, fragment
        FROM links
        WHERE target_path = ? AND resolved_document_id IS NULL AND source_document_id != ?
        "#,
    )
    .bind(source_path)
    .bind(doc_id)
    .fetch_all(&mut **tx)
    .await?;

    if dangling.is_empty() {
        return Ok(0);
    }

    let sections: Vec<(String, Vec<String>)> = chunks
        .iter()
        .map(|c| (c.id.clone(), c.section_headers.clone()))
        .collect();

    let mut count = 0usize;
    for (link_id, source_document_id, source_chunk_id, fragment) in dangling {
        let resolved_chunk_id = fragment
            .as_deref()
            .and_then(|f| links::match_fragment(&sections, f))
            .map(|id| id.to_string());

        sqlx::query("UPDATE links SET resolved_document_id = ?, resolved_chunk_id = ? WHERE id = ?")
            .bind(doc_id)
            .bind(&resolved_chunk_id)
            .bind(&link_id)
            .execute(&mut **tx)
            .await?;

        let stub = Link {
            id: link_id,
            source_document_id,
            source_chunk_id,
            raw_target: String::new(),
            target_path: source_path.to_string(),
            fragment,
            display_text: String::new(),
            source_line: 0,
            resolved_document_id: Some(doc_id.to_string()),
            resolved_chunk_id,
        };
        insert_link_edge(tx, &stub).await?;
        count += 1;
    }

    tracing::debug!(count, source_path, "backfilled dangling links");
    Ok(count)
}

// ============ Inline embedding ============

/// Upper bound on the text embedded for the document-level vector.
const DOC_EMBED_MAX_CHARS: usize = 8000;

/// Embed the document body and all chunk contents, writing vectors rows.
/// Failures degrade recall instead of aborting ingestion: the first
/// error stops embedding and reports the remainder as pending.
async fn embed_inline(
    config: &Config,
    pool: &SqlitePool,
    doc_id: &str,
    body: &str,
    chunks: &[Chunk],
) -> (usize, usize) {
    if !config.embedding.is_enabled() {
        return (0, chunks.len() + 1);
    }

    match try_embed(config, pool, doc_id, body, chunks).await {
        Ok(written) => (written, 0),
        Err(e) => {
            tracing::warn!(error = %e, doc_id, "inline embedding failed");
            eprintln!("warning: embedding failed for {}: {:#}", doc_id, e);
            (0, chunks.len() + 1)
        }
    }
}

async fn try_embed(
    config: &Config,
    pool: &SqlitePool,
    doc_id: &str,
    body: &str,
    chunks: &[Chunk],
) -> Result<usize> {
    let provider = create_provider(&config.embedding)?;

    let mut texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
    texts.push(body.chars().take(DOC_EMBED_MAX_CHARS).collect());

    let vectors = embedding::embed_all(provider.as_ref(), &config.embedding, &texts).await?;

    let mut written = 0usize;
    for (i, vec) in vectors.iter().enumerate() {
        let (owner_id, owner_kind) = if i < chunks.len() {
            (chunks[i].id.as_str(), EntityKind::Chunk)
        } else {
            (doc_id, EntityKind::Document)
        };
        sqlx::query(
            r#"
            INSERT INTO vectors (owner_id, owner_kind, document_id, model, dims, embedding)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(owner_id, owner_kind) DO UPDATE SET
                document_id = excluded.document_id,
                model = excluded.model,
                dims = excluded.dims,
                embedding = excluded.embedding
            "#,
        )
        .bind(owner_id)
        .bind(owner_kind.as_str())
        .bind(doc_id)
        .bind(provider.model_name())
        .bind(vec.len() as i64)
        .bind(embedding::vec_to_blob(vec))
        .execute(pool)
        .await?;
        written += 1;
    }

    Ok(written)
}

// ============ Directory walking ============

fn collect_files(config: &Config, root: &Path) -> Result<Vec<PathBuf>> {
    let include_set = build_globset(&config.ingest.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(config.ingest.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut files = Vec::new();

    let walker = WalkDir::new(root).follow_links(config.ingest.follow_symlinks);
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) {
            continue;
        }
        if !include_set.is_match(&rel_str) {
            continue;
        }

        files.push(path.to_path_buf());
    }

    // Sort for deterministic ordering
    files.sort();

    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

// ============ Reporting ============

fn print_outcome(config: &Config, label: &str, outcome: &DocOutcome) {
    println!("ingest {}", label);
    println!("  document: {}", outcome.document_id);
    if outcome.skipped {
        println!("  unchanged, skipped");
        return;
    }
    if let Some(report) = &outcome.report {
        println!("  strategy: {} ({})", report.strategy, report.reason);
        let tokens: Vec<String> = report.token_counts.iter().map(|t| t.to_string()).collect();
        println!(
            "  chunks: {} (tokens: {})",
            report.chunk_count,
            tokens.join(", ")
        );
        if report.warning_count > 0 {
            println!("  warnings: {}", report.warning_count);
        }
    }
    println!(
        "  links: {} extracted, {} resolved",
        outcome.links_extracted, outcome.links_resolved
    );
    if outcome.backfilled > 0 {
        println!("  backfilled: {} dangling links", outcome.backfilled);
    }
    if config.embedding.is_enabled() {
        println!("  embeddings written: {}", outcome.embeddings_written);
        println!("  embeddings pending: {}", outcome.embeddings_pending);
    }
}
