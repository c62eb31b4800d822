//! Retrieval orchestrator.
//!
//! Embeds the query, pulls chunk- and document-level vector candidates
//! from storage (cosine similarity computed in Rust over stored BLOBs),
//! runs them through the scoring pipeline in [`crate::score`], groups
//! chunk hits by parent document, and renders the result.

use anyhow::{bail, Result};
use sqlx::{Row, SqlitePool};
use std::collections::{HashMap, HashSet};

use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::models::{DocKind, RELATION_LINKS_TO};
use crate::score::{self, Candidate, HitLevel, ScoredGroup};

/// Optional narrowing applied on top of vector retrieval.
#[derive(Debug, Clone, Default)]
pub struct QueryFilters {
    /// Document must carry at least one of these tags.
    pub tags: Vec<String>,
    /// Requested version labels; disjoint documents are excluded.
    pub versions: Vec<String>,
    pub kind: Option<DocKind>,
}

/// A chunk hit inside a result group.
#[derive(Debug, Clone)]
pub struct ChunkHit {
    pub id: String,
    pub score: f64,
    pub title: Option<String>,
    pub breadcrumb: Option<String>,
    pub snippet: String,
}

/// One document's worth of results.
#[derive(Debug, Clone)]
pub struct GroupResult {
    pub document_id: String,
    pub title: Option<String>,
    pub source_path: Option<String>,
    pub score: f64,
    pub chunks: Vec<ChunkHit>,
}

/// Run a query and print the grouped results.
pub async fn run_search(
    config: &Config,
    query: &str,
    filters: &QueryFilters,
    limit: Option<i64>,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    if !config.embedding.is_enabled() {
        bail!("Search requires embeddings. Set [embedding] provider in config.");
    }

    let pool = db::connect(config).await?;
    let groups = run_query(config, &pool, query, filters, limit).await?;
    pool.close().await;

    if groups.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, group) in groups.iter().enumerate() {
        let title = group.title.as_deref().unwrap_or("(untitled)");
        println!("{}. [{:.2}] {}", i + 1, group.score, title);
        if let Some(path) = &group.source_path {
            println!("    source: {}", path);
        }
        println!("    id: {}", group.document_id);
        for hit in &group.chunks {
            let label = hit
                .breadcrumb
                .as_deref()
                .or(hit.title.as_deref())
                .unwrap_or("(chunk)");
            println!("    - [{:.2}] {} ({})", hit.score, label, hit.id);
            println!("      \"{}\"", hit.snippet.replace('\n', " ").trim());
        }
        println!();
    }

    Ok(())
}

/// Execute the full scoring pipeline and return structured groups.
pub async fn run_query(
    config: &Config,
    pool: &SqlitePool,
    query: &str,
    filters: &QueryFilters,
    limit: Option<i64>,
) -> Result<Vec<GroupResult>> {
    if query.trim().is_empty() {
        return Ok(Vec::new());
    }

    let provider = embedding::create_provider(&config.embedding)?;
    let query_vec = provider.embed(query).await?;
    let terms = score::query_terms(query);

    let candidate_k = config.retrieval.candidate_k as usize;
    let chunk_rows = fetch_chunk_candidates(pool, &query_vec, candidate_k).await?;
    let doc_rows = fetch_document_candidates(pool, &query_vec, candidate_k).await?;

    if chunk_rows.is_empty() && doc_rows.is_empty() {
        return Ok(Vec::new());
    }

    // Document metadata for every candidate's parent.
    let doc_ids: HashSet<String> = chunk_rows
        .iter()
        .map(|c| c.document_id.clone())
        .chain(doc_rows.iter().map(|d| d.document_id.clone()))
        .collect();
    let docs = fetch_doc_meta(pool, &doc_ids).await?;

    let mut candidates: Vec<Candidate> = Vec::new();
    let mut chunk_meta: HashMap<String, ChunkRow> = HashMap::new();

    for row in chunk_rows {
        let Some(doc) = docs.get(&row.document_id) else {
            continue;
        };
        if !passes_filters(doc, filters) {
            continue;
        }
        let base = score::distance_to_score(row.distance);
        let title = row.title.as_deref().or(doc.title.as_deref());
        let overlap = score::keyword_overlap(&terms, title, &doc.tags, &row.content);
        let mut s = base + score::keyword_boost(overlap);
        if let Some(mult) = version_multiplier(doc, filters) {
            if mult == 0.0 {
                tracing::debug!(id = %row.id, "excluded by disjoint versions");
                continue;
            }
            s *= mult;
        }
        candidates.push(Candidate {
            id: row.id.clone(),
            document_id: row.document_id.clone(),
            level: HitLevel::Chunk,
            score: s,
        });
        chunk_meta.insert(row.id.clone(), row);
    }

    for row in doc_rows {
        let Some(doc) = docs.get(&row.document_id) else {
            continue;
        };
        if !passes_filters(doc, filters) {
            continue;
        }
        let base = score::distance_to_score(row.distance);
        let overlap =
            score::keyword_overlap(&terms, doc.title.as_deref(), &doc.tags, &row.body);
        let mut s = base + score::keyword_boost(overlap);
        if let Some(mult) = version_multiplier(doc, filters) {
            if mult == 0.0 {
                continue;
            }
            s *= mult;
        }
        candidates.push(Candidate {
            id: row.document_id.clone(),
            document_id: row.document_id,
            level: HitLevel::Document,
            score: s,
        });
    }

    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    score::apply_chunk_specificity(&mut candidates);
    score::clamp_scores(&mut candidates);

    let edges = fetch_link_edges(pool).await?;
    score::apply_link_boost(&mut candidates, &edges);

    let mut groups = score::group_by_document(candidates);
    let final_limit = limit.unwrap_or(config.retrieval.final_limit).max(1) as usize;
    groups.truncate(final_limit);

    Ok(render_groups(groups, &docs, &chunk_meta))
}

fn render_groups(
    groups: Vec<ScoredGroup>,
    docs: &HashMap<String, DocMeta>,
    chunk_meta: &HashMap<String, ChunkRow>,
) -> Vec<GroupResult> {
    groups
        .into_iter()
        .map(|g| {
            let doc = docs.get(&g.document_id);
            let chunks = g
                .chunks
                .iter()
                .filter_map(|c| {
                    chunk_meta.get(&c.id).map(|m| ChunkHit {
                        id: c.id.clone(),
                        score: c.score,
                        title: m.title.clone(),
                        breadcrumb: m.breadcrumb.clone(),
                        snippet: m.content.chars().take(240).collect(),
                    })
                })
                .collect();
            GroupResult {
                document_id: g.document_id,
                title: doc.and_then(|d| d.title.clone()),
                source_path: doc.and_then(|d| d.source_path.clone()),
                score: g.score,
                chunks,
            }
        })
        .collect()
}

fn passes_filters(doc: &DocMeta, filters: &QueryFilters) -> bool {
    if let Some(kind) = filters.kind {
        if doc.kind != kind {
            return false;
        }
    }
    if !filters.tags.is_empty() {
        let wanted: HashSet<String> = filters.tags.iter().map(|t| t.to_lowercase()).collect();
        if !doc.tags.iter().any(|t| wanted.contains(&t.to_lowercase())) {
            return false;
        }
    }
    true
}

/// Version multiplier for the document, or `None` when the caller did
/// not request versions (signal skipped).
fn version_multiplier(doc: &DocMeta, filters: &QueryFilters) -> Option<f64> {
    if filters.versions.is_empty() {
        return None;
    }
    let m = score::classify_versions(&doc.versions, &filters.versions);
    Some(score::version_multiplier(m))
}

// ============ Candidate fetching ============

struct ChunkRow {
    id: String,
    document_id: String,
    content: String,
    title: Option<String>,
    breadcrumb: Option<String>,
    distance: f64,
}

struct DocRow {
    document_id: String,
    body: String,
    distance: f64,
}

struct DocMeta {
    title: Option<String>,
    source_path: Option<String>,
    kind: DocKind,
    versions: Vec<String>,
    tags: Vec<String>,
}

async fn fetch_chunk_candidates(
    pool: &SqlitePool,
    query_vec: &[f32],
    candidate_k: usize,
) -> Result<Vec<ChunkRow>> {
    let rows = sqlx::query(
        r#"
        SELECT c.id, c.document_id, c.content, c.title, c.breadcrumb, v.embedding
        FROM vectors v
        JOIN chunks c ON c.id = v.owner_id
        WHERE v.owner_kind = 'chunk'
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut candidates: Vec<ChunkRow> = rows
        .iter()
        .map(|row| {
            let blob: Vec<u8> = row.get("embedding");
            let vec = embedding::blob_to_vec(&blob);
            ChunkRow {
                id: row.get("id"),
                document_id: row.get("document_id"),
                content: row.get("content"),
                title: row.get("title"),
                breadcrumb: row.get("breadcrumb"),
                distance: embedding::cosine_distance(query_vec, &vec),
            }
        })
        .collect();

    candidates.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.truncate(candidate_k);
    Ok(candidates)
}

async fn fetch_document_candidates(
    pool: &SqlitePool,
    query_vec: &[f32],
    candidate_k: usize,
) -> Result<Vec<DocRow>> {
    let rows = sqlx::query(
        r#"
        SELECT d.id, d.body, v.embedding
        FROM vectors v
        JOIN documents d ON d.id = v.owner_id
        WHERE v.owner_kind = 'document'
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut candidates: Vec<DocRow> = rows
        .iter()
        .map(|row| {
            let blob: Vec<u8> = row.get("embedding");
            let vec = embedding::blob_to_vec(&blob);
            DocRow {
                document_id: row.get("id"),
                body: row.get("body"),
                distance: embedding::cosine_distance(query_vec, &vec),
            }
        })
        .collect();

    candidates.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.truncate(candidate_k);
    Ok(candidates)
}

async fn fetch_doc_meta(
    pool: &SqlitePool,
    doc_ids: &HashSet<String>,
) -> Result<HashMap<String, DocMeta>> {
    let mut out = HashMap::with_capacity(doc_ids.len());
    for id in doc_ids {
        let row = sqlx::query(
            "SELECT title, source_path, kind, versions_json, tags_json FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        if let Some(row) = row {
            let kind_str: String = row.get("kind");
            let versions_json: String = row.get("versions_json");
            let tags_json: String = row.get("tags_json");
            out.insert(
                id.clone(),
                DocMeta {
                    title: row.get("title"),
                    source_path: row.get("source_path"),
                    kind: DocKind::parse(&kind_str).unwrap_or(DocKind::Reference),
                    versions: serde_json::from_str(&versions_json).unwrap_or_default(),
                    tags: serde_json::from_str(&tags_json).unwrap_or_default(),
                },
            );
        }
    }
    Ok(out)
}

/// All `links_to` edges as (source, target) pairs for link boosting.
async fn fetch_link_edges(pool: &SqlitePool) -> Result<Vec<(String, String)>> {
    let rows: Vec<(String, String)> =
        sqlx::query_as("SELECT source_id, target_id FROM edges WHERE relation = ?")
            .bind(RELATION_LINKS_TO)
            .fetch_all(pool)
            .await?;
    Ok(rows)
}
