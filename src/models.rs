//! Core data models used throughout Quarry.
//!
//! These types represent the documents, chunks, links, and edges that flow
//! through the ingestion and retrieval pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Sentinel version label for resources with no recorded version.
///
/// Distinct from "no value": every document carries at least one version
/// label, and this is the default when none is supplied.
pub const UNVERSIONED: &str = "unversioned";

/// Kind tag for an ingested document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocKind {
    Reference,
    Executable,
}

impl DocKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocKind::Reference => "reference",
            DocKind::Executable => "executable",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "reference" => Some(DocKind::Reference),
            "executable" => Some(DocKind::Executable),
            _ => None,
        }
    }
}

impl fmt::Display for DocKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of ingested content stored in SQLite.
///
/// Identity is preserved across re-ingestion from the same source path;
/// all derived data (chunks, links, edges, vectors) is rebuilt.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub kind: DocKind,
    pub title: Option<String>,
    pub source_path: Option<String>,
    pub body: String,
    /// SHA-256 of the body, used for change detection on re-ingestion.
    pub fingerprint: String,
    /// Non-empty; defaults to `["unversioned"]`.
    pub versions: Vec<String>,
    pub tags: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Chunk identity: parent document id plus zero-based index.
///
/// Rendered as `"{parent}.{index}"`. Chunk ids are derived, never random,
/// so a rebuilt document produces the same ids for the same indices.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChunkId {
    pub document_id: String,
    pub index: i64,
}

impl ChunkId {
    pub fn new(document_id: impl Into<String>, index: i64) -> Self {
        Self {
            document_id: document_id.into(),
            index,
        }
    }

    /// Parse a rendered chunk id back into its parts.
    ///
    /// The split point is the last `.` so document ids containing dots
    /// round-trip correctly.
    pub fn parse(s: &str) -> Option<Self> {
        let (doc, idx) = s.rsplit_once('.')?;
        if doc.is_empty() {
            return None;
        }
        let index: i64 = idx.parse().ok()?;
        if index < 0 {
            return None;
        }
        Some(Self::new(doc, index))
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.document_id, self.index)
    }
}

/// Advisory warning attached to a chunk by the chunking engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkWarning {
    /// Chunk exceeded the max size and could not be split within the
    /// recursion bound.
    FailedToSplit,
    /// Chunk is below the min size and had no neighbor to merge into.
    Undersized,
    /// Chunk was over the max size before re-splitting.
    Oversized,
    /// Chunk is a continuation part produced by re-splitting an
    /// oversized chunk.
    Continuation,
}

impl ChunkWarning {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkWarning::FailedToSplit => "failed_to_split",
            ChunkWarning::Undersized => "undersized",
            ChunkWarning::Oversized => "oversized",
            ChunkWarning::Continuation => "continuation",
        }
    }
}

/// A retrievable sub-unit of a document.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Derived id: `"{document_id}.{chunk_index}"`.
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub content: String,
    /// Header text that opened this chunk, when the header strategy ran.
    pub title: Option<String>,
    /// Ancestor header path, e.g. `"Top > Section > Subsection"`.
    pub breadcrumb: Option<String>,
    /// Section header texts found in this chunk's final content, in order.
    pub section_headers: Vec<String>,
    /// 1-based inclusive line range in the parent document.
    pub start_line: i64,
    pub end_line: i64,
    pub token_count: i64,
    pub warnings: Vec<ChunkWarning>,
}

/// A directed reference discovered inside a document's content.
///
/// `resolved_document_id` is null while the target has not been ingested
/// (a dangling link); it is backfilled when a matching document arrives.
#[derive(Debug, Clone)]
pub struct Link {
    pub id: String,
    pub source_document_id: String,
    pub source_chunk_id: Option<String>,
    /// Target exactly as written in the source text.
    pub raw_target: String,
    /// Absolute target path after resolving against the source directory.
    pub target_path: String,
    pub fragment: Option<String>,
    pub display_text: String,
    /// 1-based line the reference was found on.
    pub source_line: i64,
    pub resolved_document_id: Option<String>,
    pub resolved_chunk_id: Option<String>,
}

/// Kind discriminator for edge endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Document,
    Chunk,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Document => "document",
            EntityKind::Chunk => "chunk",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "document" => Some(EntityKind::Document),
            "chunk" => Some(EntityKind::Chunk),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relation label carried by edges materialized from resolved links.
pub const RELATION_LINKS_TO: &str = "links_to";

/// A directed, typed relationship between two entities.
///
/// `(source, source_kind, target, target_kind, relation)` is unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub source_id: String,
    pub source_kind: EntityKind,
    pub target_id: String,
    pub target_kind: EntityKind,
    pub relation: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_id_roundtrip() {
        for (doc, n) in [("d1", 0), ("a.b.c", 7), ("550e8400-e29b", 12)] {
            let id = ChunkId::new(doc, n);
            let parsed = ChunkId::parse(&id.to_string()).unwrap();
            assert_eq!(parsed.document_id, doc);
            assert_eq!(parsed.index, n);
        }
    }

    #[test]
    fn chunk_id_parse_rejects_garbage() {
        assert!(ChunkId::parse("no-dot").is_none());
        assert!(ChunkId::parse("doc.").is_none());
        assert!(ChunkId::parse(".3").is_none());
        assert!(ChunkId::parse("doc.-1").is_none());
        assert!(ChunkId::parse("doc.x").is_none());
    }

    #[test]
    fn doc_kind_roundtrip() {
        assert_eq!(DocKind::parse("reference"), Some(DocKind::Reference));
        assert_eq!(DocKind::parse("executable"), Some(DocKind::Executable));
        assert_eq!(DocKind::parse("other"), None);
        assert_eq!(DocKind::Reference.as_str(), "reference");
    }

    #[test]
    fn entity_kind_roundtrip() {
        assert_eq!(EntityKind::parse("chunk"), Some(EntityKind::Chunk));
        assert_eq!(EntityKind::parse("document"), Some(EntityKind::Document));
        assert_eq!(EntityKind::parse(""), None);
    }
}
