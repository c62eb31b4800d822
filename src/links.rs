//! Link extraction and fragment matching.
//!
//! Scans document content for `[text](target)` cross-references, resolves
//! relative targets against the source document's directory, and provides
//! the normalization rules used to match link fragments to chunk section
//! headers. Resolution against the store (including backfill of dangling
//! links) lives in the ingestion pipeline; the pure pieces live here.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::Chunk;

/// A cross-reference found in raw content, before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedLink {
    /// Target exactly as written.
    pub raw_target: String,
    /// Absolute target path after resolving against the source directory.
    pub target_path: String,
    pub fragment: Option<String>,
    pub display_text: String,
    /// 1-based line the reference was found on.
    pub source_line: usize,
}

static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\(([^)\s]+)\)").unwrap());

/// Extract cross-references from document content.
///
/// Absolute web URLs and mailto targets are skipped. `#fragment`-only
/// targets are same-document references. Everything else is resolved
/// lexically against the source document's containing directory.
pub fn extract_links(source_path: &str, text: &str) -> Vec<ExtractedLink> {
    let mut links = Vec::new();
    for (i, line) in text.lines().enumerate() {
        for cap in LINK_RE.captures_iter(line) {
            // Image references are asset embeds, not cross-references.
            let Some(whole) = cap.get(0) else { continue };
            if whole.start() > 0 && line.as_bytes()[whole.start() - 1] == b'!' {
                continue;
            }
            let display_text = cap[1].to_string();
            let raw_target = cap[2].to_string();
            if is_external(&raw_target) {
                continue;
            }

            let (target_path, fragment) = if let Some(frag) = raw_target.strip_prefix('#') {
                (source_path.to_string(), non_empty(frag))
            } else {
                match raw_target.split_once('#') {
                    Some((path, frag)) if path.is_empty() => {
                        (source_path.to_string(), non_empty(frag))
                    }
                    Some((path, frag)) => (resolve_target(source_path, path), non_empty(frag)),
                    None => (resolve_target(source_path, &raw_target), None),
                }
            };

            links.push(ExtractedLink {
                raw_target,
                target_path,
                fragment,
                display_text,
                source_line: i + 1,
            });
        }
    }
    links
}

fn is_external(target: &str) -> bool {
    target.starts_with("http://") || target.starts_with("https://") || target.starts_with("mailto:")
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Resolve a relative target against the source document's directory.
///
/// Purely lexical: `.` and `..` components are folded without touching
/// the filesystem, since the target may not have been ingested yet.
pub fn resolve_target(source_path: &str, target: &str) -> String {
    if target.starts_with('/') {
        return normalize_path(target);
    }
    let dir = match source_path.rsplit_once('/') {
        Some((dir, _)) => dir,
        None => "",
    };
    let joined = if dir.is_empty() {
        target.to_string()
    } else {
        format!("{}/{}", dir, target)
    };
    normalize_path(&joined)
}

pub fn normalize_path(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for comp in path.split('/') {
        match comp {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }
    let body = parts.join("/");
    if absolute {
        format!("/{}", body)
    } else {
        body
    }
}

/// Normalize a fragment or section header for matching: lowercase, with
/// hyphens and underscores treated as spaces and runs of whitespace
/// collapsed.
pub fn normalize_fragment(s: &str) -> String {
    s.trim()
        .trim_start_matches('#')
        .chars()
        .map(|c| if c == '-' || c == '_' { ' ' } else { c })
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Find the chunk whose line range contains the given 1-based line.
pub fn chunk_for_line(chunks: &[Chunk], line: usize) -> Option<&Chunk> {
    let line = line as i64;
    chunks
        .iter()
        .find(|c| c.start_line <= line && line <= c.end_line)
}

/// Find the chunk whose section-header list matches the fragment under
/// [`normalize_fragment`]. `sections` pairs each chunk id with its
/// section-header texts.
pub fn match_fragment<'a>(
    sections: &'a [(String, Vec<String>)],
    fragment: &str,
) -> Option<&'a str> {
    let want = normalize_fragment(fragment);
    if want.is_empty() {
        return None;
    }
    sections
        .iter()
        .find(|(_, headers)| headers.iter().any(|h| normalize_fragment(h) == want))
        .map(|(id, _)| id.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_basic_links_with_line_numbers() {
        let text = "intro line\nsee [the guide](guide.md) for details\nand [api](ref/api.md#setup)\n";
        let links = extract_links("/docs/readme.md", text);
        assert_eq!(links.len(), 2);

        assert_eq!(links[0].display_text, "the guide");
        assert_eq!(links[0].target_path, "/docs/guide.md");
        assert_eq!(links[0].fragment, None);
        assert_eq!(links[0].source_line, 2);

        assert_eq!(links[1].target_path, "/docs/ref/api.md");
        assert_eq!(links[1].fragment.as_deref(), Some("setup"));
        assert_eq!(links[1].source_line, 3);
    }

    #[test]
    fn skips_web_and_mailto_targets() {
        let text = "[a](https://example.com) [b](http://example.com/x) [c](mailto:x@y.z) [d](local.md)";
        let links = extract_links("/docs/readme.md", text);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].target_path, "/docs/local.md");
    }

    #[test]
    fn skips_image_references() {
        let text = "![diagram](assets/flow.png) but [the doc](flow.md)\n![x](a.png)";
        let links = extract_links("/docs/readme.md", text);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].target_path, "/docs/flow.md");
    }

    #[test]
    fn fragment_only_targets_point_at_the_same_document() {
        let links = extract_links("/docs/readme.md", "[jump](#setup)");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].target_path, "/docs/readme.md");
        assert_eq!(links[0].fragment.as_deref(), Some("setup"));
    }

    #[test]
    fn relative_paths_resolve_against_source_directory() {
        assert_eq!(
            resolve_target("/docs/guide/intro.md", "../api.md"),
            "/docs/api.md"
        );
        assert_eq!(
            resolve_target("/docs/guide/intro.md", "./sibling.md"),
            "/docs/guide/sibling.md"
        );
        assert_eq!(resolve_target("/docs/a.md", "/abs/b.md"), "/abs/b.md");
        assert_eq!(resolve_target("readme.md", "other.md"), "other.md");
    }

    #[test]
    fn normalize_path_folds_dot_components() {
        assert_eq!(normalize_path("/a/b/../c/./d.md"), "/a/c/d.md");
        assert_eq!(normalize_path("a/../../b.md"), "../b.md");
        assert_eq!(normalize_path("/../a.md"), "/a.md");
    }

    #[test]
    fn fragment_normalization_rules() {
        assert_eq!(normalize_fragment("#Getting-Started"), "getting started");
        assert_eq!(normalize_fragment("setup_notes"), "setup notes");
        assert_eq!(normalize_fragment("  Mixed   Case "), "mixed case");
        assert_eq!(normalize_fragment(""), "");
    }

    #[test]
    fn chunk_attribution_by_line_range() {
        let chunks = vec![
            test_chunk("d.0", 1, 5),
            test_chunk("d.1", 6, 10),
            test_chunk("d.2", 11, 12),
        ];
        assert_eq!(chunk_for_line(&chunks, 1).unwrap().id, "d.0");
        assert_eq!(chunk_for_line(&chunks, 6).unwrap().id, "d.1");
        assert_eq!(chunk_for_line(&chunks, 12).unwrap().id, "d.2");
        assert!(chunk_for_line(&chunks, 40).is_none());
    }

    #[test]
    fn fragment_matches_normalized_section_header() {
        let sections = vec![
            ("d.0".to_string(), vec!["Overview".to_string()]),
            (
                "d.1".to_string(),
                vec!["Getting Started".to_string(), "Install".to_string()],
            ),
        ];
        assert_eq!(match_fragment(&sections, "getting-started"), Some("d.1"));
        assert_eq!(match_fragment(&sections, "#Install"), Some("d.1"));
        assert_eq!(match_fragment(&sections, "overview"), Some("d.0"));
        assert_eq!(match_fragment(&sections, "missing"), None);
        assert_eq!(match_fragment(&sections, ""), None);
    }

    fn test_chunk(id: &str, start: i64, end: i64) -> Chunk {
        Chunk {
            id: id.to_string(),
            document_id: "d".to_string(),
            chunk_index: 0,
            content: String::new(),
            title: None,
            breadcrumb: None,
            section_headers: Vec::new(),
            start_line: start,
            end_line: end,
            token_count: 0,
            warnings: Vec::new(),
        }
    }
}
