//! Chunking engine.
//!
//! Splits document text into retrievable [`Chunk`]s using one of four
//! strategies (`single`, `headers`, `delimiter`, `fixed`), selected
//! automatically from the document's shape unless pinned by config.
//! Post-processing re-splits oversized chunks, merges undersized ones,
//! re-indexes contiguously from zero, and extracts per-chunk section
//! headers.
//!
//! No input ever fails chunking: pathological documents degrade to
//! coarse, warning-flagged chunks.

use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::config::ChunkingConfig;
use crate::models::{Chunk, ChunkId, ChunkWarning};
use crate::tokens::{estimate_tokens, CHARS_PER_TOKEN};

/// Recursion bound for re-splitting oversized chunks.
const MAX_SPLIT_DEPTH: usize = 3;

/// Strategy requested by configuration; `Auto` picks per document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategySelector {
    Auto,
    Single,
    Headers,
    Delimiter,
    Fixed,
}

pub fn parse_selector(s: &str) -> Option<StrategySelector> {
    match s {
        "auto" => Some(StrategySelector::Auto),
        "single" => Some(StrategySelector::Single),
        "headers" => Some(StrategySelector::Headers),
        "delimiter" => Some(StrategySelector::Delimiter),
        "fixed" => Some(StrategySelector::Fixed),
        _ => None,
    }
}

/// Strategy actually used for a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Single,
    Headers,
    Delimiter,
    Fixed,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Single => "single",
            Strategy::Headers => "headers",
            Strategy::Delimiter => "delimiter",
            Strategy::Fixed => "fixed",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of which strategy ran and what it produced.
#[derive(Debug, Clone)]
pub struct ChunkingReport {
    pub strategy: Strategy,
    pub reason: String,
    pub chunk_count: usize,
    pub token_counts: Vec<usize>,
    pub warning_count: usize,
}

/// Working representation of a chunk before indices and ids are assigned.
#[derive(Debug, Clone, Default)]
struct Draft {
    content: String,
    title: Option<String>,
    breadcrumb: Option<String>,
    /// 1-based inclusive line range in the source document.
    start_line: usize,
    end_line: usize,
    warnings: Vec<ChunkWarning>,
}

/// Split a document into chunks. Never fails; every document yields at
/// least one chunk.
pub fn chunk_document(
    document_id: &str,
    text: &str,
    cfg: &ChunkingConfig,
) -> (Vec<Chunk>, ChunkingReport) {
    let (strategy, reason) = select_strategy(text, cfg);
    let lines: Vec<&str> = text.lines().collect();
    let line_count = lines.len().max(1);

    let mut drafts = match strategy {
        Strategy::Single => vec![single_draft(text, line_count)],
        Strategy::Headers => split_by_headers(&lines, cfg),
        Strategy::Delimiter => split_by_delimiter(&lines, cfg),
        Strategy::Fixed => {
            let numbered: Vec<(usize, &str)> =
                lines.iter().enumerate().map(|(i, l)| (i + 1, *l)).collect();
            let mut drafts = split_fixed(
                &numbered,
                cfg.chunk_size_tokens,
                cfg.overlap_tokens,
                cfg.preserve_sentences,
            );
            // Blank leading/trailing lines are skipped by the splitter;
            // stretch the ranges back over them.
            repair_line_coverage(&mut drafts, line_count);
            drafts
        }
    };

    // A strategy may come up empty on degenerate input (e.g. a document
    // that is nothing but delimiter lines); fall back to one whole chunk.
    if drafts.is_empty() {
        drafts.push(single_draft(text, line_count));
    }

    let drafts = split_oversized(drafts, cfg);
    let drafts = merge_undersized(drafts, cfg, strategy);

    finalize(document_id, drafts, strategy, reason)
}

// ============ Strategy selection ============

fn select_strategy(text: &str, cfg: &ChunkingConfig) -> (Strategy, String) {
    match parse_selector(&cfg.strategy) {
        Some(StrategySelector::Single) => (Strategy::Single, "configured".to_string()),
        Some(StrategySelector::Headers) => (Strategy::Headers, "configured".to_string()),
        Some(StrategySelector::Delimiter) => (Strategy::Delimiter, "configured".to_string()),
        Some(StrategySelector::Fixed) => (Strategy::Fixed, "configured".to_string()),
        Some(StrategySelector::Auto) | None => auto_select(text, cfg),
    }
}

fn auto_select(text: &str, cfg: &ChunkingConfig) -> (Strategy, String) {
    let tokens = estimate_tokens(text);
    if tokens < 2 * cfg.min_chunk_tokens {
        return (
            Strategy::Single,
            format!("~{} tokens, under 2x min_chunk_tokens", tokens),
        );
    }

    let header_count = text.lines().filter(|l| parse_header(l).is_some()).count();
    if header_count >= 3 {
        return (
            Strategy::Headers,
            format!("{} markdown headers", header_count),
        );
    }

    if let Ok(re) = Regex::new(&cfg.delimiter_pattern) {
        let delim_count = text.lines().filter(|l| re.is_match(l)).count();
        if delim_count >= 3 {
            return (
                Strategy::Delimiter,
                format!("{} delimiter lines", delim_count),
            );
        }
    }

    (Strategy::Fixed, "no structure detected".to_string())
}

fn single_draft(text: &str, line_count: usize) -> Draft {
    Draft {
        content: text.to_string(),
        start_line: 1,
        end_line: line_count,
        ..Default::default()
    }
}

// ============ Header strategy ============

/// Parse a markdown header line into (level, title).
fn parse_header(line: &str) -> Option<(usize, String)> {
    let trimmed = line.trim_start();
    let hashes = trimmed.bytes().take_while(|&b| b == b'#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &trimmed[hashes..];
    if !rest.starts_with(' ') && !rest.starts_with('\t') {
        return None;
    }
    let title = rest.trim();
    if title.is_empty() {
        return None;
    }
    Some((hashes, title.to_string()))
}

struct HeaderEntry {
    level: usize,
    title: String,
}

fn split_by_headers(lines: &[&str], cfg: &ChunkingConfig) -> Vec<Draft> {
    let split_levels: HashSet<usize> = cfg.header_split_levels.iter().copied().collect();

    let mut drafts: Vec<Draft> = Vec::new();
    let mut stack: Vec<HeaderEntry> = Vec::new();
    let mut buf: Vec<&str> = Vec::new();
    let mut start_line = 1usize;
    let mut title: Option<String> = None;
    let mut breadcrumb: Option<String> = None;

    for (i, line) in lines.iter().enumerate() {
        let line_no = i + 1;
        if let Some((level, text)) = parse_header(line) {
            // Pop entries at or below this level, then push the new header.
            while stack.last().is_some_and(|e| e.level >= level) {
                stack.pop();
            }
            stack.push(HeaderEntry {
                level,
                title: text.clone(),
            });

            if split_levels.contains(&level) {
                flush_draft(
                    &mut drafts,
                    &mut buf,
                    start_line,
                    line_no.saturating_sub(1),
                    title.take(),
                    breadcrumb.take(),
                );
                title = Some(text);
                breadcrumb = Some(
                    stack
                        .iter()
                        .map(|e| e.title.as_str())
                        .collect::<Vec<_>>()
                        .join(" > "),
                );
                start_line = line_no;
            }
            // Headers below the split levels stay in the current chunk's
            // content; the stack update above keeps their titles reachable.
        }
        buf.push(line);
    }

    flush_draft(
        &mut drafts,
        &mut buf,
        start_line,
        lines.len().max(start_line),
        title,
        breadcrumb,
    );

    // Stretch ranges over any blank preamble that was skipped, so the
    // line metadata covers the whole document without gaps.
    repair_line_coverage(&mut drafts, lines.len().max(1));

    drafts
}

/// Push the buffered lines as a draft unless they are all blank.
fn flush_draft(
    drafts: &mut Vec<Draft>,
    buf: &mut Vec<&str>,
    start_line: usize,
    end_line: usize,
    title: Option<String>,
    breadcrumb: Option<String>,
) {
    let blank = buf.iter().all(|l| l.trim().is_empty());
    if blank {
        buf.clear();
        return;
    }
    drafts.push(Draft {
        content: buf.join("\n"),
        title,
        breadcrumb,
        start_line,
        end_line: end_line.max(start_line),
        warnings: Vec::new(),
    });
    buf.clear();
}

/// Make adjacent drafts cover the source lines contiguously: the first
/// draft starts at line 1, each subsequent draft starts right after its
/// predecessor ends, and the last draft ends at the final line.
fn repair_line_coverage(drafts: &mut [Draft], total_lines: usize) {
    let mut prev_end = 0usize;
    for draft in drafts.iter_mut() {
        if draft.start_line > prev_end + 1 {
            draft.start_line = prev_end + 1;
        }
        if draft.end_line < draft.start_line {
            draft.end_line = draft.start_line;
        }
        prev_end = draft.end_line;
    }
    if let Some(last) = drafts.last_mut() {
        if last.end_line < total_lines {
            last.end_line = total_lines;
        }
    }
}

// ============ Delimiter strategy ============

fn split_by_delimiter(lines: &[&str], cfg: &ChunkingConfig) -> Vec<Draft> {
    // The pattern was validated at config load; an invalid one here means
    // the config was built by hand, so degrade to one whole chunk.
    let Ok(re) = Regex::new(&cfg.delimiter_pattern) else {
        return Vec::new();
    };

    let mut drafts: Vec<Draft> = Vec::new();
    let mut buf: Vec<&str> = Vec::new();
    let mut start_line = 1usize;

    for (i, line) in lines.iter().enumerate() {
        let line_no = i + 1;
        if re.is_match(line) {
            // The delimiter line itself is attributed to the segment it
            // closes, keeping line coverage gap-free.
            flush_draft(&mut drafts, &mut buf, start_line, line_no, None, None);
            start_line = line_no + 1;
        } else {
            buf.push(line);
        }
    }
    flush_draft(
        &mut drafts,
        &mut buf,
        start_line,
        lines.len().max(start_line),
        None,
        None,
    );

    repair_line_coverage(&mut drafts, lines.len().max(1));

    drafts
}

// ============ Fixed strategy ============

/// Accumulate lines up to `target_tokens * CHARS_PER_TOKEN` characters per
/// chunk. Single lines larger than the budget are split in place, backing
/// off to sentence boundaries when requested. An overlap tail from each
/// chunk is prepended to the next one's content; line ranges stay
/// contiguous.
fn split_fixed(
    lines: &[(usize, &str)],
    target_tokens: usize,
    overlap_tokens: usize,
    preserve_sentences: bool,
) -> Vec<Draft> {
    let max_chars = (target_tokens * CHARS_PER_TOKEN).max(1);
    let overlap_chars = overlap_tokens * CHARS_PER_TOKEN;

    let mut drafts: Vec<Draft> = Vec::new();
    let mut buf = String::new();
    let mut tail = String::new();
    let mut start = lines.first().map(|(n, _)| *n).unwrap_or(1);
    let mut last = start;

    for &(line_no, line) in lines {
        if line.len() > max_chars {
            if !buf.trim().is_empty() {
                push_fixed_draft(&mut drafts, &buf, &mut tail, start, last, overlap_chars);
            }
            buf.clear();

            let mut remaining = line;
            while !remaining.is_empty() {
                let split_at = split_point(remaining, max_chars, preserve_sentences);
                let piece = &remaining[..split_at];
                push_fixed_draft(&mut drafts, piece, &mut tail, line_no, line_no, overlap_chars);
                remaining = &remaining[split_at..];
            }
            start = line_no + 1;
            last = line_no;
            continue;
        }

        let projected = if buf.is_empty() {
            line.len()
        } else {
            buf.len() + 1 + line.len()
        };
        if projected > max_chars && !buf.trim().is_empty() {
            push_fixed_draft(&mut drafts, &buf, &mut tail, start, last, overlap_chars);
            buf.clear();
            start = line_no;
        }
        if !buf.is_empty() {
            buf.push('\n');
        }
        buf.push_str(line);
        last = line_no;
    }

    if !buf.trim().is_empty() {
        push_fixed_draft(&mut drafts, &buf, &mut tail, start, last, overlap_chars);
    }

    drafts
}

/// Emit a fixed-strategy draft, prepending the carried overlap tail and
/// recording the tail for the next draft.
fn push_fixed_draft(
    drafts: &mut Vec<Draft>,
    body: &str,
    tail: &mut String,
    start_line: usize,
    end_line: usize,
    overlap_chars: usize,
) {
    let mut content = String::new();
    if !tail.is_empty() {
        content.push_str(tail);
        content.push('\n');
    }
    content.push_str(body);
    *tail = overlap_tail(body, overlap_chars);
    drafts.push(Draft {
        content,
        start_line,
        end_line: end_line.max(start_line),
        ..Default::default()
    });
}

fn overlap_tail(s: &str, overlap_chars: usize) -> String {
    if overlap_chars == 0 || s.is_empty() {
        return String::new();
    }
    let cut = char_floor(s, s.len().saturating_sub(overlap_chars));
    s[cut..].trim_start().to_string()
}

/// Pick where to cut an over-long line: sentence boundary if enabled,
/// then whitespace, then a hard cut at the character boundary.
fn split_point(s: &str, max_chars: usize, preserve_sentences: bool) -> usize {
    if s.len() <= max_chars {
        return s.len();
    }
    let hard = char_floor(s, max_chars);
    if hard == 0 {
        // A single character wider than the whole budget.
        return char_ceil(s, 1);
    }
    if preserve_sentences {
        if let Some(p) = sentence_boundary(&s[..hard]) {
            return p;
        }
    }
    if let Some(p) = s[..hard].rfind([' ', '\t']) {
        if p > 0 {
            return p + 1;
        }
    }
    hard
}

/// Byte offset just after the last sentence-ending punctuation that is
/// followed by whitespace, or None.
fn sentence_boundary(prefix: &str) -> Option<usize> {
    let bytes = prefix.as_bytes();
    for i in (0..bytes.len().saturating_sub(1)).rev() {
        if matches!(bytes[i], b'.' | b'!' | b'?') && bytes[i + 1].is_ascii_whitespace() {
            return Some(i + 2);
        }
    }
    None
}

fn char_floor(s: &str, idx: usize) -> usize {
    let mut idx = idx.min(s.len());
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn char_ceil(s: &str, idx: usize) -> usize {
    let mut idx = idx.min(s.len());
    while idx < s.len() && !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

// ============ Post-processing ============

fn split_oversized(drafts: Vec<Draft>, cfg: &ChunkingConfig) -> Vec<Draft> {
    let mut out = Vec::with_capacity(drafts.len());
    for draft in drafts {
        if estimate_tokens(&draft.content) > cfg.max_chunk_tokens {
            resplit(draft, cfg, reduced_target(cfg.max_chunk_tokens), 0, &mut out);
        } else {
            out.push(draft);
        }
    }
    out
}

fn reduced_target(tokens: usize) -> usize {
    (tokens * 9 / 10).max(1)
}

/// Re-split an oversized draft with the fixed strategy at a reduced
/// target, bounded at [`MAX_SPLIT_DEPTH`]. Parts keep the parent's title
/// and breadcrumb; parts after the first are flagged as continuations.
fn resplit(mut draft: Draft, cfg: &ChunkingConfig, target: usize, depth: usize, out: &mut Vec<Draft>) {
    if depth >= MAX_SPLIT_DEPTH {
        if !draft.warnings.contains(&ChunkWarning::FailedToSplit) {
            draft.warnings.push(ChunkWarning::FailedToSplit);
        }
        out.push(draft);
        return;
    }

    let content = std::mem::take(&mut draft.content);
    let numbered: Vec<(usize, &str)> = content
        .lines()
        .enumerate()
        .map(|(i, l)| ((draft.start_line + i).min(draft.end_line), l))
        .collect();
    // Overlap is disabled here so the re-split always shrinks.
    let pieces = split_fixed(&numbered, target, 0, cfg.preserve_sentences);

    if pieces.len() <= 1 {
        draft.content = content;
        if !draft.warnings.contains(&ChunkWarning::FailedToSplit) {
            draft.warnings.push(ChunkWarning::FailedToSplit);
        }
        out.push(draft);
        return;
    }

    for (i, mut piece) in pieces.into_iter().enumerate() {
        piece.title = draft.title.clone();
        piece.breadcrumb = draft.breadcrumb.clone();
        piece.warnings = draft.warnings.clone();
        let tag = if i == 0 {
            ChunkWarning::Oversized
        } else {
            ChunkWarning::Continuation
        };
        if !piece.warnings.contains(&tag) {
            piece.warnings.push(tag);
        }
        if estimate_tokens(&piece.content) > cfg.max_chunk_tokens {
            resplit(piece, cfg, reduced_target(target), depth + 1, out);
        } else {
            out.push(piece);
        }
    }
}

/// Merge chunks below `min_chunk_tokens` forward into their next
/// neighbor. Idempotent: after one pass no two adjacent chunks are both
/// under the minimum; only a trailing chunk can remain undersized, and
/// it is flagged.
fn merge_undersized(mut drafts: Vec<Draft>, cfg: &ChunkingConfig, strategy: Strategy) -> Vec<Draft> {
    if cfg.min_chunk_tokens == 0 || drafts.len() < 2 {
        flag_trailing_undersized(&mut drafts, cfg, strategy);
        return drafts;
    }

    let mut i = 0;
    while i < drafts.len() {
        if estimate_tokens(&drafts[i].content) < cfg.min_chunk_tokens && i + 1 < drafts.len() {
            let next = drafts.remove(i + 1);
            let cur = &mut drafts[i];
            if cur.title.is_none() {
                cur.title = next.title;
            }
            if cur.breadcrumb.is_none() {
                cur.breadcrumb = next.breadcrumb;
            }
            if !cur.content.is_empty() && !next.content.is_empty() {
                cur.content.push('\n');
            }
            cur.content.push_str(&next.content);
            cur.end_line = cur.end_line.max(next.end_line);
            for w in next.warnings {
                if !cur.warnings.contains(&w) {
                    cur.warnings.push(w);
                }
            }
            // Re-check the merged chunk at the same index.
            continue;
        }
        i += 1;
    }

    flag_trailing_undersized(&mut drafts, cfg, strategy);
    drafts
}

fn flag_trailing_undersized(drafts: &mut [Draft], cfg: &ChunkingConfig, strategy: Strategy) {
    // A single-chunk document under the single strategy is small by
    // construction; flagging it would be noise.
    if strategy == Strategy::Single {
        return;
    }
    if let Some(last) = drafts.last_mut() {
        if estimate_tokens(&last.content) < cfg.min_chunk_tokens
            && !last.warnings.contains(&ChunkWarning::Undersized)
        {
            last.warnings.push(ChunkWarning::Undersized);
        }
    }
}

// ============ Finalization ============

fn finalize(
    document_id: &str,
    drafts: Vec<Draft>,
    strategy: Strategy,
    reason: String,
) -> (Vec<Chunk>, ChunkingReport) {
    let mut chunks = Vec::with_capacity(drafts.len());
    let mut token_counts = Vec::with_capacity(drafts.len());
    let mut warning_count = 0;

    for (i, draft) in drafts.into_iter().enumerate() {
        let tokens = estimate_tokens(&draft.content);
        let section_headers = extract_section_headers(&draft.content);
        warning_count += draft.warnings.len();
        token_counts.push(tokens);
        chunks.push(Chunk {
            id: ChunkId::new(document_id, i as i64).to_string(),
            document_id: document_id.to_string(),
            chunk_index: i as i64,
            content: draft.content,
            title: draft.title,
            breadcrumb: draft.breadcrumb,
            section_headers,
            start_line: draft.start_line as i64,
            end_line: draft.end_line as i64,
            token_count: tokens as i64,
            warnings: draft.warnings,
        });
    }

    let report = ChunkingReport {
        strategy,
        reason,
        chunk_count: chunks.len(),
        token_counts,
        warning_count,
    };
    (chunks, report)
}

// ============ Section header extraction ============

static ANCHOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<a\s[^>]*>|</a>|\{#[^}]*\}").unwrap());

/// Collect header texts from a chunk's final content, in document order,
/// with emphasis/code markup and anchor tags stripped for display.
pub fn extract_section_headers(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(parse_header)
        .map(|(_, title)| strip_markup(&title))
        .filter(|t| !t.is_empty())
        .collect()
}

fn strip_markup(s: &str) -> String {
    let s = ANCHOR_RE.replace_all(s, "");
    let s: String = s.chars().filter(|c| !matches!(c, '*' | '`')).collect();
    s.split_whitespace()
        .map(|w| w.trim_matches('_'))
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> ChunkingConfig {
        ChunkingConfig::default()
    }

    fn assert_line_coverage(chunks: &[Chunk], total_lines: i64) {
        assert!(!chunks.is_empty());
        assert_eq!(chunks[0].start_line, 1);
        for pair in chunks.windows(2) {
            assert!(
                pair[1].start_line <= pair[0].end_line + 1,
                "gap between chunks: {:?} then {:?}",
                (pair[0].start_line, pair[0].end_line),
                (pair[1].start_line, pair[1].end_line)
            );
        }
        assert_eq!(chunks.last().unwrap().end_line, total_lines);
    }

    #[test]
    fn empty_document_yields_one_chunk() {
        let (chunks, report) = chunk_document("d1", "", &cfg());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(report.strategy, Strategy::Single);
    }

    #[test]
    fn small_document_selects_single() {
        let (chunks, report) = chunk_document("d1", "Just a short note.", &cfg());
        assert_eq!(report.strategy, Strategy::Single);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "Just a short note.");
    }

    #[test]
    fn header_rich_document_selects_headers() {
        let body = "filler text. ".repeat(50);
        let text = format!("# One\n\n{body}\n\n## Two\n\n{body}\n\n## Three\n\n{body}");
        let mut c = cfg();
        c.min_chunk_tokens = 4;
        let (_, report) = chunk_document("d1", &text, &c);
        assert_eq!(report.strategy, Strategy::Headers);
    }

    #[test]
    fn delimiter_document_selects_delimiter() {
        let body = "filler text. ".repeat(40);
        let text = format!("{body}\n---\n{body}\n---\n{body}\n---\n{body}");
        let mut c = cfg();
        c.min_chunk_tokens = 4;
        let (chunks, report) = chunk_document("d1", &text, &c);
        assert_eq!(report.strategy, Strategy::Delimiter);
        assert_eq!(chunks.len(), 4);
        assert!(chunks.iter().all(|ch| ch.breadcrumb.is_none()));
    }

    #[test]
    fn unstructured_document_falls_back_to_fixed() {
        let text = "plain prose with no structure at all. ".repeat(60);
        let mut c = cfg();
        c.min_chunk_tokens = 4;
        c.chunk_size_tokens = 50;
        c.overlap_tokens = 0;
        let (chunks, report) = chunk_document("d1", &text, &c);
        assert_eq!(report.strategy, Strategy::Fixed);
        assert!(chunks.len() > 1);
    }

    #[test]
    fn header_strategy_builds_breadcrumbs() {
        let pad = "body text here. ".repeat(20);
        let text = format!(
            "# Top\n\n{pad}\n\n## Section\n\n{pad}\n\n### Subsection\n\n{pad}\n\n## Other\n\n{pad}"
        );
        let mut c = cfg();
        c.strategy = "headers".to_string();
        c.min_chunk_tokens = 4;
        let (chunks, _) = chunk_document("d1", &text, &c);

        let by_title: Vec<(Option<&str>, Option<&str>)> = chunks
            .iter()
            .map(|ch| (ch.title.as_deref(), ch.breadcrumb.as_deref()))
            .collect();

        assert_eq!(by_title[0], (Some("Top"), Some("Top")));
        assert_eq!(by_title[1], (Some("Section"), Some("Top > Section")));
        assert_eq!(
            by_title[2],
            (Some("Subsection"), Some("Top > Section > Subsection"))
        );
        // "Other" pops Subsection and Section before pushing itself.
        assert_eq!(by_title[3], (Some("Other"), Some("Top > Other")));

        // Breadcrumb always ends with the chunk's own header title.
        for ch in &chunks {
            let (title, crumb) = (ch.title.as_ref().unwrap(), ch.breadcrumb.as_ref().unwrap());
            assert!(crumb.ends_with(title.as_str()));
        }
    }

    #[test]
    fn sub_split_headers_stay_in_chunk_but_update_stack() {
        let pad = "body text here. ".repeat(20);
        let text = format!("# A\n\n{pad}\n\n## Nested\n\n{pad}\n\n# B\n\n{pad}\n\n# C\n\n{pad}");
        let mut c = cfg();
        c.strategy = "headers".to_string();
        c.header_split_levels = vec![1];
        c.min_chunk_tokens = 4;
        let (chunks, _) = chunk_document("d1", &text, &c);

        assert_eq!(chunks.len(), 3);
        // The level-2 header did not open a chunk but is reachable via the
        // section list of the chunk that contains it.
        assert!(chunks[0].section_headers.contains(&"Nested".to_string()));
        assert_eq!(chunks[1].breadcrumb.as_deref(), Some("B"));
    }

    #[test]
    fn line_coverage_has_no_gaps() {
        let pad = "content line. ".repeat(10);
        let texts = [
            format!("# A\n\n{pad}\n\n## B\n\n{pad}\n\n## C\n\n{pad}"),
            format!("{pad}\n---\n{pad}\n---\n{pad}\n---\n{pad}"),
            "plain line of prose repeated over and over. ".repeat(80),
        ];
        for text in &texts {
            let mut c = cfg();
            c.min_chunk_tokens = 4;
            c.chunk_size_tokens = 40;
            let (chunks, _) = chunk_document("d1", text, &c);
            assert_line_coverage(&chunks, text.lines().count().max(1) as i64);
        }
    }

    #[test]
    fn fixed_strategy_covers_trailing_blank_lines() {
        let text = format!("{}\n\n\n", "plain prose with no structure at all. ".repeat(60));
        let total_lines = text.lines().count() as i64;
        let mut c = cfg();
        c.strategy = "fixed".to_string();
        c.min_chunk_tokens = 4;
        c.chunk_size_tokens = 50;
        c.overlap_tokens = 0;
        let (chunks, report) = chunk_document("d1", &text, &c);
        assert_eq!(report.strategy, Strategy::Fixed);
        assert_line_coverage(&chunks, total_lines);
    }

    #[test]
    fn no_chunk_exceeds_max_unless_flagged() {
        let text = "word ".repeat(4000);
        let mut c = cfg();
        c.min_chunk_tokens = 4;
        c.max_chunk_tokens = 100;
        c.chunk_size_tokens = 80;
        c.overlap_tokens = 0;
        let (chunks, _) = chunk_document("d1", &text, &c);
        for ch in &chunks {
            assert!(
                ch.token_count as usize <= c.max_chunk_tokens
                    || ch.warnings.contains(&ChunkWarning::FailedToSplit),
                "chunk {} has {} tokens",
                ch.chunk_index,
                ch.token_count
            );
        }
    }

    #[test]
    fn oversized_chunk_is_resplit_with_breadcrumb_preserved() {
        let pad = "sentence goes here. ".repeat(400);
        let text = format!("# Big\n\n{pad}\n\n# Next\n\n{}", "tail text. ".repeat(100));
        let mut c = cfg();
        c.strategy = "headers".to_string();
        c.min_chunk_tokens = 4;
        c.max_chunk_tokens = 200;
        let (chunks, _) = chunk_document("d1", &text, &c);

        let big_parts: Vec<_> = chunks
            .iter()
            .filter(|ch| ch.breadcrumb.as_deref() == Some("Big"))
            .collect();
        assert!(big_parts.len() > 1);
        assert!(big_parts[0].warnings.contains(&ChunkWarning::Oversized));
        assert!(big_parts[1..]
            .iter()
            .all(|ch| ch.warnings.contains(&ChunkWarning::Continuation)));
    }

    #[test]
    fn resplit_depth_bound_flags_failed_to_split() {
        let draft = Draft {
            content: "x".repeat(4000),
            start_line: 1,
            end_line: 1,
            ..Default::default()
        };
        let mut out = Vec::new();
        resplit(draft, &cfg(), 100, MAX_SPLIT_DEPTH, &mut out);
        assert_eq!(out.len(), 1);
        assert!(out[0].warnings.contains(&ChunkWarning::FailedToSplit));
    }

    #[test]
    fn undersized_sections_merge_forward() {
        let text = "# Title\n\n## A\n\nshort\n\n## B\n\nshort";
        let mut c = cfg();
        c.strategy = "headers".to_string();
        c.min_chunk_tokens = 50;
        c.max_chunk_tokens = 500;
        let (chunks, _) = chunk_document("d1", text, &c);
        assert!(
            chunks.len() < 3,
            "expected undersized sections to collapse, got {}",
            chunks.len()
        );
    }

    #[test]
    fn merge_is_idempotent() {
        let text = "# Title\n\n## A\n\nshort\n\n## B\n\nshort";
        let mut c = cfg();
        c.strategy = "headers".to_string();
        c.min_chunk_tokens = 50;
        let (chunks, _) = chunk_document("d1", text, &c);

        // No two adjacent chunks are both below the minimum.
        for pair in chunks.windows(2) {
            let both_small = (pair[0].token_count as usize) < c.min_chunk_tokens
                && (pair[1].token_count as usize) < c.min_chunk_tokens;
            assert!(!both_small, "two adjacent undersized chunks survived the merge");
        }
        // Every chunk except possibly the last is at or above the minimum.
        for ch in &chunks[..chunks.len().saturating_sub(1)] {
            assert!(ch.token_count as usize >= c.min_chunk_tokens);
        }
    }

    #[test]
    fn merged_chunk_takes_title_from_whichever_side_has_one() {
        let drafts = vec![
            Draft {
                content: "tiny".to_string(),
                start_line: 1,
                end_line: 1,
                ..Default::default()
            },
            Draft {
                content: "also tiny".to_string(),
                title: Some("Kept".to_string()),
                breadcrumb: Some("Kept".to_string()),
                start_line: 2,
                end_line: 2,
                ..Default::default()
            },
        ];
        let mut c = cfg();
        c.min_chunk_tokens = 50;
        let merged = merge_undersized(drafts, &c, Strategy::Headers);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].title.as_deref(), Some("Kept"));
        assert_eq!(merged[0].start_line, 1);
        assert_eq!(merged[0].end_line, 2);
    }

    #[test]
    fn indices_are_contiguous_after_postprocessing() {
        let text = "# T\n\n## A\n\nshort\n\n## B\n\nshort\n\n## C\n\nlonger content here. "
            .repeat(3);
        let mut c = cfg();
        c.strategy = "headers".to_string();
        c.min_chunk_tokens = 10;
        let (chunks, _) = chunk_document("d1", &text, &c);
        for (i, ch) in chunks.iter().enumerate() {
            assert_eq!(ch.chunk_index, i as i64);
            assert_eq!(ch.id, format!("d1.{}", i));
        }
    }

    #[test]
    fn fixed_strategy_respects_sentence_boundaries() {
        let line = "First sentence here. Second sentence follows! Third one ends? Fourth goes on and on and on.";
        let pieces = split_fixed(&[(1, line)], 8, 0, true);
        assert!(pieces.len() > 1);
        assert!(pieces[0].content.trim_end().ends_with(['.', '!', '?']));
    }

    #[test]
    fn fixed_strategy_carries_overlap_tail() {
        let lines: Vec<(usize, &str)> = vec![
            (1, "aaaa aaaa aaaa aaaa aaaa"),
            (2, "bbbb bbbb bbbb bbbb bbbb"),
        ];
        let pieces = split_fixed(&lines, 6, 2, true);
        assert!(pieces.len() >= 2);
        // The second chunk starts with the tail of the first.
        let tail = overlap_tail(&pieces[0].content, 8);
        assert!(pieces[1].content.starts_with(tail.trim_start()));
    }

    #[test]
    fn split_point_is_char_boundary_safe() {
        let s = "é".repeat(100);
        let p = split_point(&s, 10, true);
        assert!(s.is_char_boundary(p));
        assert!(p > 0);
    }

    #[test]
    fn section_headers_extracted_with_markup_stripped() {
        let content =
            "## **Bold** _Title_\n\ntext\n\n### `code` heading <a name=\"x\"></a>\n\nmore";
        let headers = extract_section_headers(content);
        assert_eq!(headers, vec!["Bold Title", "code heading"]);
    }

    #[test]
    fn report_counts_chunks_and_warnings() {
        let text = "# A\n\nshort\n\n## B\n\nshort\n\n## C\n\nshort";
        let mut c = cfg();
        c.strategy = "headers".to_string();
        c.min_chunk_tokens = 50;
        let (chunks, report) = chunk_document("d1", text, &c);
        assert_eq!(report.chunk_count, chunks.len());
        assert_eq!(report.token_counts.len(), chunks.len());
    }
}
