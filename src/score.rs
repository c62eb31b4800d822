//! Hybrid scoring engine.
//!
//! Converts raw vector distances into bounded similarity scores, layers
//! keyword-overlap and version-compatibility signals on top, propagates
//! score across resolved links, and groups chunk hits by parent document
//! for presentation.
//!
//! All functions here are pure; the retrieval orchestrator feeds them
//! candidates pulled from storage.

use std::collections::{HashMap, HashSet};

use crate::models::UNVERSIONED;

/// Sigmoid steepness for the distance-to-score curve.
pub const SCORE_STEEPNESS: f64 = 8.0;
/// Distance at which the similarity score reads 0.5.
pub const SCORE_CENTER: f64 = 0.7;
/// Scale applied to the normalized keyword-overlap score.
pub const KEYWORD_SCALE: f64 = 0.1;
/// Hard cap on the keyword contribution; it nudges ties, never dominates.
pub const KEYWORD_CAP: f64 = 0.1;
/// Multiplier for chunk hits when the same document also has a
/// document-level hit.
pub const CHUNK_SPECIFICITY_BOOST: f64 = 1.1;
/// Minimum score a result needs before it lends credibility to its
/// link targets.
pub const LINK_BOOST_THRESHOLD: f64 = 0.6;
/// Fraction of the source's score added to each in-set link target.
pub const LINK_BOOST_FACTOR: f64 = 0.1;
/// No boost ever pushes a score past this ceiling.
pub const SCORE_CEILING: f64 = 1.0;

/// Map a raw nearest-neighbor distance onto `(0, 1)` through a logistic
/// curve: distance 0 reads near 1.0, [`SCORE_CENTER`] reads 0.5, and
/// larger distances decay toward 0. Monotonically non-increasing.
pub fn distance_to_score(distance: f64) -> f64 {
    1.0 / (1.0 + (SCORE_STEEPNESS * (distance - SCORE_CENTER)).exp())
}

// ============ Keyword overlap ============

/// Split a query into lowercase terms.
pub fn query_terms(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|t| t.to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Normalized keyword-overlap score in `[0, 1]`.
///
/// Each term scores its strongest hit: title (weight 3), tag set
/// (weight 2), content body (weight 1). The sum is normalized by the
/// maximum possible (`3 × term_count`).
pub fn keyword_overlap(
    terms: &[String],
    title: Option<&str>,
    tags: &[String],
    content: &str,
) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }
    let title_lower = title.map(|t| t.to_lowercase());
    let tags_lower: Vec<String> = tags.iter().map(|t| t.to_lowercase()).collect();
    let content_lower = content.to_lowercase();

    let mut sum = 0.0;
    for term in terms {
        let weight = if title_lower.as_deref().is_some_and(|t| t.contains(term.as_str())) {
            3.0
        } else if tags_lower.iter().any(|t| t == term) {
            2.0
        } else if content_lower.contains(term.as_str()) {
            1.0
        } else {
            0.0
        };
        sum += weight;
    }
    sum / (3.0 * terms.len() as f64)
}

/// Additive boost derived from the keyword-overlap score.
pub fn keyword_boost(overlap: f64) -> f64 {
    (overlap * KEYWORD_SCALE).min(KEYWORD_CAP)
}

// ============ Version compatibility ============

/// Relationship between a resource's version-label set and the caller's
/// requested set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionMatch {
    Exact,
    /// Resource's set strictly contains the requested set.
    Superset,
    /// Resource's set is strictly contained in the requested set.
    Subset,
    /// Non-empty overlap, neither superset nor subset.
    Partial,
    /// Resource carries the `unversioned` sentinel.
    Unversioned,
    /// No overlap at all; the candidate is excluded.
    Disjoint,
}

pub fn classify_versions(resource: &[String], requested: &[String]) -> VersionMatch {
    if resource.iter().any(|v| v == UNVERSIONED) {
        return VersionMatch::Unversioned;
    }
    let resource: HashSet<&str> = resource.iter().map(|s| s.as_str()).collect();
    let requested: HashSet<&str> = requested.iter().map(|s| s.as_str()).collect();

    let overlap = resource.intersection(&requested).count();
    if overlap == 0 {
        return VersionMatch::Disjoint;
    }
    if resource == requested {
        return VersionMatch::Exact;
    }
    if resource.is_superset(&requested) {
        return VersionMatch::Superset;
    }
    if resource.is_subset(&requested) {
        return VersionMatch::Subset;
    }
    VersionMatch::Partial
}

/// Fixed multiplier for each version relationship. Applied after the
/// base similarity + keyword score, never additively; `Disjoint` drops
/// the candidate outright.
pub fn version_multiplier(m: VersionMatch) -> f64 {
    match m {
        VersionMatch::Exact => 1.0,
        VersionMatch::Superset => 0.95,
        VersionMatch::Subset => 0.9,
        VersionMatch::Partial => 0.85,
        VersionMatch::Unversioned => 0.8,
        VersionMatch::Disjoint => 0.0,
    }
}

// ============ Candidates ============

/// Granularity of a scored hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitLevel {
    Document,
    Chunk,
}

/// A scored retrieval candidate flowing through the pipeline.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Chunk id for chunk hits, document id for document hits.
    pub id: String,
    pub document_id: String,
    pub level: HitLevel,
    pub score: f64,
}

/// Apply the chunk-specificity boost: when a document has both a
/// document-level and a chunk-level hit, its chunk hits are lifted.
pub fn apply_chunk_specificity(candidates: &mut [Candidate]) {
    let doc_hits: HashSet<String> = candidates
        .iter()
        .filter(|c| c.level == HitLevel::Document)
        .map(|c| c.document_id.clone())
        .collect();
    let chunk_docs: HashSet<String> = candidates
        .iter()
        .filter(|c| c.level == HitLevel::Chunk)
        .map(|c| c.document_id.clone())
        .collect();

    for c in candidates.iter_mut() {
        if c.level == HitLevel::Chunk
            && doc_hits.contains(&c.document_id)
            && chunk_docs.contains(&c.document_id)
        {
            c.score *= CHUNK_SPECIFICITY_BOOST;
        }
    }
}

/// One-hop link boost: every candidate at or above
/// [`LINK_BOOST_THRESHOLD`] lends `LINK_BOOST_FACTOR × its score` to the
/// in-set targets of its outgoing edges. Boosts are computed from a
/// pre-boost snapshot (never transitive) and capped at
/// [`SCORE_CEILING`].
pub fn apply_link_boost(candidates: &mut [Candidate], edges: &[(String, String)]) {
    let snapshot: HashMap<String, f64> = candidates
        .iter()
        .map(|c| (c.id.clone(), c.score))
        .collect();

    let mut additions: HashMap<&str, f64> = HashMap::new();
    for (source, target) in edges {
        let Some(&source_score) = snapshot.get(source.as_str()) else {
            continue;
        };
        if source_score < LINK_BOOST_THRESHOLD {
            continue;
        }
        if !snapshot.contains_key(target.as_str()) {
            continue;
        }
        *additions.entry(target.as_str()).or_insert(0.0) += LINK_BOOST_FACTOR * source_score;
    }

    for c in candidates.iter_mut() {
        if let Some(add) = additions.get(c.id.as_str()) {
            c.score = (c.score + add).min(SCORE_CEILING);
        }
    }
}

/// Clamp all scores to the ceiling after multiplicative boosts.
pub fn clamp_scores(candidates: &mut [Candidate]) {
    for c in candidates.iter_mut() {
        c.score = c.score.min(SCORE_CEILING);
    }
}

// ============ Grouping ============

/// Chunk hits grouped under their parent document.
#[derive(Debug, Clone)]
pub struct ScoredGroup {
    pub document_id: String,
    /// Representative score: the best chunk's score, or the
    /// document-level score when no chunk qualified.
    pub score: f64,
    /// Document-level hit score, if any.
    pub document_score: Option<f64>,
    /// Chunk hits, ordered by descending score.
    pub chunks: Vec<Candidate>,
}

/// Group candidates by parent document and order groups by representative
/// score (descending), tie-broken by document id for determinism.
pub fn group_by_document(candidates: Vec<Candidate>) -> Vec<ScoredGroup> {
    let mut groups: HashMap<String, ScoredGroup> = HashMap::new();

    for cand in candidates {
        let group = groups
            .entry(cand.document_id.clone())
            .or_insert_with(|| ScoredGroup {
                document_id: cand.document_id.clone(),
                score: 0.0,
                document_score: None,
                chunks: Vec::new(),
            });
        match cand.level {
            HitLevel::Document => {
                group.document_score = Some(
                    group
                        .document_score
                        .map_or(cand.score, |s: f64| s.max(cand.score)),
                );
            }
            HitLevel::Chunk => group.chunks.push(cand),
        }
    }

    let mut out: Vec<ScoredGroup> = groups.into_values().collect();
    for group in out.iter_mut() {
        group.chunks.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        group.score = match group.chunks.first() {
            Some(best) => best.score,
            None => group.document_score.unwrap_or(0.0),
        };
    }

    out.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.document_id.cmp(&b.document_id))
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn distance_zero_scores_near_one() {
        assert!(distance_to_score(0.0) > 0.99);
    }

    #[test]
    fn distance_center_scores_half() {
        assert!((distance_to_score(SCORE_CENTER) - 0.5).abs() < 0.05);
    }

    #[test]
    fn score_is_monotonically_non_increasing() {
        let mut prev = f64::INFINITY;
        let mut d = 0.0;
        while d <= 2.0 {
            let s = distance_to_score(d);
            assert!(s <= prev, "score increased at distance {}", d);
            assert!(s > 0.0 && s < 1.0);
            prev = s;
            d += 0.05;
        }
    }

    #[test]
    fn keyword_overlap_weights_title_over_tags_over_content() {
        let terms = strings(&["alpha"]);
        let in_title = keyword_overlap(&terms, Some("Alpha Guide"), &[], "other");
        let in_tags = keyword_overlap(&terms, Some("Guide"), &strings(&["alpha"]), "other");
        let in_content = keyword_overlap(&terms, Some("Guide"), &[], "mentions alpha once");
        let nowhere = keyword_overlap(&terms, Some("Guide"), &[], "nothing relevant");

        assert!(in_title > in_tags);
        assert!(in_tags > in_content);
        assert!(in_content > nowhere);
        assert_eq!(nowhere, 0.0);
        assert!((in_title - 1.0).abs() < 1e-9);
    }

    #[test]
    fn keyword_boost_is_capped() {
        assert!(keyword_boost(1.0) <= KEYWORD_CAP + 1e-12);
        assert!(keyword_boost(0.0) == 0.0);
    }

    #[test]
    fn version_classification() {
        let r = |v: &[&str]| strings(v);
        assert_eq!(
            classify_versions(&r(&["v2"]), &r(&["v2"])),
            VersionMatch::Exact
        );
        assert_eq!(
            classify_versions(&r(&["v1", "v2"]), &r(&["v2"])),
            VersionMatch::Superset
        );
        assert_eq!(
            classify_versions(&r(&["v2"]), &r(&["v1", "v2"])),
            VersionMatch::Subset
        );
        assert_eq!(
            classify_versions(&r(&["v1", "v2"]), &r(&["v2", "v3"])),
            VersionMatch::Partial
        );
        assert_eq!(
            classify_versions(&r(&["unversioned"]), &r(&["v9"])),
            VersionMatch::Unversioned
        );
        assert_eq!(
            classify_versions(&r(&["v1"]), &r(&["v3"])),
            VersionMatch::Disjoint
        );
    }

    #[test]
    fn disjoint_versions_exclude_the_candidate() {
        assert_eq!(version_multiplier(VersionMatch::Disjoint), 0.0);
        // Every other relationship keeps the candidate alive.
        for m in [
            VersionMatch::Exact,
            VersionMatch::Superset,
            VersionMatch::Subset,
            VersionMatch::Partial,
            VersionMatch::Unversioned,
        ] {
            assert!(version_multiplier(m) > 0.0);
        }
    }

    #[test]
    fn multiplier_ordering_matches_specificity() {
        assert!(version_multiplier(VersionMatch::Exact) > version_multiplier(VersionMatch::Superset));
        assert!(
            version_multiplier(VersionMatch::Superset) > version_multiplier(VersionMatch::Subset)
        );
        assert!(version_multiplier(VersionMatch::Subset) > version_multiplier(VersionMatch::Partial));
    }

    fn cand(id: &str, doc: &str, level: HitLevel, score: f64) -> Candidate {
        Candidate {
            id: id.to_string(),
            document_id: doc.to_string(),
            level,
            score,
        }
    }

    #[test]
    fn chunk_specificity_applies_only_when_both_levels_hit() {
        let mut candidates = vec![
            cand("d1", "d1", HitLevel::Document, 0.5),
            cand("d1.0", "d1", HitLevel::Chunk, 0.5),
            cand("d2.0", "d2", HitLevel::Chunk, 0.5),
        ];
        apply_chunk_specificity(&mut candidates);
        assert!((candidates[1].score - 0.5 * CHUNK_SPECIFICITY_BOOST).abs() < 1e-12);
        // No document-level hit for d2, so its chunk is untouched.
        assert_eq!(candidates[2].score, 0.5);
        assert_eq!(candidates[0].score, 0.5);
    }

    #[test]
    fn link_boost_lends_score_one_hop() {
        let mut candidates = vec![
            cand("a.0", "a", HitLevel::Chunk, 0.8),
            cand("b.0", "b", HitLevel::Chunk, 0.4),
            cand("c.0", "c", HitLevel::Chunk, 0.3),
        ];
        let edges = vec![
            ("a.0".to_string(), "b.0".to_string()),
            // b is below the threshold: no transitive hand-off to c.
            ("b.0".to_string(), "c.0".to_string()),
        ];
        apply_link_boost(&mut candidates, &edges);
        assert!((candidates[1].score - (0.4 + LINK_BOOST_FACTOR * 0.8)).abs() < 1e-12);
        assert_eq!(candidates[2].score, 0.3);
    }

    #[test]
    fn link_boost_never_exceeds_ceiling() {
        let mut candidates = vec![
            cand("a.0", "a", HitLevel::Chunk, 0.99),
            cand("b.0", "b", HitLevel::Chunk, 0.98),
        ];
        let edges = vec![("a.0".to_string(), "b.0".to_string())];
        apply_link_boost(&mut candidates, &edges);
        assert!(candidates[1].score <= SCORE_CEILING);
    }

    #[test]
    fn link_boost_ignores_targets_outside_the_result_set() {
        let mut candidates = vec![cand("a.0", "a", HitLevel::Chunk, 0.9)];
        let edges = vec![("a.0".to_string(), "zz.0".to_string())];
        apply_link_boost(&mut candidates, &edges);
        assert_eq!(candidates[0].score, 0.9);
    }

    #[test]
    fn grouping_orders_by_representative_score() {
        let candidates = vec![
            cand("d1.0", "d1", HitLevel::Chunk, 0.6),
            cand("d1.1", "d1", HitLevel::Chunk, 0.9),
            cand("d2", "d2", HitLevel::Document, 0.7),
            cand("d3.0", "d3", HitLevel::Chunk, 0.5),
        ];
        let groups = group_by_document(candidates);
        assert_eq!(groups.len(), 3);

        // d1: best chunk 0.9; d2: document-level 0.7; d3: chunk 0.5.
        assert_eq!(groups[0].document_id, "d1");
        assert!((groups[0].score - 0.9).abs() < 1e-12);
        assert_eq!(groups[0].chunks[0].id, "d1.1");

        assert_eq!(groups[1].document_id, "d2");
        assert!(groups[1].chunks.is_empty());
        assert_eq!(groups[1].document_score, Some(0.7));

        assert_eq!(groups[2].document_id, "d3");
    }

    #[test]
    fn document_level_hit_survives_without_chunk_hits() {
        let groups = group_by_document(vec![cand("d9", "d9", HitLevel::Document, 0.42)]);
        assert_eq!(groups.len(), 1);
        assert!((groups[0].score - 0.42).abs() < 1e-12);
    }

    #[test]
    fn empty_candidate_set_groups_to_empty() {
        assert!(group_by_document(Vec::new()).is_empty());
    }
}
