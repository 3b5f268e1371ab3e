use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::{
    analyzer::TermAnalyzer,
    matrix::{DocumentMatrix, sanitize_term},
};

/// A document with its cosine similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct Ranked {
    pub ordinal: usize,
    pub score: f64,
}

/// Rank every document of `matrix` against `query`.
///
/// The query becomes a vector over its unique stems, each weighted by the
/// highest score that term reaches in any document. Each document is
/// scored by cosine similarity against that vector; a zero vector on
/// either side scores 0.
///
/// Returns one entry per document, sorted by score descending with ties
/// broken by ascending ordinal.
pub fn rank(
    query: &str,
    matrix: &DocumentMatrix,
    analyzer: &TermAnalyzer,
) -> Vec<Ranked> {
    let terms: BTreeSet<String> = analyzer
        .stem(query)
        .iter()
        .map(|t| sanitize_term(t))
        .collect();

    let weights: BTreeMap<String, f64> = terms
        .into_iter()
        .map(|term| {
            let weight = matrix.max_score(&term);
            (term, weight)
        })
        .collect();
    debug!(?weights, "query vector");

    let mut ranked: Vec<Ranked> = matrix
        .documents()
        .map(|(ordinal, doc)| Ranked {
            ordinal,
            score: cosine(&weights, doc),
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.ordinal.cmp(&b.ordinal))
    });

    ranked
}

/// Cosine similarity of two sparse vectors, 0 when either has no length.
pub fn cosine(a: &BTreeMap<String, f64>, b: &BTreeMap<String, f64>) -> f64 {
    let magnitude = dot(a, a).sqrt() * dot(b, b).sqrt();
    if magnitude == 0.0 {
        return 0.0;
    }
    dot(a, b) / magnitude
}

fn dot(a: &BTreeMap<String, f64>, b: &BTreeMap<String, f64>) -> f64 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    small
        .iter()
        .filter_map(|(term, x)| large.get(term).map(|y| x * y))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        document::Document,
        matrix::{MatrixBuilder, Orientation},
        news_index::{IndexConfig, NewsIndex},
        progress::NoProgress,
    };

    fn vector(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
        entries.iter().map(|(t, s)| (t.to_string(), *s)).collect()
    }

    fn ranked_over(contents: &[&str], query: &str) -> Vec<Ranked> {
        let mut idx = NewsIndex::open(IndexConfig::in_memory()).unwrap();
        let docs: Vec<Document> = contents
            .iter()
            .enumerate()
            .map(|(i, c)| {
                Document::new(
                    format!("article {i}"),
                    "",
                    "2017-09-06T10:45:00Z",
                    ["news"],
                    *c,
                )
            })
            .collect();
        idx.add_or_update(&docs, &mut NoProgress).unwrap();

        let matrix = MatrixBuilder::new(&idx)
            .build(Orientation::ByDocument, false)
            .unwrap()
            .into_by_document();
        let ranked = rank(query, &matrix, idx.analyzer());
        idx.close().unwrap();
        ranked
    }

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vector(&[("rain", 66.6), ("snow", 33.3)]);
        assert!((cosine(&v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cosine_of_disjoint_vectors_is_zero() {
        let a = vector(&[("rain", 50.0)]);
        let b = vector(&[("snow", 50.0)]);
        assert_eq!(cosine(&a, &b), 0.0);
    }

    #[test]
    fn zero_vector_scores_zero() {
        let empty = BTreeMap::new();
        let v = vector(&[("rain", 50.0)]);
        assert_eq!(cosine(&empty, &v), 0.0);
        assert_eq!(cosine(&v, &empty), 0.0);
        assert_eq!(cosine(&empty, &empty), 0.0);
        assert_eq!(cosine(&vector(&[("rain", 0.0)]), &v), 0.0);
    }

    #[test]
    fn unknown_terms_score_zero_everywhere() {
        let ranked = ranked_over(
            &["storms hit the coast", "rivers flooded"],
            "xyzzy_nonexistent_term",
        );
        assert_eq!(ranked.len(), 2);
        assert!(ranked.iter().all(|r| r.score == 0.0));
    }

    #[test]
    fn ties_keep_ordinal_order() {
        let ranked = ranked_over(&["alpha", "beta", "gamma"], "delta");
        let ordinals: Vec<_> = ranked.iter().map(|r| r.ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 2]);
    }

    #[test]
    fn single_term_document_matches_itself() {
        let ranked = ranked_over(&["hurricane", "drought"], "hurricane");
        assert_eq!(ranked[0].ordinal, 0);
        assert!((ranked[0].score - 1.0).abs() < 1e-9);
        assert_eq!(ranked[1].score, 0.0);
    }

    #[test]
    fn ranks_by_overlap() {
        let ranked = ranked_over(
            &[
                "markets rallied on earnings",
                "storms and floods hit the coast",
                "flood warnings issued after storms",
            ],
            "storm flood",
        );

        assert_eq!(ranked.len(), 3);
        assert!(ranked[0].score > 0.0);
        assert!(ranked[0].ordinal == 1 || ranked[0].ordinal == 2);
        assert_eq!(ranked[2].ordinal, 0);
        assert_eq!(ranked[2].score, 0.0);
        for pair in ranked.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn more_and_denser_shared_terms_rank_first() {
        let ranked = ranked_over(
            &[
                "storm market earnings rally",
                "storm flood storm flood",
                "storm flood storm flood",
            ],
            "storm flood",
        );

        let ordinals: Vec<_> = ranked.iter().map(|r| r.ordinal).collect();
        assert_eq!(ordinals, vec![1, 2, 0]);
        assert!((ranked[0].score - 1.0).abs() < 1e-9);
        assert_eq!(ranked[0].score, ranked[1].score);
        // storm at 25 against a query of (50, 50): 1250 / (50 * 70.71).
        assert!((ranked[2].score - 0.5_f64.sqrt() / 2.0).abs() < 1e-9);
    }

    #[test]
    fn query_stems_match_document_stems() {
        let ranked = ranked_over(&["the river flooded", "dry season"], "Floods");
        assert_eq!(ranked[0].ordinal, 0);
        assert!(ranked[0].score > 0.0);
    }

    #[test]
    fn dotted_query_terms_match_sanitized_keys() {
        let ranked = ranked_over(&["opens at 10.30", "closed"], "10.30");
        assert_eq!(ranked[0].ordinal, 0);
        assert!((ranked[0].score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_query_scores_zero() {
        let ranked = ranked_over(&["rain"], "the of and");
        assert_eq!(ranked, vec![Ranked { ordinal: 0, score: 0.0 }]);
    }
}
