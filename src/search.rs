use serde::Serialize;
use tracing::debug;

use crate::{
    archive_db::ArchiveDb,
    error::Result,
    matrix::{MatrixBuilder, Orientation, ScoreRule},
    news_index::NewsIndex,
    similarity,
    text_util::extract_snippet,
};

/// Options for one search.
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub query: String,
    /// Maximum number of results; `None` returns every match.
    pub count: Option<usize>,
    pub min_score: f64,
    pub rule: ScoreRule,
}

impl SearchParams {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            count: Some(10),
            min_score: 0.0,
            rule: ScoreRule::default(),
        }
    }
}

/// A ranked document ready for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub rank: usize,
    pub score: f64,
    pub ordinal: usize,
    pub name: String,
    pub url: String,
    pub date: String,
    pub snippet: String,
}

/// Execute the full search pipeline.
///
/// 1. Build the by-document frequency matrix
/// 2. Rank every document by cosine similarity to the query
/// 3. Drop documents sharing no term with the query or scoring below
///    `min_score`
/// 4. Limit to `count` results
/// 5. Record the query in the archive history
pub fn execute_search(
    params: &SearchParams,
    index: &NewsIndex,
    archive: &ArchiveDb,
) -> Result<Vec<SearchResult>> {
    let matrix = MatrixBuilder::new(index)
        .rule(params.rule)
        .build(Orientation::ByDocument, false)?
        .into_by_document();

    let ranked = similarity::rank(&params.query, &matrix, index.analyzer());
    debug!(candidates = ranked.len(), "ranked documents");

    let limit = params.count.unwrap_or(usize::MAX);
    let mut results = Vec::new();
    for r in ranked
        .into_iter()
        .filter(|r| r.score > 0.0 && r.score >= params.min_score)
        .take(limit)
    {
        let doc = index.document(r.ordinal)?;
        results.push(SearchResult {
            rank: results.len() + 1,
            score: r.score,
            ordinal: r.ordinal,
            snippet: extract_snippet(&doc.content, &params.query)
                .unwrap_or_default(),
            name: doc.name,
            url: doc.url,
            date: doc.date,
        });
    }

    archive.record_query(&params.query, results.len())?;
    Ok(results)
}

/// Format results for human-readable terminal output.
pub fn format_human(results: &[SearchResult]) {
    if results.is_empty() {
        println!("No results found.");
        return;
    }

    for r in results {
        println!("{:>3}. [{:.3}] #{} {}", r.rank, r.score, r.ordinal, r.name);
        if !r.date.is_empty() || !r.url.is_empty() {
            println!("     {} {}", r.date, r.url);
        }
        if !r.snippet.is_empty() {
            println!("     {}", r.snippet);
        }
    }
    println!("\n{} result(s)", results.len());
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    query: &'a str,
    result_count: usize,
    results: &'a [SearchResult],
}

/// Format results as JSON output.
pub fn format_json(results: &[SearchResult], query: &str) -> Result<()> {
    let output = JsonOutput {
        query,
        result_count: results.len(),
        results,
    };
    println!("{}", serde_json::to_string(&output)?);
    Ok(())
}
