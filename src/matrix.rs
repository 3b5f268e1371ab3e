use std::{
    collections::BTreeMap,
    io::{BufWriter, Write},
    path::PathBuf,
};

use serde::Serialize;
use tracing::info;

use crate::{
    error::{Error, Result},
    news_index::{DocField, NewsIndex},
    progress::{NoProgress, Progress},
};

/// Minimum width of the term column in the exported grid.
const TERM_WIDTH: usize = 20;
/// Width of every document column in the exported grid.
const CELL_WIDTH: usize = 10;

/// Which key the outer level of the matrix is indexed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Orientation {
    ByTerm,
    #[default]
    ByDocument,
}

/// How a term's score is updated as its occurrences are folded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ScoreRule {
    /// Count occurrences, then normalize: `count / termSize * 100`.
    #[default]
    Exact,
    /// Recover the count from the previous score by rounding up, add one
    /// and renormalize. Lossy: floating point error can make the ceiling
    /// overshoot.
    RunningEstimate,
}

/// term → ordinal → score.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TermMatrix {
    terms: BTreeMap<String, BTreeMap<usize, f64>>,
    #[serde(skip)]
    documents: usize,
}

/// ordinal → term → score. Terms have `.` replaced by `_`.
///
/// Every document has an entry, empty when it has no terms.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DocumentMatrix {
    documents: BTreeMap<usize, BTreeMap<String, f64>>,
}

/// A frequency matrix in either orientation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyMatrix {
    ByTerm(TermMatrix),
    ByDocument(DocumentMatrix),
}

/// Score assigned to the next occurrence of a term under
/// [`ScoreRule::RunningEstimate`].
pub fn running_score(previous: f64, term_size: usize) -> f64 {
    let n = term_size as f64;
    (((previous * n / 100.0).ceil() + 1.0) / n) * 100.0
}

/// Replace `.` so a term can be used as a flat key.
pub fn sanitize_term(term: &str) -> String {
    term.replace('.', "_")
}

/// Scores of every distinct stem of one document.
///
/// `stems` is the document's full stem sequence; its length is the
/// document's term size. No stems, no scores.
pub fn score_document(
    stems: &[String],
    rule: ScoreRule,
) -> BTreeMap<String, f64> {
    let term_size = stems.len();
    let mut scores = BTreeMap::new();
    if term_size == 0 {
        return scores;
    }

    match rule {
        ScoreRule::RunningEstimate => {
            for stem in stems {
                let previous = scores.get(stem).copied().unwrap_or(0.0);
                scores.insert(stem.clone(), running_score(previous, term_size));
            }
        }
        ScoreRule::Exact => {
            let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
            for stem in stems {
                *counts.entry(stem).or_default() += 1;
            }
            for (stem, count) in counts {
                let score = count as f64 / term_size as f64 * 100.0;
                scores.insert(stem.to_string(), score);
            }
        }
    }

    scores
}

impl TermMatrix {
    pub fn score(&self, term: &str, ordinal: usize) -> Option<f64> {
        self.terms.get(term)?.get(&ordinal).copied()
    }

    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    /// Number of documents the matrix was built over, empty ones included.
    pub fn document_count(&self) -> usize {
        self.documents
    }

    pub fn to_by_document(&self) -> DocumentMatrix {
        let mut documents: BTreeMap<usize, BTreeMap<String, f64>> =
            (0..self.documents).map(|o| (o, BTreeMap::new())).collect();
        for (term, docs) in &self.terms {
            let key = sanitize_term(term);
            for (&ordinal, &score) in docs {
                *documents
                    .entry(ordinal)
                    .or_default()
                    .entry(key.clone())
                    .or_default() += score;
            }
        }
        DocumentMatrix { documents }
    }

    /// Write the fixed-width text grid.
    ///
    /// Line one is a banner, line two the `D0000`-style ordinal headers,
    /// then one row per term in lexicographic order. Cells hold the score
    /// with three decimals, or `0` when the term is absent. The term column
    /// is 20 wide, or one more than the longest term when that is longer.
    pub fn write_grid<W: Write>(&self, mut out: W) -> std::io::Result<()> {
        let width = self
            .terms
            .keys()
            .map(|term| term.chars().count() + 1)
            .fold(TERM_WIDTH, usize::max);

        writeln!(
            out,
            "# newsdex frequency matrix: {} terms x {} documents",
            self.terms.len(),
            self.documents
        )?;

        write!(out, "{:width$}", "")?;
        for ordinal in 0..self.documents {
            write!(out, "{:>CELL_WIDTH$}", format!("D{ordinal:04}"))?;
        }
        writeln!(out)?;

        for (term, docs) in &self.terms {
            write!(out, "{term:<width$}")?;
            for ordinal in 0..self.documents {
                match docs.get(&ordinal) {
                    Some(score) => {
                        write!(out, "{:>CELL_WIDTH$}", format!("{score:.3}"))?
                    }
                    None => write!(out, "{:>CELL_WIDTH$}", "0")?,
                }
            }
            writeln!(out)?;
        }

        out.flush()
    }
}

impl DocumentMatrix {
    pub fn score(&self, ordinal: usize, term: &str) -> Option<f64> {
        self.documents.get(&ordinal)?.get(term).copied()
    }

    /// Documents in ordinal order with their term vectors.
    pub fn documents(
        &self,
    ) -> impl Iterator<Item = (usize, &BTreeMap<String, f64>)> {
        self.documents.iter().map(|(&o, terms)| (o, terms))
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    /// Highest score `term` reaches in any document, 0 when absent.
    pub fn max_score(&self, term: &str) -> f64 {
        self.documents
            .values()
            .filter_map(|terms| terms.get(term))
            .fold(0.0, |max, &score| f64::max(max, score))
    }

    pub fn to_by_term(&self) -> TermMatrix {
        let mut terms: BTreeMap<String, BTreeMap<usize, f64>> =
            BTreeMap::new();
        for (&ordinal, doc_terms) in &self.documents {
            for (term, &score) in doc_terms {
                terms.entry(term.clone()).or_default().insert(ordinal, score);
            }
        }
        TermMatrix {
            terms,
            documents: self.documents.len(),
        }
    }
}

impl FrequencyMatrix {
    pub fn orientation(&self) -> Orientation {
        match self {
            Self::ByTerm(_) => Orientation::ByTerm,
            Self::ByDocument(_) => Orientation::ByDocument,
        }
    }

    pub fn document_count(&self) -> usize {
        match self {
            Self::ByTerm(m) => m.document_count(),
            Self::ByDocument(m) => m.document_count(),
        }
    }

    /// The by-document view, transposing if needed.
    pub fn into_by_document(self) -> DocumentMatrix {
        match self {
            Self::ByTerm(m) => m.to_by_document(),
            Self::ByDocument(m) => m,
        }
    }

    /// The by-term view, transposing if needed.
    pub fn into_by_term(self) -> TermMatrix {
        match self {
            Self::ByTerm(m) => m,
            Self::ByDocument(m) => m.to_by_term(),
        }
    }

    /// Write the text grid of this matrix, see [`TermMatrix::write_grid`].
    pub fn write_grid<W: Write>(&self, out: W) -> std::io::Result<()> {
        match self {
            Self::ByTerm(m) => m.write_grid(out),
            Self::ByDocument(m) => m.to_by_term().write_grid(out),
        }
    }
}

/// Builds frequency matrices from the documents of a [`NewsIndex`].
#[derive(Debug)]
pub struct MatrixBuilder<'a> {
    index: &'a NewsIndex,
    rule: ScoreRule,
    export_path: Option<PathBuf>,
}

impl<'a> MatrixBuilder<'a> {
    pub fn new(index: &'a NewsIndex) -> Self {
        Self {
            index,
            rule: ScoreRule::default(),
            export_path: None,
        }
    }

    pub fn rule(mut self, rule: ScoreRule) -> Self {
        self.rule = rule;
        self
    }

    /// File the grid is written to when building with `persist`.
    pub fn export_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.export_path = Some(path.into());
        self
    }

    pub fn build(
        &self,
        orientation: Orientation,
        persist: bool,
    ) -> Result<FrequencyMatrix> {
        self.build_with_progress(orientation, persist, &mut NoProgress)
    }

    /// Build the matrix over every document, in ordinal order.
    ///
    /// With `persist`, the grid is also written to the export path;
    /// building with `persist` and no export path is a configuration
    /// error, reported before any work is done.
    pub fn build_with_progress(
        &self,
        orientation: Orientation,
        persist: bool,
        progress: &mut dyn Progress,
    ) -> Result<FrequencyMatrix> {
        let export_path = match (persist, &self.export_path) {
            (false, _) => None,
            (true, Some(path)) => Some(path),
            (true, None) => {
                return Err(Error::Config(
                    "no export path set for the frequency matrix".to_string(),
                ));
            }
        };

        let mut analyzer = self.index.analyzer().clone();
        let total = self.index.count();
        let mut by_term = TermMatrix {
            terms: BTreeMap::new(),
            documents: total,
        };
        let mut by_document = DocumentMatrix::default();

        for ordinal in 0..total {
            let content = self.index.field(ordinal, DocField::Content)?;
            let stems: Vec<String> = analyzer.stems(&content).collect();
            let scores = score_document(&stems, self.rule);

            match orientation {
                Orientation::ByTerm => {
                    for (term, score) in scores {
                        by_term
                            .terms
                            .entry(term)
                            .or_default()
                            .insert(ordinal, score);
                    }
                }
                Orientation::ByDocument => {
                    let mut terms = BTreeMap::new();
                    for (term, score) in scores {
                        *terms.entry(sanitize_term(&term)).or_default() +=
                            score;
                    }
                    by_document.documents.insert(ordinal, terms);
                }
            }

            progress.update(ordinal + 1, total);
        }

        let matrix = match orientation {
            Orientation::ByTerm => FrequencyMatrix::ByTerm(by_term),
            Orientation::ByDocument => FrequencyMatrix::ByDocument(by_document),
        };

        if let Some(path) = export_path {
            let file = std::fs::File::create(path)?;
            matrix.write_grid(BufWriter::new(file))?;
            info!(path = %path.display(), "wrote frequency matrix");
        }

        Ok(matrix)
    }
}
