use tantivy::tokenizer::{
    BoxTokenStream,
    Language,
    LowerCaser,
    RegexTokenizer,
    RemoveLongFilter,
    Stemmer,
    StopWordFilter,
    TextAnalyzer,
    TokenStream,
};

use crate::error::Result;

/// Name under which the analyzer is registered on the index.
pub const TOKENIZER_NAME: &str = "en_stem";

/// Letters and digits, with `.`, `_` or `'` allowed between them, so
/// `10.5`, `a.m.` and `storm's` each stay a single token.
const WORD_PATTERN: &str = r"[\p{L}\p{N}]+(?:[._'][\p{L}\p{N}]+)*";

const MAX_TOKEN_LEN: usize = 40;

const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an",
    "and", "any", "are", "as", "at", "be", "because", "been", "before",
    "being", "below", "between", "both", "but", "by", "can", "could", "did",
    "do", "does", "doing", "down", "during", "each", "few", "for", "from",
    "further", "had", "has", "have", "having", "he", "her", "here", "hers",
    "herself", "him", "himself", "his", "how", "i", "if", "in", "into", "is",
    "it", "its", "itself", "me", "more", "most", "my", "myself", "no", "nor",
    "not", "of", "off", "on", "once", "only", "or", "other", "ought", "our",
    "ours", "ourselves", "out", "over", "own", "same", "she", "should", "so",
    "some", "such", "than", "that", "the", "their", "theirs", "them",
    "themselves", "then", "there", "these", "they", "this", "those",
    "through", "to", "too", "under", "until", "up", "very", "was", "we",
    "were", "what", "when", "where", "which", "while", "who", "whom", "why",
    "will", "with", "would", "you", "your", "yours", "yourself",
    "yourselves",
];

/// Turns text into lowercase English stems with stop words removed.
///
/// Deterministic: the same text always yields the same stems, which the
/// frequency matrix and the similarity engine rely on to line up query
/// terms with indexed terms.
#[derive(Clone)]
pub struct TermAnalyzer {
    analyzer: TextAnalyzer,
}

impl TermAnalyzer {
    pub fn english() -> Result<Self> {
        let tokenizer = RegexTokenizer::new(WORD_PATTERN)?;
        let analyzer = TextAnalyzer::builder(tokenizer)
            .filter(RemoveLongFilter::limit(MAX_TOKEN_LEN))
            .filter(LowerCaser)
            .filter(StopWordFilter::remove(
                ENGLISH_STOP_WORDS.iter().map(|w| w.to_string()),
            ))
            .filter(Stemmer::new(Language::English))
            .build();
        Ok(Self { analyzer })
    }

    /// Lazily stem `text`. Calling again restarts from the first stem.
    pub fn stems<'a>(&'a mut self, text: &'a str) -> Stems<'a> {
        Stems {
            stream: self.analyzer.token_stream(text),
        }
    }

    /// Stem `text` into a vector, leaving `self` untouched.
    pub fn stem(&self, text: &str) -> Vec<String> {
        let mut analyzer = self.clone();
        analyzer.stems(text).collect()
    }

    /// The underlying Tantivy analyzer, for registration on an index.
    pub fn text_analyzer(&self) -> TextAnalyzer {
        self.analyzer.clone()
    }
}

impl std::fmt::Debug for TermAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TermAnalyzer").finish_non_exhaustive()
    }
}

/// Iterator over the stems of one text.
pub struct Stems<'a> {
    stream: BoxTokenStream<'a>,
}

impl Iterator for Stems<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.stream.advance() {
            Some(self.stream.token().text.clone())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> TermAnalyzer {
        TermAnalyzer::english().unwrap()
    }

    #[test]
    fn stems_and_lowercases() {
        let stems = analyzer().stem("Running runners RAN");
        assert_eq!(stems, vec!["run", "runner", "ran"]);
    }

    #[test]
    fn removes_stop_words() {
        let stems = analyzer().stem("the storm and the rain");
        assert_eq!(stems, vec!["storm", "rain"]);
    }

    #[test]
    fn keeps_repeated_terms() {
        let stems = analyzer().stem("rain rain snow");
        assert_eq!(stems, vec!["rain", "rain", "snow"]);
    }

    #[test]
    fn joined_words_stay_single_terms() {
        let stems = analyzer().stem("10.5 a.m. xyzzy_nonexistent_term");
        assert_eq!(stems, vec!["10.5", "a.m", "xyzzy_nonexistent_term"]);
    }

    #[test]
    fn empty_and_punctuation_only() {
        assert!(analyzer().stem("").is_empty());
        assert!(analyzer().stem("... -- !!").is_empty());
    }

    #[test]
    fn deterministic() {
        let a = analyzer();
        let text = "Storms battered Guadalajara between January and March.";
        assert_eq!(a.stem(text), a.stem(text));
    }

    #[test]
    fn lazy_stems_restart() {
        let mut a = analyzer();
        let first: Vec<_> = a.stems("floods flooding").collect();
        let second: Vec<_> = a.stems("floods flooding").collect();
        assert_eq!(first, vec!["flood", "flood"]);
        assert_eq!(first, second);
    }

    #[test]
    fn lazy_stems_can_stop_early() {
        let mut a = analyzer();
        let first = a.stems("hurricane warnings issued").next();
        assert_eq!(first.as_deref(), Some("hurrican"));
    }
}
