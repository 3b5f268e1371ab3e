use std::{collections::HashMap, path::Path};

use tracing::debug;

use crate::error::{Error, Result};

/// Label for geopolitical entities: countries, cities, states.
pub const GPE: &str = "GPE";

/// Label given to tokens outside any entity.
pub const OUTSIDE: &str = "O";

/// One token of a tagged sentence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedToken {
    pub text: String,
    /// Entity label, possibly with a `B-`/`I-` prefix marking the first and
    /// following tokens of a multi-token entity.
    pub label: String,
}

impl TaggedToken {
    pub fn new(text: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            label: label.into(),
        }
    }

    /// Label without any `B-`/`I-` prefix.
    pub fn entity(&self) -> &str {
        self.label
            .strip_prefix("B-")
            .or_else(|| self.label.strip_prefix("I-"))
            .unwrap_or(&self.label)
    }

    /// Whether this token starts a new entity rather than continuing one.
    pub fn begins(&self) -> bool {
        self.label.starts_with("B-")
    }
}

/// Labels the tokens of a sentence with named-entity classes.
pub trait EntityTagger {
    fn tag(&self, sentence: &str) -> Result<Vec<TaggedToken>>;
}

/// Tags phrases found in a fixed list of names.
///
/// Matching is case-insensitive on whole tokens, preferring the longest
/// phrase at each position. A matched phrase is labelled `B-<label>` on
/// its first token and `I-<label>` on the rest.
#[derive(Debug, Clone, Default)]
pub struct GazetteerTagger {
    /// Lowercased phrase tokens → label.
    entries: HashMap<Vec<String>, String>,
    longest: usize,
}

impl GazetteerTagger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_places<I, S>(places: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tagger = Self::new();
        for place in places {
            tagger.insert(place.as_ref(), GPE);
        }
        tagger
    }

    pub fn insert(&mut self, phrase: &str, label: &str) {
        let key: Vec<String> = tokenize(phrase)
            .into_iter()
            .map(|t| t.to_lowercase())
            .collect();
        if key.is_empty() {
            return;
        }
        self.longest = self.longest.max(key.len());
        self.entries.insert(key, label.to_string());
    }

    /// Load a gazetteer, one phrase per line.
    ///
    /// A line may carry a label after a tab (`Ford\tORG`); otherwise the
    /// phrase is a `GPE`. Blank lines and lines starting with `#` are
    /// skipped.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "cannot read gazetteer {}: {e}",
                path.display()
            ))
        })?;
        let tagger = Self::parse(&text);
        debug!(
            path = %path.display(),
            entries = tagger.len(),
            "loaded gazetteer"
        );
        Ok(tagger)
    }

    pub fn parse(text: &str) -> Self {
        let mut tagger = Self::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match line.split_once('\t') {
                Some((phrase, label)) => tagger.insert(phrase, label.trim()),
                None => tagger.insert(line, GPE),
            }
        }
        tagger
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl EntityTagger for GazetteerTagger {
    fn tag(&self, sentence: &str) -> Result<Vec<TaggedToken>> {
        let tokens = tokenize(sentence);
        let lower: Vec<String> =
            tokens.iter().map(|t| t.to_lowercase()).collect();
        let mut tagged = Vec::with_capacity(tokens.len());
        let mut i = 0;

        while i < tokens.len() {
            let max = self.longest.min(tokens.len() - i);
            let hit = (1..=max).rev().find_map(|len| {
                self.entries
                    .get(&lower[i..i + len])
                    .map(|label| (len, label))
            });

            match hit {
                Some((len, label)) => {
                    tagged.push(TaggedToken::new(
                        tokens[i],
                        format!("B-{label}"),
                    ));
                    for token in &tokens[i + 1..i + len] {
                        tagged.push(TaggedToken::new(
                            *token,
                            format!("I-{label}"),
                        ));
                    }
                    i += len;
                }
                None => {
                    tagged.push(TaggedToken::new(tokens[i], OUTSIDE));
                    i += 1;
                }
            }
        }

        Ok(tagged)
    }
}

/// Whitespace tokens with surrounding punctuation removed.
fn tokenize(text: &str) -> Vec<&str> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty())
        .collect()
}
