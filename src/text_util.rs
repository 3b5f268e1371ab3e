/// Maximum number of characters in a snippet before truncation.
pub const DEFAULT_SNIPPET_MAX_CHARS: usize = 240;

/// Number of sentences shown when nothing in the text matches the query.
pub const DEFAULT_SNIPPET_SENTENCES: usize = 2;

/// Split text into sentences.
///
/// A sentence ends at a run of `.`, `!` or `?` followed by whitespace
/// and an uppercase letter, digit or quote, or at a blank line. A
/// lowercase continuation keeps abbreviations such as `a.m. on` together.
/// Sentences are trimmed and empty ones dropped.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();

    for paragraph in text.split("\n\n") {
        let chars: Vec<(usize, char)> = paragraph.char_indices().collect();
        let mut start = 0;
        let mut i = 0;

        while i < chars.len() {
            let (_, c) = chars[i];
            if !matches!(c, '.' | '!' | '?') {
                i += 1;
                continue;
            }

            let mut end = i + 1;
            while end < chars.len() && matches!(chars[end].1, '.' | '!' | '?')
            {
                end += 1;
            }
            let mut next = end;
            while next < chars.len() && chars[next].1.is_whitespace() {
                next += 1;
            }

            let at_boundary = next > end
                && chars.get(next).is_none_or(|&(_, n)| {
                    n.is_uppercase() || n.is_ascii_digit() || n == '"'
                });
            if at_boundary || end == chars.len() {
                let byte_end =
                    chars.get(end).map_or(paragraph.len(), |&(b, _)| b);
                push_trimmed(&mut sentences, &paragraph[start..byte_end]);
                start = byte_end;
            }
            i = end;
        }

        push_trimmed(&mut sentences, &paragraph[start..]);
    }

    sentences
}

fn push_trimmed(sentences: &mut Vec<String>, piece: &str) {
    let piece = piece.split_whitespace().collect::<Vec<_>>().join(" ");
    if !piece.is_empty() {
        sentences.push(piece);
    }
}

/// Pick the first sentence mentioning any query word, or the opening
/// sentences when none does.
///
/// Matching is case-insensitive on whole query words. Returns `None` for
/// empty text.
pub fn extract_snippet(text: &str, query: &str) -> Option<String> {
    let sentences = split_sentences(text);
    if sentences.is_empty() {
        return None;
    }

    let words: Vec<String> = query
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .filter(|w| w.chars().any(char::is_alphanumeric))
        .collect();

    let hit = sentences.iter().find(|sentence| {
        let lower = sentence.to_lowercase();
        words.iter().any(|w| lower.contains(w.as_str()))
    });

    let snippet = match hit {
        Some(sentence) => sentence.clone(),
        None => sentences
            .iter()
            .take(DEFAULT_SNIPPET_SENTENCES)
            .cloned()
            .collect::<Vec<_>>()
            .join(" "),
    };

    Some(truncate_chars(&snippet, DEFAULT_SNIPPET_MAX_CHARS))
}

/// Cut `text` to at most `max` characters, marking the cut with `...`.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte, _)) => format!("{}...", &text[..byte]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_terminators() {
        let s = split_sentences("Rain fell. Rivers rose! Was it over? No.");
        assert_eq!(s, vec!["Rain fell.", "Rivers rose!", "Was it over?", "No."]);
    }

    #[test]
    fn keeps_abbreviations_and_decimals() {
        let s = split_sentences(
            "The storm hit at 10.30 a.m. on Monday. Officials in the U.S. \
             responded.",
        );
        assert_eq!(
            s,
            vec![
                "The storm hit at 10.30 a.m. on Monday.",
                "Officials in the U.S. responded."
            ]
        );
    }

    #[test]
    fn blank_lines_end_sentences() {
        let s = split_sentences("Headline without stop\n\nBody text here.");
        assert_eq!(s, vec!["Headline without stop", "Body text here."]);
    }

    #[test]
    fn collapses_whitespace() {
        let s = split_sentences("  Heavy\n rain   fell.   ");
        assert_eq!(s, vec!["Heavy rain fell."]);
    }

    #[test]
    fn empty_text_has_no_sentences() {
        assert!(split_sentences("").is_empty());
        assert!(split_sentences("  \n\n  ").is_empty());
    }

    #[test]
    fn snippet_prefers_matching_sentence() {
        let text = "Markets were calm. Floods hit the valley. Nothing else.";
        assert_eq!(
            extract_snippet(text, "FLOODS valley").as_deref(),
            Some("Floods hit the valley.")
        );
    }

    #[test]
    fn snippet_falls_back_to_opening() {
        let text = "One. Two. Three.";
        assert_eq!(extract_snippet(text, "drought").as_deref(), Some("One. Two."));
        assert_eq!(extract_snippet("", "drought"), None);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("ééééé", 3), "ééé...");
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("exact", 5), "exact");
    }
}
