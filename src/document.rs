use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Separator used when tags are flattened into one stored field.
pub const TAG_SEPARATOR: &str = "|";

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// A news article as produced by the fetcher.
///
/// `name` is the natural key: indexing a document whose name is already
/// stored replaces the stored record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub name: String,
    pub url: String,
    /// Publication date as ISO8601, e.g. `2017-09-06T10:45:00Z`.
    pub date: String,
    pub tags: Vec<String>,
    pub content: String,
}

impl Document {
    /// Build a document, dropping duplicate tags (first occurrence wins).
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        date: impl Into<String>,
        tags: impl IntoIterator<Item = impl Into<String>>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            date: date.into(),
            tags: dedup_tags(tags.into_iter().map(Into::into)),
            content: content.into(),
        }
    }

    /// The publication date as a sortable `YYYYMMDDHHMMSS` integer.
    ///
    /// Returns `None` when the date string is not ISO8601.
    pub fn timestamp(&self) -> Option<u64> {
        date_to_timestamp(&self.date)
    }

    /// Tags joined into the single-field form kept by the index.
    pub fn joined_tags(&self) -> String {
        self.tags.join(TAG_SEPARATOR)
    }
}

/// Record shape emitted by the article fetcher.
///
/// Deserialization goes through [`Document::new`] so tag deduplication
/// holds for fetched input too.
#[derive(Debug, Deserialize)]
struct FetchedRecord {
    name: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    date: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    content: String,
}

impl From<FetchedRecord> for Document {
    fn from(r: FetchedRecord) -> Self {
        Document::new(r.name, r.url, r.date, r.tags, r.content)
    }
}

/// Parse a JSON array of fetched records.
pub fn parse_records(json: &str) -> serde_json::Result<Vec<Document>> {
    let records: Vec<FetchedRecord> = serde_json::from_str(json)?;
    Ok(records.into_iter().map(Document::from).collect())
}

/// Convert an ISO8601 date into a `YYYYMMDDHHMMSS` integer.
///
/// Accepts RFC 3339 (`2017-09-06T10:45:00Z`, with or without offset) and
/// offset-less `2017-09-06T10:45:00`. Offsets are kept as written, not
/// normalized to UTC, so the integer matches the date the source shows.
pub fn date_to_timestamp(date: &str) -> Option<u64> {
    let naive = DateTime::parse_from_rfc3339(date)
        .map(|dt| dt.naive_local())
        .or_else(|_| {
            NaiveDateTime::parse_from_str(date, "%Y-%m-%dT%H:%M:%S")
        })
        .ok()?;
    naive.format(TIMESTAMP_FORMAT).to_string().parse().ok()
}

/// Split a stored tag field back into tags.
pub fn split_tags(joined: &str) -> Vec<String> {
    joined
        .split(TAG_SEPARATOR)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn dedup_tags(tags: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tags.filter(|t| seen.insert(t.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(tags: &[&str]) -> Document {
        Document::new(
            "Storms hit Guadalajara",
            "https://example.com/storms",
            "2017-09-06T10:45:00Z",
            tags.iter().copied(),
            "Heavy rain fell.",
        )
    }

    #[test]
    fn tags_are_deduplicated_in_order() {
        let d = doc(&["weather", "mexico", "weather", "storms", "mexico"]);
        assert_eq!(d.tags, vec!["weather", "mexico", "storms"]);
    }

    #[test]
    fn joined_tags_round_trip() {
        let d = doc(&["weather", "mexico"]);
        assert_eq!(d.joined_tags(), "weather|mexico");
        assert_eq!(split_tags(&d.joined_tags()), d.tags);
        assert!(split_tags("").is_empty());
    }

    #[test]
    fn timestamp_from_utc_date() {
        assert_eq!(doc(&[]).timestamp(), Some(20170906104500));
    }

    #[test]
    fn timestamp_keeps_written_offset() {
        assert_eq!(
            date_to_timestamp("2000-01-31T23:59:59+02:00"),
            Some(20000131235959)
        );
        assert_eq!(
            date_to_timestamp("2000-01-31T23:59:59"),
            Some(20000131235959)
        );
    }

    #[test]
    fn invalid_date_has_no_timestamp() {
        assert_eq!(date_to_timestamp("last tuesday"), None);
        assert_eq!(date_to_timestamp(""), None);
    }

    #[test]
    fn parse_fetched_records() {
        let json = r#"[
            {
                "name": "Floods",
                "url": "https://example.com/floods",
                "date": "2017-01-02T03:04:05Z",
                "tags": ["weather", "weather", "floods"],
                "content": "Rivers rose."
            },
            { "name": "Bare" }
        ]"#;
        let docs = parse_records(json).unwrap();

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].tags, vec!["weather", "floods"]);
        assert_eq!(docs[0].timestamp(), Some(20170102030405));
        assert_eq!(docs[1].name, "Bare");
        assert!(docs[1].content.is_empty());
    }

    #[test]
    fn parse_rejects_missing_name() {
        assert!(parse_records(r#"[{"content": "x"}]"#).is_err());
    }
}
