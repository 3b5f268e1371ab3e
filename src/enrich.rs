use std::collections::HashSet;

use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::{
    error::Result,
    geocode::{Geocoder, Location},
    news_index::{DocField, NewsIndex},
    progress::{NoProgress, Progress},
    tagger::{EntityTagger, GPE},
    text_util::split_sentences,
};

/// GeoJSON `FeatureCollection` of the places a document mentions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    kind: &'static str,
    pub features: Vec<Value>,
}

impl FeatureCollection {
    pub fn new(features: Vec<Value>) -> Self {
        Self {
            kind: "FeatureCollection",
            features,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Turns a place and its location into a GeoJSON feature.
///
/// GeoJSON the geocoder already shaped as a `Feature` or a
/// `FeatureCollection` is kept verbatim. Bare geometry is wrapped in a
/// feature, and a location without geometry becomes a point.
pub fn to_feature(name: &str, location: Location) -> Value {
    let properties = json!({
        "name": name,
        "location": location.location,
        "latitude": location.latitude,
        "longitude": location.longitude,
    });

    match location.geojson {
        Some(geojson)
            if matches!(
                geojson["type"].as_str(),
                Some("Feature" | "FeatureCollection")
            ) =>
        {
            geojson
        }
        Some(geometry) => json!({
            "type": "Feature",
            "geometry": geometry,
            "properties": properties,
        }),
        None => json!({
            "type": "Feature",
            "geometry": {
                "type": "Point",
                "coordinates": [location.longitude, location.latitude],
            },
            "properties": properties,
        }),
    }
}

/// Extracts place names from stored documents and geocodes them.
#[derive(Debug)]
pub struct Enricher<T, G> {
    tagger: T,
    geocoder: G,
}

impl<T: EntityTagger, G: Geocoder> Enricher<T, G> {
    pub fn new(tagger: T, geocoder: G) -> Self {
        Self { tagger, geocoder }
    }

    pub fn analyze(
        &self,
        index: &NewsIndex,
        ordinal: usize,
    ) -> Result<FeatureCollection> {
        self.analyze_with_progress(index, ordinal, &mut NoProgress)
    }

    /// Geocode every distinct place mentioned by the document at
    /// `ordinal`.
    ///
    /// Places are collected in order of first mention. A sentence the
    /// tagger fails on, or a name the geocoder fails on, is logged and
    /// skipped; names without a location are dropped. Progress is
    /// reported per sentence.
    pub fn analyze_with_progress(
        &self,
        index: &NewsIndex,
        ordinal: usize,
        progress: &mut dyn Progress,
    ) -> Result<FeatureCollection> {
        let content = index.field(ordinal, DocField::Content)?;
        let places = self.collect(&content, GPE, progress);
        debug!(ordinal, places = places.len(), "tagged places");

        let mut features = Vec::with_capacity(places.len());
        for place in places {
            match self.geocoder.locate(&place) {
                Ok(Some(location)) => {
                    features.push(to_feature(&place, location))
                }
                Ok(None) => debug!(place = %place, "no location found"),
                Err(e) => {
                    warn!(place = %place, error = %e, "geocoding failed")
                }
            }
        }

        Ok(FeatureCollection::new(features))
    }

    /// Distinct entities labelled `label` in `content`, in order of first
    /// mention.
    pub fn named_entities(&self, content: &str, label: &str) -> Vec<String> {
        self.collect(content, label, &mut NoProgress)
    }

    fn collect(
        &self,
        content: &str,
        label: &str,
        progress: &mut dyn Progress,
    ) -> Vec<String> {
        let sentences = split_sentences(content);
        let total = sentences.len();
        let mut seen = HashSet::new();
        let mut names = Vec::new();

        for (i, sentence) in sentences.iter().enumerate() {
            match self.tagger.tag(sentence) {
                Ok(tokens) => {
                    let mut current: Vec<&str> = Vec::new();
                    let mut flush = |current: &mut Vec<&str>| {
                        if current.is_empty() {
                            return;
                        }
                        let name = current.join(" ");
                        current.clear();
                        if seen.insert(name.clone()) {
                            names.push(name);
                        }
                    };

                    for token in &tokens {
                        if token.entity() != label {
                            flush(&mut current);
                            continue;
                        }
                        if token.begins() {
                            flush(&mut current);
                        }
                        current.push(&token.text);
                    }
                    flush(&mut current);
                }
                Err(e) => warn!(sentence = i, error = %e, "tagging failed"),
            }
            progress.update(i + 1, total);
        }

        names
    }
}
