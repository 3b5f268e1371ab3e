//! newsdex - index news articles and rank them against free-text queries.
//!
//! Articles produced by a fetcher are stored in a
//! [Tantivy](https://github.com/quickwit-oss/tantivy) index, turned into a
//! sparse term-frequency matrix over English stems, and ranked against a
//! query by cosine similarity. The places an article mentions can be
//! extracted and geocoded into a GeoJSON `FeatureCollection`.
//!
//! # Quick start
//!
//! ```no_run
//! use newsdex::{ArchiveDb, Document, NewsIndex};
//! use newsdex::news_index::IndexConfig;
//! use newsdex::progress::NoProgress;
//! use newsdex::search::{self, SearchParams};
//!
//! let archive = ArchiveDb::in_memory().unwrap();
//! let results = NewsIndex::scoped(IndexConfig::in_memory(), |index| {
//!     let articles = [Document::new(
//!         "Storms hit the coast",
//!         "https://example.com/storms",
//!         "2017-09-06T10:45:00Z",
//!         ["weather"],
//!         "Heavy storms flooded the coast.",
//!     )];
//!     index.add_or_update(&articles, &mut NoProgress)?;
//!     search::execute_search(&SearchParams::new("flood"), index, &archive)
//! })
//! .unwrap();
//!
//! for r in &results {
//!     println!("{} (score: {:.3})", r.name, r.score);
//! }
//! ```

pub mod analyzer;
pub mod archive_db;
pub mod cli;
pub mod data_dir;
pub mod document;
pub mod enrich;
pub mod error;
pub mod geocode;
pub mod ingestion;
pub mod matrix;
pub mod news_index;
pub mod progress;
pub mod search;
pub mod similarity;
pub mod tagger;
pub mod text_util;

pub use archive_db::ArchiveDb;
pub use data_dir::DataDir;
pub use document::Document;
pub use error::{Error, Result};
pub use matrix::MatrixBuilder;
pub use news_index::NewsIndex;
