use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use tantivy::{
    DocAddress,
    Index,
    IndexReader,
    IndexWriter,
    ReloadPolicy,
    Searcher,
    TantivyDocument,
    Term,
    directory::MmapDirectory,
    doc,
    schema::*,
};
use tracing::{debug, info, warn};

use crate::{
    analyzer::{TOKENIZER_NAME, TermAnalyzer},
    document::{Document, split_tags},
    error::{Error, Result},
    progress::Progress,
};

/// Field names used in the schema.
pub mod fields {
    pub const NAME: &str = "name";
    pub const CONTENT: &str = "content";
    pub const DATE: &str = "date";
    pub const TIMESTAMP: &str = "timestamp";
    pub const URL: &str = "url";
    pub const TAGS: &str = "tags";
    pub const SEQ: &str = "seq";
}

/// Memory handed to the single indexing thread.
pub const WRITER_MEMORY_BUDGET: usize = 15_000_000;

/// Where the index lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Storage {
    /// Volatile, gone when the store is closed.
    InMemory,
    /// Durable, in the given directory.
    Directory(PathBuf),
}

/// Construction-time settings for a [`NewsIndex`].
#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub storage: Storage,
    /// Log every inserted/updated document name at `info`.
    pub verbose: bool,
    pub memory_budget: usize,
}

impl IndexConfig {
    pub fn in_memory() -> Self {
        Self {
            storage: Storage::InMemory,
            verbose: false,
            memory_budget: WRITER_MEMORY_BUDGET,
        }
    }

    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self {
            storage: Storage::Directory(path.into()),
            ..Self::in_memory()
        }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// Whether the store started empty or over an existing index.
///
/// Fixed when the store is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    /// Freshly created: no previously stored name can collide.
    Insert,
    /// Opened over existing documents: names may be replaced.
    Update,
}

/// A stored field addressable through [`NewsIndex::field`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DocField {
    Name,
    Content,
    Date,
    Url,
    Tags,
}

/// Every stored field of one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    pub ordinal: usize,
    pub name: String,
    pub url: String,
    pub date: String,
    /// `YYYYMMDDHHMMSS`, or 0 when the date could not be parsed.
    pub timestamp: u64,
    pub tags: Vec<String>,
    pub content: String,
}

/// Resolved field handles for the schema.
#[derive(Clone, Copy)]
struct SchemaFields {
    name: Field,
    content: Field,
    date: Field,
    timestamp: Field,
    url: Field,
    tags: Field,
    seq: Field,
}

impl SchemaFields {
    fn resolve(schema: &Schema) -> Result<Self> {
        let f = |name: &str| {
            schema.get_field(name).map_err(|_| {
                Error::Config(format!("index schema has no field '{name}'"))
            })
        };
        Ok(Self {
            name: f(fields::NAME)?,
            content: f(fields::CONTENT)?,
            date: f(fields::DATE)?,
            timestamp: f(fields::TIMESTAMP)?,
            url: f(fields::URL)?,
            tags: f(fields::TAGS)?,
            seq: f(fields::SEQ)?,
        })
    }
}

fn build_schema() -> Schema {
    let mut builder = Schema::builder();

    builder.add_text_field(fields::NAME, STRING | STORED);

    let content_opts = TextOptions::default()
        .set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(TOKENIZER_NAME)
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        )
        .set_stored();
    builder.add_text_field(fields::CONTENT, content_opts);

    builder.add_text_field(fields::DATE, STORED);
    builder.add_u64_field(fields::TIMESTAMP, STORED | FAST);
    builder.add_text_field(fields::URL, STRING | STORED);
    builder.add_text_field(fields::TAGS, STRING | STORED);
    builder.add_u64_field(fields::SEQ, STORED | FAST);

    builder.build()
}

/// Live documents of one reader generation, in insertion order.
struct Snapshot {
    searcher: Searcher,
    addresses: Vec<DocAddress>,
    /// Sequence number of each entry in `addresses`, ascending.
    seqs: Vec<u64>,
}

impl Snapshot {
    fn load(reader: &IndexReader) -> Result<Self> {
        let searcher = reader.searcher();
        let mut keyed = Vec::new();

        for (segment_ord, segment) in
            searcher.segment_readers().iter().enumerate()
        {
            let seq_column = segment.fast_fields().u64(fields::SEQ)?;
            for doc_id in segment.doc_ids_alive() {
                let seq = seq_column.first(doc_id).unwrap_or(u64::MAX);
                keyed.push((seq, DocAddress::new(segment_ord as u32, doc_id)));
            }
        }

        keyed.sort_by_key(|(seq, addr)| (*seq, addr.segment_ord, addr.doc_id));

        let (seqs, addresses) = keyed.into_iter().unzip();
        Ok(Self {
            searcher,
            addresses,
            seqs,
        })
    }
}

/// Document store backed by a Tantivy index.
///
/// Documents are keyed by name: adding a document whose name is already
/// stored replaces the stored record and keeps its ordinal. Ordinals count
/// live documents in insertion order and stay stable while the store is
/// open.
///
/// The store owns the index writer, and with it the directory lock, until
/// [`close`](Self::close) is called. Only one store may be open per
/// directory.
pub struct NewsIndex {
    reader: IndexReader,
    writer: IndexWriter,
    guard: CloseGuard,
    fields: SchemaFields,
    analyzer: TermAnalyzer,
    mode: StoreMode,
    verbose: bool,
    location: Option<PathBuf>,
    snapshot: Snapshot,
    names: HashMap<String, u64>,
    next_seq: u64,
}

impl NewsIndex {
    /// Open a store as described by `config`.
    ///
    /// A directory without an index gets a fresh one and the store runs in
    /// [`StoreMode::Insert`]; an existing index is reopened in
    /// [`StoreMode::Update`].
    pub fn open(config: IndexConfig) -> Result<Self> {
        let analyzer = TermAnalyzer::english()?;

        let (index, mode, location) = match &config.storage {
            Storage::InMemory => (
                Index::create_in_ram(build_schema()),
                StoreMode::Insert,
                None,
            ),
            Storage::Directory(dir) => {
                let (index, mode) = open_directory(dir)?;
                (index, mode, Some(dir.clone()))
            }
        };

        index
            .tokenizers()
            .register(TOKENIZER_NAME, analyzer.text_analyzer());

        let fields = SchemaFields::resolve(&index.schema())?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        let writer = index.writer_with_num_threads(1, config.memory_budget)?;
        let snapshot = Snapshot::load(&reader)?;

        let mut names = HashMap::with_capacity(snapshot.addresses.len());
        let mut next_seq = 0;
        for (addr, &seq) in snapshot.addresses.iter().zip(&snapshot.seqs) {
            let doc: TantivyDocument = snapshot.searcher.doc(*addr)?;
            names.insert(extract_text(&doc, fields.name), seq);
            next_seq = next_seq.max(seq + 1);
        }

        match &location {
            Some(dir) => info!(
                dir = %dir.display(),
                mode = ?mode,
                documents = names.len(),
                "opened index"
            ),
            None => debug!("opened in-memory index"),
        }

        let guard = CloseGuard {
            location: location.clone(),
            armed: true,
        };

        Ok(Self {
            reader,
            writer,
            guard,
            fields,
            analyzer,
            mode,
            verbose: config.verbose,
            location,
            snapshot,
            names,
            next_seq,
        })
    }

    /// Open a store, hand it to `f`, and close it whatever `f` returns.
    pub fn scoped<T>(
        config: IndexConfig,
        f: impl FnOnce(&mut NewsIndex) -> Result<T>,
    ) -> Result<T> {
        let mut index = Self::open(config)?;
        let result = f(&mut index);
        let closed = index.close();
        let value = result?;
        closed?;
        Ok(value)
    }

    /// Commit pending work and release the writer and its directory lock.
    pub fn close(self) -> Result<()> {
        let Self {
            mut writer,
            mut guard,
            ..
        } = self;
        guard.armed = false;
        writer.commit()?;
        writer.wait_merging_threads()?;
        debug!("closed index");
        Ok(())
    }

    pub fn mode(&self) -> StoreMode {
        self.mode
    }

    /// Backing directory, `None` for an in-memory store.
    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    /// The analyzer used for the content field.
    pub fn analyzer(&self) -> &TermAnalyzer {
        &self.analyzer
    }

    /// Insert new documents and replace those whose name is already stored.
    ///
    /// The batch is committed at the end. Returns the number of documents
    /// processed. A batch that fails is rolled back as a whole: nothing of
    /// it is committed and the names it introduced are forgotten.
    pub fn add_or_update(
        &mut self,
        documents: &[Document],
        progress: &mut dyn Progress,
    ) -> Result<usize> {
        let seq_mark = self.next_seq;
        let mut introduced = Vec::new();

        let staged =
            self.stage(documents, progress, &mut introduced).and_then(|()| {
                self.writer.commit()?;
                Ok(())
            });
        if let Err(err) = staged {
            self.discard(seq_mark, &introduced)?;
            return Err(err);
        }
        self.reload()?;

        let total = documents.len();
        info!(
            "Indexed {total} documents ({} docs in index)",
            self.count()
        );
        Ok(total)
    }

    /// Queue a batch on the writer without committing it. Names seen for
    /// the first time are pushed onto `introduced`.
    fn stage(
        &mut self,
        documents: &[Document],
        progress: &mut dyn Progress,
        introduced: &mut Vec<String>,
    ) -> Result<()> {
        let f = self.fields;
        let writer = &mut self.writer;
        let total = documents.len();

        for (i, document) in documents.iter().enumerate() {
            let seq = match self.names.get(&document.name) {
                Some(&seq) => {
                    writer.delete_term(Term::from_field_text(
                        f.name,
                        &document.name,
                    ));
                    if self.verbose {
                        info!("Updated: \"{}\"", document.name);
                    }
                    seq
                }
                None => {
                    let seq = self.next_seq;
                    self.next_seq += 1;
                    self.names.insert(document.name.clone(), seq);
                    introduced.push(document.name.clone());
                    if self.verbose {
                        info!("New: \"{}\"", document.name);
                    }
                    seq
                }
            };

            let timestamp = document.timestamp().unwrap_or_else(|| {
                warn!(
                    name = %document.name,
                    date = %document.date,
                    "unparseable date, storing timestamp 0"
                );
                0
            });

            let tags = document.joined_tags();
            writer.add_document(doc!(
                f.name => document.name.as_str(),
                f.content => document.content.as_str(),
                f.date => document.date.as_str(),
                f.timestamp => timestamp,
                f.url => document.url.as_str(),
                f.tags => tags.as_str(),
                f.seq => seq,
            ))?;

            progress.update(i + 1, total);
        }
        Ok(())
    }

    /// Drop everything queued since the last commit.
    fn discard(&mut self, seq_mark: u64, introduced: &[String]) -> Result<()> {
        self.writer.rollback()?;
        for name in introduced {
            self.names.remove(name);
        }
        self.next_seq = seq_mark;
        warn!(
            dropped = introduced.len(),
            "indexing batch failed, rolled back"
        );
        Ok(())
    }

    /// Number of live documents.
    pub fn count(&self) -> usize {
        self.snapshot.addresses.len()
    }

    /// Read one stored field of the document at `ordinal`.
    pub fn field(&self, ordinal: usize, field: DocField) -> Result<String> {
        let doc = self.stored(ordinal)?;
        let f = self.fields;
        let handle = match field {
            DocField::Name => f.name,
            DocField::Content => f.content,
            DocField::Date => f.date,
            DocField::Url => f.url,
            DocField::Tags => f.tags,
        };
        Ok(extract_text(&doc, handle))
    }

    /// Read every stored field of the document at `ordinal`.
    pub fn document(&self, ordinal: usize) -> Result<StoredDocument> {
        let doc = self.stored(ordinal)?;
        let f = self.fields;
        Ok(StoredDocument {
            ordinal,
            name: extract_text(&doc, f.name),
            url: extract_text(&doc, f.url),
            date: extract_text(&doc, f.date),
            timestamp: extract_u64(&doc, f.timestamp),
            tags: split_tags(&extract_text(&doc, f.tags)),
            content: extract_text(&doc, f.content),
        })
    }

    /// Ordinal of the document stored under `name`.
    pub fn ordinal_of(&self, name: &str) -> Option<usize> {
        let seq = self.names.get(name)?;
        self.snapshot.seqs.binary_search(seq).ok()
    }

    /// Content of every document, in ordinal order.
    pub fn contents(&self) -> Result<Vec<String>> {
        (0..self.count())
            .map(|ordinal| self.field(ordinal, DocField::Content))
            .collect()
    }

    fn stored(&self, ordinal: usize) -> Result<TantivyDocument> {
        let addr = self.snapshot.addresses.get(ordinal).ok_or_else(|| {
            Error::NotFound {
                kind: "document",
                name: format!("ordinal {ordinal}"),
            }
        })?;
        Ok(self.snapshot.searcher.doc(*addr)?)
    }

    fn reload(&mut self) -> Result<()> {
        self.reader.reload()?;
        self.snapshot = Snapshot::load(&self.reader)?;
        Ok(())
    }
}

/// Warns when a store goes away without [`NewsIndex::close`].
struct CloseGuard {
    location: Option<PathBuf>,
    armed: bool,
}

impl Drop for CloseGuard {
    fn drop(&mut self) {
        if self.armed {
            warn!(
                location = ?self.location,
                "index store dropped without close()"
            );
        }
    }
}

impl std::fmt::Debug for NewsIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewsIndex")
            .field("mode", &self.mode)
            .field("location", &self.location)
            .field("documents", &self.count())
            .finish_non_exhaustive()
    }
}

fn open_directory(dir: &Path) -> Result<(Index, StoreMode)> {
    std::fs::create_dir_all(dir)?;

    let mmap_dir = MmapDirectory::open(dir)
        .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?;
    let exists = Index::exists(&mmap_dir)
        .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?;

    if exists {
        Ok((Index::open(mmap_dir)?, StoreMode::Update))
    } else {
        let index = Index::create(
            mmap_dir,
            build_schema(),
            tantivy::IndexSettings::default(),
        )?;
        Ok((index, StoreMode::Insert))
    }
}

fn extract_text(doc: &TantivyDocument, field: Field) -> String {
    doc.get_first(field)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

fn extract_u64(doc: &TantivyDocument, field: Field) -> u64 {
    doc.get_first(field).and_then(|v| v.as_u64()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;

    fn article(name: &str, content: &str) -> Document {
        Document::new(
            name,
            format!("https://example.com/{name}"),
            "2017-09-06T10:45:00Z",
            ["weather", "storms", "weather"],
            content,
        )
    }

    fn open_in_ram() -> NewsIndex {
        NewsIndex::open(IndexConfig::in_memory()).unwrap()
    }

    #[test]
    fn add_and_read_fields() {
        let mut idx = open_in_ram();
        let n = idx
            .add_or_update(
                &[
                    article("Storms", "Heavy storms hit the coast"),
                    article("Floods", "Rivers flooded the valley"),
                ],
                &mut NoProgress,
            )
            .unwrap();

        assert_eq!(n, 2);
        assert_eq!(idx.count(), 2);
        assert_eq!(idx.mode(), StoreMode::Insert);
        assert_eq!(idx.field(0, DocField::Name).unwrap(), "Storms");
        assert_eq!(idx.field(1, DocField::Name).unwrap(), "Floods");
        assert_eq!(
            idx.field(1, DocField::Content).unwrap(),
            "Rivers flooded the valley"
        );
        assert_eq!(idx.field(0, DocField::Tags).unwrap(), "weather|storms");
        assert_eq!(
            idx.field(0, DocField::Date).unwrap(),
            "2017-09-06T10:45:00Z"
        );
        assert_eq!(
            idx.field(0, DocField::Url).unwrap(),
            "https://example.com/Storms"
        );
        idx.close().unwrap();
    }

    #[test]
    fn stored_document_has_timestamp_and_tags() {
        let mut idx = open_in_ram();
        idx.add_or_update(&[article("Storms", "rain")], &mut NoProgress)
            .unwrap();

        let doc = idx.document(0).unwrap();
        assert_eq!(doc.ordinal, 0);
        assert_eq!(doc.timestamp, 20170906104500);
        assert_eq!(doc.tags, vec!["weather", "storms"]);
        idx.close().unwrap();
    }

    #[test]
    fn unparseable_date_stores_zero_timestamp() {
        let mut idx = open_in_ram();
        let doc = Document::new("Odd", "", "yesterday", ["x"], "rain");
        idx.add_or_update(&[doc], &mut NoProgress).unwrap();

        let stored = idx.document(0).unwrap();
        assert_eq!(stored.date, "yesterday");
        assert_eq!(stored.timestamp, 0);
        idx.close().unwrap();
    }

    #[test]
    fn reindexing_same_name_updates_in_place() {
        let mut idx = open_in_ram();
        idx.add_or_update(
            &[article("Storms", "old text"), article("Floods", "rivers")],
            &mut NoProgress,
        )
        .unwrap();
        idx.add_or_update(&[article("Storms", "new text")], &mut NoProgress)
            .unwrap();

        assert_eq!(idx.count(), 2);
        assert_eq!(idx.ordinal_of("Storms"), Some(0));
        assert_eq!(idx.field(0, DocField::Content).unwrap(), "new text");
        assert_eq!(idx.field(1, DocField::Name).unwrap(), "Floods");
        idx.close().unwrap();
    }

    #[test]
    fn identical_document_twice_is_stored_once() {
        let mut idx = open_in_ram();
        let doc = article("Storms", "rain rain snow");
        idx.add_or_update(&[doc.clone()], &mut NoProgress).unwrap();
        idx.add_or_update(&[doc], &mut NoProgress).unwrap();

        assert_eq!(idx.count(), 1);
        idx.close().unwrap();
    }

    #[test]
    fn duplicate_names_within_one_batch_collapse() {
        let mut idx = open_in_ram();
        idx.add_or_update(
            &[article("Storms", "first"), article("Storms", "second")],
            &mut NoProgress,
        )
        .unwrap();

        assert_eq!(idx.count(), 1);
        assert_eq!(idx.field(0, DocField::Content).unwrap(), "second");
        idx.close().unwrap();
    }

    #[test]
    fn out_of_range_ordinal_is_not_found() {
        let mut idx = open_in_ram();
        idx.add_or_update(&[article("Storms", "rain")], &mut NoProgress)
            .unwrap();

        let err = idx.field(1, DocField::Name).unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: "document", .. }));
        assert!(idx.document(42).is_err());
        idx.close().unwrap();
    }

    #[test]
    fn empty_store() {
        let idx = open_in_ram();
        assert_eq!(idx.count(), 0);
        assert!(idx.contents().unwrap().is_empty());
        assert_eq!(idx.ordinal_of("anything"), None);
        idx.close().unwrap();
    }

    #[test]
    fn progress_is_reported_per_document() {
        let mut idx = open_in_ram();
        let mut seen = Vec::new();
        let mut progress =
            |current: usize, total: usize| seen.push((current, total));
        idx.add_or_update(
            &[article("A", "a"), article("B", "b"), article("C", "c")],
            &mut progress,
        )
        .unwrap();
        idx.close().unwrap();

        assert_eq!(seen, vec![(1, 3), (2, 3), (3, 3)]);
    }

    #[test]
    fn contents_follow_ordinals() {
        let mut idx = open_in_ram();
        idx.add_or_update(
            &[article("A", "alpha"), article("B", "beta")],
            &mut NoProgress,
        )
        .unwrap();

        assert_eq!(idx.contents().unwrap(), vec!["alpha", "beta"]);
        idx.close().unwrap();
    }

    #[test]
    fn directory_modes_and_persistence() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("index");

        {
            let mut idx =
                NewsIndex::open(IndexConfig::directory(&dir)).unwrap();
            assert_eq!(idx.mode(), StoreMode::Insert);
            assert_eq!(idx.location(), Some(dir.as_path()));
            idx.add_or_update(
                &[article("Storms", "rain"), article("Floods", "river")],
                &mut NoProgress,
            )
            .unwrap();
            idx.close().unwrap();
        }

        {
            let mut idx =
                NewsIndex::open(IndexConfig::directory(&dir)).unwrap();
            assert_eq!(idx.mode(), StoreMode::Update);
            assert_eq!(idx.count(), 2);
            assert_eq!(idx.ordinal_of("Floods"), Some(1));

            idx.add_or_update(
                &[article("Storms", "snow"), article("Drought", "dry")],
                &mut NoProgress,
            )
            .unwrap();
            assert_eq!(idx.count(), 3);
            assert_eq!(idx.field(0, DocField::Content).unwrap(), "snow");
            assert_eq!(idx.field(2, DocField::Name).unwrap(), "Drought");
            idx.close().unwrap();
        }
    }

    #[test]
    fn discarded_batch_leaves_no_trace() {
        let mut idx = open_in_ram();
        idx.add_or_update(&[article("Storms", "rain")], &mut NoProgress)
            .unwrap();

        let mut introduced = Vec::new();
        idx.stage(
            &[article("Storms", "hail"), article("Floods", "rivers")],
            &mut NoProgress,
            &mut introduced,
        )
        .unwrap();
        assert_eq!(introduced, vec!["Floods"]);
        idx.discard(1, &introduced).unwrap();

        idx.add_or_update(&[article("Drought", "dry")], &mut NoProgress)
            .unwrap();
        assert_eq!(idx.count(), 2);
        assert_eq!(idx.field(0, DocField::Content).unwrap(), "rain");
        assert_eq!(idx.ordinal_of("Floods"), None);
        assert_eq!(idx.ordinal_of("Drought"), Some(1));
        assert_eq!(idx.document(1).unwrap().name, "Drought");
        idx.close().unwrap();
    }

    #[test]
    fn second_store_on_same_directory_is_refused() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("index");

        let first = NewsIndex::open(IndexConfig::directory(&dir)).unwrap();
        assert!(NewsIndex::open(IndexConfig::directory(&dir)).is_err());
        first.close().unwrap();

        let again = NewsIndex::open(IndexConfig::directory(&dir)).unwrap();
        again.close().unwrap();
    }

    #[test]
    fn scoped_closes_the_store() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("index");

        let count = NewsIndex::scoped(IndexConfig::directory(&dir), |idx| {
            idx.add_or_update(&[article("Storms", "rain")], &mut NoProgress)?;
            Ok(idx.count())
        })
        .unwrap();
        assert_eq!(count, 1);

        // The lock was released, so the directory can be opened again.
        let idx = NewsIndex::open(IndexConfig::directory(&dir)).unwrap();
        assert_eq!(idx.count(), 1);
        idx.close().unwrap();
    }

    #[test]
    fn scoped_closes_on_error() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("index");

        let result: Result<()> =
            NewsIndex::scoped(IndexConfig::directory(&dir), |idx| {
                idx.field(0, DocField::Name).map(|_| ())
            });
        assert!(result.is_err());

        let idx = NewsIndex::open(IndexConfig::directory(&dir)).unwrap();
        idx.close().unwrap();
    }
}
