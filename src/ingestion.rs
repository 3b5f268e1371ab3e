use std::{io::Read, path::Path};

use tracing::info;

use crate::{
    archive_db::ArchiveDb,
    document::{Document, parse_records},
    error::{Error, Result},
    news_index::NewsIndex,
    progress::Progress,
};

/// Outcome of one ingestion batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    pub processed: usize,
    /// Documents whose name was not yet in the index.
    pub added: usize,
}

/// Read fetcher output: a JSON array of records, from a file or from
/// stdin when `source` is `-`.
pub fn load_records(source: &Path) -> Result<Vec<Document>> {
    let json = if source == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(source).map_err(|e| {
            Error::Config(format!("cannot read {}: {e}", source.display()))
        })?
    };
    Ok(parse_records(&json)?)
}

/// Archive a batch of documents and add them to the index.
///
/// Documents are archived first so a failed indexing run can be replayed
/// with [`reindex`].
pub fn ingest_documents(
    documents: &[Document],
    index: &mut NewsIndex,
    archive: &ArchiveDb,
    progress: &mut dyn Progress,
) -> Result<IngestReport> {
    archive.put_documents(documents)?;

    let report = index_batch(documents, index, progress)?;
    info!(
        processed = report.processed,
        added = report.added,
        "ingested batch"
    );
    Ok(report)
}

/// Replay every archived document through the index, in name order.
pub fn reindex(
    index: &mut NewsIndex,
    archive: &ArchiveDb,
    progress: &mut dyn Progress,
) -> Result<IngestReport> {
    let documents = archive.list_documents()?;

    let report = index_batch(&documents, index, progress)?;
    info!(
        processed = report.processed,
        added = report.added,
        "reindexed from archive"
    );
    Ok(report)
}

fn index_batch(
    documents: &[Document],
    index: &mut NewsIndex,
    progress: &mut dyn Progress,
) -> Result<IngestReport> {
    let before = index.count();
    let processed = index.add_or_update(documents, progress)?;
    let added = index.count() - before;
    Ok(IngestReport { processed, added })
}
