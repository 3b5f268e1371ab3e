use std::path::Path;

use chrono::{SecondsFormat, Utc};
use redb::{
    Database,
    ReadableDatabase,
    ReadableTable,
    TableDefinition,
    backends::InMemoryBackend,
};
use serde::{Deserialize, Serialize};

use crate::{document::Document, error::Result};

const DOCUMENTS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("documents");
const QUERIES: TableDefinition<u64, &[u8]> = TableDefinition::new("queries");

/// A recorded search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: u64,
    pub query: String,
    /// RFC 3339 time the search ran.
    pub at: String,
    pub results: usize,
}

/// Raw fetched documents and the search history, kept in redb.
///
/// Documents are stored as JSON under their name; `newsdex reindex` rebuilds
/// the index from them alone.
pub struct ArchiveDb {
    db: Database,
}

impl ArchiveDb {
    pub fn open(path: &Path) -> Result<Self> {
        Self::init(Database::create(path)?)
    }

    /// An archive that lives only as long as the value.
    pub fn in_memory() -> Result<Self> {
        let db = Database::builder()
            .create_with_backend(InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> Result<Self> {
        let txn = db.begin_write()?;
        txn.open_table(DOCUMENTS)?;
        txn.open_table(QUERIES)?;
        txn.commit()?;

        Ok(Self { db })
    }

    // -- Documents --

    /// Store a batch of documents in one transaction, replacing by name.
    pub fn put_documents(&self, documents: &[Document]) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(DOCUMENTS)?;
            for document in documents {
                let bytes = serde_json::to_vec(document)?;
                table.insert(document.name.as_str(), bytes.as_slice())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Every archived document, sorted by name.
    pub fn list_documents(&self) -> Result<Vec<Document>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(DOCUMENTS)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (_k, v) = entry?;
            result.push(serde_json::from_slice(v.value())?);
        }
        Ok(result)
    }

    pub fn document_count(&self) -> Result<usize> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(DOCUMENTS)?;
        let mut count = 0;
        for entry in table.iter()? {
            entry?;
            count += 1;
        }
        Ok(count)
    }

    // -- History --

    /// Append a search to the history and return its entry.
    pub fn record_query(
        &self,
        query: &str,
        results: usize,
    ) -> Result<HistoryEntry> {
        let txn = self.db.begin_write()?;
        let entry = {
            let mut table = txn.open_table(QUERIES)?;
            let id = match table.last()? {
                Some((k, _v)) => k.value() + 1,
                None => 0,
            };
            let entry = HistoryEntry {
                id,
                query: query.to_string(),
                at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
                results,
            };
            let bytes = serde_json::to_vec(&entry)?;
            table.insert(id, bytes.as_slice())?;
            entry
        };
        txn.commit()?;
        Ok(entry)
    }

    /// The most recent `limit` searches, newest first.
    pub fn history(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(QUERIES)?;
        let mut result = Vec::new();
        for entry in table.iter()?.rev().take(limit) {
            let (_k, v) = entry?;
            result.push(serde_json::from_slice(v.value())?);
        }
        Ok(result)
    }

    pub fn clear_history(&self) -> Result<usize> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(QUERIES)?;
            let mut removed = 0;
            while table.pop_first()?.is_some() {
                removed += 1;
            }
            removed
        };
        txn.commit()?;
        Ok(removed)
    }
}

impl std::fmt::Debug for ArchiveDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveDb").finish_non_exhaustive()
    }
}
