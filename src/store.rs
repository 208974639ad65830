//! Persisted-store access: full-snapshot read and full overwrite, the
//! only primitives the backing table supports. Pure adapter, no
//! reconciliation logic.

use crate::csv;
use crate::error::{AppError, Result};
use crate::models::{Record, STORE_COLUMNS};
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

/// Opaque revision of a store snapshot, used for the optimistic
/// concurrency check on overwrite.
pub(crate) type Revision = u64;

/// A full read of the persisted store plus the revision it was read at.
#[derive(Debug, Clone)]
pub(crate) struct StoreSnapshot {
    pub records: Vec<Record>,
    pub revision: Revision,
}

/// A store that can be read in full and overwritten in full. There is
/// no partial or row-level update primitive; `overwrite_all` must fail
/// with [`AppError::StoreConflict`] when the underlying data moved past
/// the revision the caller read.
#[async_trait]
pub(crate) trait StoreClient: Send + Sync {
    async fn read_all(&self) -> Result<StoreSnapshot>;
    async fn overwrite_all(&self, records: &[Record], expected: Revision) -> Result<()>;
}

fn revision_of(text: &str) -> Revision {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

fn header_row() -> Vec<String> {
    STORE_COLUMNS.iter().map(|c| c.to_string()).collect()
}

/// CSV-file-backed store: header row plus one row per record. A missing
/// file reads as an empty store.
pub(crate) struct CsvStore {
    path: PathBuf,
}

impl CsvStore {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path }
    }

    async fn current_text(&self) -> Result<String> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(AppError::Store(format!(
                "Failed to read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

#[async_trait]
impl StoreClient for CsvStore {
    async fn read_all(&self) -> Result<StoreSnapshot> {
        let text = self.current_text().await?;
        let revision = revision_of(&text);

        let mut rows = csv::parse_rows(&text);
        if rows
            .first()
            .and_then(|r| r.first())
            .is_some_and(|c| c.eq_ignore_ascii_case(STORE_COLUMNS[0]))
        {
            rows.remove(0);
        }

        let records = rows.iter().map(|row| Record::from_row(row)).collect();
        Ok(StoreSnapshot { records, revision })
    }

    async fn overwrite_all(&self, records: &[Record], expected: Revision) -> Result<()> {
        let current = self.current_text().await?;
        if revision_of(&current) != expected {
            return Err(AppError::StoreConflict(format!(
                "{} changed since it was read; rerun the search",
                self.path.display()
            )));
        }

        let rows: Vec<Vec<String>> = records.iter().map(|r| r.to_row()).collect();
        let text = csv::to_csv_string(&header_row(), &rows);
        tokio::fs::write(&self.path, text).await.map_err(|e| {
            AppError::Store(format!("Failed to write {}: {}", self.path.display(), e))
        })?;
        Ok(())
    }
}
