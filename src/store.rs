//! Summary persistence boundary
//!
//! One [`ExerciseSummaryRecord`] is appended per finished session. Stores
//! are append-only lists: no dedup, no update, no delete.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::config::ExerciseMode;
use crate::error::{log_store_error, StoreError};

/// Persisted summary of one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseSummaryRecord {
    /// Milliseconds since the UNIX epoch when the session finished
    pub timestamp_ms: u64,
    pub exercise_type: ExerciseMode,
    pub completed_sets: u32,
    /// Reps of the last set (the counter resets every set)
    pub total_reps: u32,
    pub duration_seconds: f64,
    pub average_rep_speed_seconds: f64,
    pub calories_burned: f64,
}

pub trait SummaryStore: Send {
    fn append(&mut self, record: ExerciseSummaryRecord) -> Result<(), StoreError>;
    fn records(&self) -> Result<Vec<ExerciseSummaryRecord>, StoreError>;
}

/// In-memory store; clones share the same list
#[derive(Debug, Default, Clone)]
pub struct InMemorySummaryStore {
    records: Arc<Mutex<Vec<ExerciseSummaryRecord>>>,
}

impl InMemorySummaryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SummaryStore for InMemorySummaryStore {
    fn append(&mut self, record: ExerciseSummaryRecord) -> Result<(), StoreError> {
        self.records
            .lock()
            .map_err(|_| StoreError::Io {
                reason: "summary list lock poisoned".to_string(),
            })?
            .push(record);
        Ok(())
    }

    fn records(&self) -> Result<Vec<ExerciseSummaryRecord>, StoreError> {
        self.records
            .lock()
            .map(|guard| guard.clone())
            .map_err(|_| StoreError::Io {
                reason: "summary list lock poisoned".to_string(),
            })
    }
}

/// Store backed by a JSON array file
///
/// A missing file reads as an empty list. Each append writes the whole list
/// to a `.tmp` sibling and renames it into place, so a failed write leaves
/// the previous history intact.
#[derive(Debug, Clone)]
pub struct JsonFileSummaryStore {
    path: PathBuf,
}

impl JsonFileSummaryStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Write the full list next to the store, then rename it over the old file
    fn replace_contents(&self, bytes: &[u8]) -> Result<(), StoreError> {
        let temp_path = self.temp_path();
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

impl SummaryStore for JsonFileSummaryStore {
    fn append(&mut self, record: ExerciseSummaryRecord) -> Result<(), StoreError> {
        let mut records = self.records()?;
        records.push(record);

        let json = serde_json::to_string_pretty(&records).map_err(|err| {
            StoreError::Serialization {
                reason: err.to_string(),
            }
        })?;
        self.replace_contents(json.as_bytes())
            .inspect_err(|err| log_store_error(err, "JsonFileSummaryStore::append"))?;
        tracing::info!(
            "[Store] Appended summary #{} to {:?}",
            records.len(),
            self.path
        );
        Ok(())
    }

    fn records(&self) -> Result<Vec<ExerciseSummaryRecord>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(Vec::new()),
            Ok(contents) => serde_json::from_str(&contents)
                .map_err(|err| StoreError::Corrupt {
                    reason: format!("{:?}: {}", self.path, err),
                })
                .inspect_err(|err| log_store_error(err, "JsonFileSummaryStore::records")),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }
}
