//! Persists completed analyses as pretty-printed JSON, one file per record.

use std::fs;
use std::path::{Path, PathBuf};

use crate::analysis::AnalysisRecord;
use crate::error::AppError;

pub struct AnalysisStore {
    dir: PathBuf,
}

impl AnalysisStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Write a record to `{UTC-timestamp}_{id}.json` and return the path.
    /// The id is a fresh UUID, so rapid repeated requests cannot collide.
    pub fn save(&self, record: &AnalysisRecord) -> Result<PathBuf, AppError> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            AppError::Persistence(format!("Failed to create {}: {e}", self.dir.display()))
        })?;

        let name = format!(
            "{}_{}.json",
            record.created_at.format("%Y%m%dT%H%M%SZ"),
            record.id
        );
        let path = self.dir.join(name);

        let json = serde_json::to_string_pretty(record)
            .map_err(|e| AppError::Persistence(format!("Failed to serialize record: {e}")))?;
        fs::write(&path, json)
            .map_err(|e| AppError::Persistence(format!("Failed to write {}: {e}", path.display())))?;

        Ok(path)
    }

    /// Read a persisted record back from disk.
    pub fn load(path: &Path) -> Result<AnalysisRecord, AppError> {
        let text = fs::read_to_string(path)
            .map_err(|e| AppError::Persistence(format!("Failed to read {}: {e}", path.display())))?;
        serde_json::from_str(&text)
            .map_err(|e| AppError::Persistence(format!("Failed to parse {}: {e}", path.display())))
    }
}
