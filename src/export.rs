//! JSON export of a processed run

use crate::error::Result;
use crate::signals::CrossoverContext;
use crate::types::{ProcessedRow, SignalEvent, Symbol};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Run summary carried alongside the rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportNotes {
    pub rows: usize,
    pub min_sma_days: usize,
    pub data_source: String,
    pub short_history: bool,
    pub event_contexts: Vec<CrossoverContext>,
}

/// Everything written to the per-ticker JSON file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportPayload {
    pub ticker: Symbol,
    pub generated_at: DateTime<Utc>,
    pub metrics: Vec<ProcessedRow>,
    pub signals: Vec<SignalEvent>,
    pub notes: ExportNotes,
}

impl ExportPayload {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write pretty JSON to `path`, creating parent directories
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, self.to_json()?)?;
        log::info!("{}: wrote export to {}", self.ticker, path.display());
        Ok(())
    }

    pub fn read_json(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}
