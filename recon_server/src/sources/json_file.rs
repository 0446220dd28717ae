use std::{io::ErrorKind, path::PathBuf};

use chrono::{DateTime, Utc};
use log::*;
use recon_engine::ledger::{LedgerRecord, LedgerSource, LedgerSourceError};

/// Reads ledger records from a JSON file holding an array of records.
///
/// The file is re-read on every fetch. A missing or half-written file is treated as a transient failure, since the
/// collector may be replacing it; a file the process may not read is an authentication failure.
#[derive(Debug, Clone)]
pub struct FileLedgerSource {
    path: PathBuf,
}

impl FileLedgerSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl LedgerSource for FileLedgerSource {
    async fn fetch_entries(&self, since: DateTime<Utc>) -> Result<Vec<LedgerRecord>, LedgerSourceError> {
        let contents = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            let msg = format!("Could not read {}. {e}", self.path.display());
            match e.kind() {
                ErrorKind::PermissionDenied => LedgerSourceError::Authentication(msg),
                _ => LedgerSourceError::Transient(msg),
            }
        })?;
        let raw = serde_json::from_str::<Vec<serde_json::Value>>(&contents).map_err(|e| {
            LedgerSourceError::Transient(format!("{} is not a valid ledger export. {e}", self.path.display()))
        })?;
        let total = raw.len();
        let records = raw.into_iter().enumerate().filter_map(|(i, value)| parse_record(i, value)).collect::<Vec<_>>();
        let records = records.into_iter().filter(|r| r.occurred_at >= since).collect::<Vec<_>>();
        trace!("📡️ {} of {total} records in {} are newer than {since}", records.len(), self.path.display());
        Ok(records)
    }
}

/// One bad record must not hold up the rest of the export, so it is logged and skipped.
fn parse_record(index: usize, value: serde_json::Value) -> Option<LedgerRecord> {
    let identifier = value.get("identifier").and_then(|v| v.as_str()).unwrap_or("<no identifier>").to_string();
    match serde_json::from_value::<LedgerRecord>(value) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!("📡️ Skipping ledger record #{index} ({identifier}). {e}");
            None
        },
    }
}
