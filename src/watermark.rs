use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::catalog::parse_timestamp;
use crate::error::{EtlError, Result};

#[derive(Debug, Serialize, Deserialize)]
struct LastRun {
  last_run: String,
}

/// The single "last successful run" instant, kept as a small JSON file.
#[derive(Debug, Clone)]
pub struct WatermarkStore {
  path: PathBuf,
}

impl WatermarkStore {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    WatermarkStore { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// The stored watermark, or the minimum instant if there is none.
  /// A missing or unreadable file never stops a run from starting.
  pub fn load(&self) -> DateTime<Utc> {
    match self.try_load() {
      Ok(Some(at)) => at,
      Ok(None) => {
        debug!("no watermark at {}, treating as first run", self.path.display());
        DateTime::<Utc>::MIN_UTC
      }
      Err(e) => {
        warn!("ignoring unreadable watermark: {}", e);
        DateTime::<Utc>::MIN_UTC
      }
    }
  }

  fn try_load(&self) -> Result<Option<DateTime<Utc>>> {
    let raw = match fs::read_to_string(&self.path) {
      Ok(raw) => raw,
      Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(EtlError::io(&self.path, e)),
    };
    let stored: LastRun = serde_json::from_str(&raw)?;
    parse_timestamp(&stored.last_run)
      .map(Some)
      .ok_or(EtlError::Timestamp(stored.last_run))
  }

  /// Overwrites the stored watermark with `now`.
  pub fn save(&self, now: DateTime<Utc>) -> Result<()> {
    let record = LastRun {
      last_run: now.to_rfc3339_opts(SecondsFormat::AutoSi, true),
    };
    let payload = serde_json::to_string(&record)?;
    fs::write(&self.path, payload).map_err(|e| EtlError::io(&self.path, e))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn store_in(dir: &tempfile::TempDir) -> WatermarkStore {
    WatermarkStore::new(dir.path().join("metadata_last_update.json"))
  }

  #[test]
  fn missing_file_is_minimum() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(store_in(&dir).load(), DateTime::<Utc>::MIN_UTC);
  }

  #[test]
  fn corrupt_file_is_minimum() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    fs::write(store.path(), "{not json").unwrap();
    assert_eq!(store.load(), DateTime::<Utc>::MIN_UTC);

    fs::write(store.path(), r#"{"last_run": "yesterday"}"#).unwrap();
    assert_eq!(store.load(), DateTime::<Utc>::MIN_UTC);
  }

  #[test]
  fn save_then_load() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    let at = Utc.with_ymd_and_hms(2024, 6, 1, 12, 30, 0).unwrap();
    store.save(at).unwrap();
    assert_eq!(store.load(), at);

    let later = Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap();
    store.save(later).unwrap();
    assert_eq!(store.load(), later);
  }

  #[test]
  fn accepts_naive_timestamps() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    fs::write(store.path(), r#"{"last_run": "2024-05-01T08:15:30.250000"}"#).unwrap();
    let expected = Utc.with_ymd_and_hms(2024, 5, 1, 8, 15, 30).unwrap()
      + chrono::Duration::milliseconds(250);
    assert_eq!(store.load(), expected);
  }
}
