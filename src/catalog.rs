use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{EtlError, Result};

/// One dataset descriptor from the metastore listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogEntry {
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub modified: String,
  #[serde(default)]
  pub distribution: Vec<Distribution>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Distribution {
  #[serde(rename = "downloadURL", default)]
  pub download_url: Option<String>,
}

impl CatalogEntry {
  /// The first non-empty download link, if any.
  pub fn download_url(&self) -> Option<&str> {
    self
      .distribution
      .iter()
      .filter_map(|d| d.download_url.as_deref())
      .find(|url| !url.is_empty())
  }
}

/// A catalog entry that passed the category and recency filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedItem {
  pub title: String,
  pub csv_url: String,
  pub modified: DateTime<Utc>,
}

pub fn fetch_catalog(client: &Client, url: &str) -> Result<Vec<CatalogEntry>> {
  let resp = client.get(url).send()?;
  let status = resp.status();
  if !status.is_success() {
    return Err(EtlError::Status {
      url: url.to_string(),
      status,
    });
  }
  let body = resp.bytes()?;
  let entries: Vec<CatalogEntry> = serde_json::from_slice(&body)?;
  debug!("catalog lists {} datasets", entries.len());
  Ok(entries)
}

/// Parses an ISO-8601 instant. Offsets (including a literal `Z`) are
/// honoured; date-times and bare dates without one are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
  let raw = raw.trim();
  if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
    return Some(at.with_timezone(&Utc));
  }
  if let Ok(naive) = raw.parse::<NaiveDateTime>() {
    return Some(naive.and_utc());
  }
  NaiveDate::parse_from_str(raw, "%Y-%m-%d")
    .ok()
    .and_then(|day| day.and_hms_opt(0, 0, 0))
    .map(|naive| naive.and_utc())
}

/// Entries whose title mentions `keyword` (case-insensitively), that carry a
/// download link and were modified strictly after `watermark`. Catalog order
/// is kept and duplicate titles are not collapsed.
pub fn select(
  catalog: &[CatalogEntry],
  watermark: DateTime<Utc>,
  keyword: &str,
) -> Vec<SelectedItem> {
  let keyword = keyword.to_lowercase();
  let mut selected = Vec::new();
  for entry in catalog {
    if !entry.title.to_lowercase().contains(&keyword) {
      continue;
    }
    let Some(csv_url) = entry.download_url() else {
      continue;
    };
    let Some(modified) = parse_timestamp(&entry.modified) else {
      warn!(
        "skipping dataset '{}' due to invalid modified date {:?}",
        entry.title, entry.modified
      );
      continue;
    };
    if modified > watermark {
      selected.push(SelectedItem {
        title: entry.title.clone(),
        csv_url: csv_url.to_string(),
        modified,
      });
    }
  }
  selected
}
