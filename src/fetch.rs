use std::fs::File;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use reqwest::blocking::Client;
use tracing::{error, info};

use crate::catalog::SelectedItem;
use crate::config::Config;
use crate::error::{EtlError, Result};
use crate::slug::slugify;

/// What became of one selected item.
#[derive(Debug)]
pub enum ItemOutcome {
  Saved {
    title: String,
    path: PathBuf,
    rows: usize,
  },
  Abandoned {
    title: String,
    reason: EtlError,
  },
}

impl ItemOutcome {
  pub fn title(&self) -> &str {
    match self {
      ItemOutcome::Saved { title, .. } | ItemOutcome::Abandoned { title, .. } => title,
    }
  }

  pub fn is_saved(&self) -> bool {
    matches!(self, ItemOutcome::Saved { .. })
  }
}

/// A fully parsed CSV payload with slugified column labels.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTable {
  pub headers: StringRecord,
  pub records: Vec<StringRecord>,
}

impl NormalizedTable {
  pub fn write_to(&self, path: &Path) -> Result<()> {
    let file = File::create(path).map_err(|e| EtlError::io(path, e))?;
    let mut writer = WriterBuilder::new().from_writer(file);
    writer.write_record(&self.headers)?;
    for record in &self.records {
      writer.write_record(record)?;
    }
    writer.flush().map_err(|e| EtlError::io(path, e))
  }
}

/// Parses the whole payload before anything is written, so a malformed
/// table never leaves a partial file behind. Every row must have as many
/// fields as the header and the text must be valid UTF-8.
pub fn normalize_table(payload: &[u8]) -> std::result::Result<NormalizedTable, csv::Error> {
  let mut reader = ReaderBuilder::new().has_headers(true).from_reader(payload);
  let headers: StringRecord = reader.headers()?.iter().map(slugify).collect();
  let records = reader.records().collect::<std::result::Result<Vec<_>, _>>()?;
  Ok(NormalizedTable { headers, records })
}

/// Downloads, normalizes and stores one item. Failures abandon this item
/// only and are reported through the returned outcome.
pub fn process(client: &Client, config: &Config, worker: usize, item: SelectedItem) -> ItemOutcome {
  info!(worker, title = %item.title, "Downloading");
  match download_and_store(client, config, &item) {
    Ok((path, rows)) => {
      info!(worker, path = %path.display(), "Saved");
      ItemOutcome::Saved {
        title: item.title,
        path,
        rows,
      }
    }
    Err(reason) => {
      error!(worker, title = %item.title, error = %reason, "Error processing");
      ItemOutcome::Abandoned {
        title: item.title,
        reason,
      }
    }
  }
}

fn download_and_store(client: &Client, config: &Config, item: &SelectedItem) -> Result<(PathBuf, usize)> {
  let resp = client.get(&item.csv_url).send()?;
  let status = resp.status();
  if !status.is_success() {
    return Err(EtlError::Status {
      url: item.csv_url.clone(),
      status,
    });
  }
  let payload = resp.bytes()?;
  let table = normalize_table(&payload)?;
  if table.headers.is_empty() {
    return Err(EtlError::EmptyPayload {
      url: item.csv_url.clone(),
    });
  }
  let path = config.output_path(&item.title);
  table.write_to(&path)?;
  Ok((path, table.records.len()))
}
