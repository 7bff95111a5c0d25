use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::Client;

use crate::error::{EtlError, Result};
use crate::slug::slugify;

pub const CMS_CATALOG_URL: &str =
  "https://data.cms.gov/provider-data/api/1/metastore/schemas/dataset/items";
pub const DEFAULT_OUTPUT_DIR: &str = "processed_csvs_output";
pub const METADATA_FILENAME: &str = "metadata_last_update.json";
pub const DEFAULT_KEYWORD: &str = "hospital";
pub const DEFAULT_WORKERS: usize = 5;
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
pub const USER_AGENT: &str = concat!("cms-etl/", env!("CARGO_PKG_VERSION"));

/// Which instant becomes the new watermark after a completed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatermarkPolicy {
  /// The instant the run started. Entries modified while the batch was in
  /// flight are picked up again next run.
  #[default]
  RunStart,
  /// The instant the batch finished, as the original cron job recorded it.
  /// Entries modified during the run can be missed by later runs.
  Completion,
}

/// Everything a run needs, resolved once at process start.
#[derive(Debug, Clone)]
pub struct Config {
  pub catalog_url: String,
  pub output_dir: PathBuf,
  pub keyword: String,
  pub workers: usize,
  pub timeout: Option<Duration>,
  pub user_agent: String,
  pub watermark_policy: WatermarkPolicy,
}

impl Default for Config {
  fn default() -> Self {
    Config {
      catalog_url: CMS_CATALOG_URL.to_string(),
      output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
      keyword: DEFAULT_KEYWORD.to_string(),
      workers: DEFAULT_WORKERS,
      timeout: Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
      user_agent: USER_AGENT.to_string(),
      watermark_policy: WatermarkPolicy::default(),
    }
  }
}

impl Config {
  pub fn new(output_dir: impl Into<PathBuf>) -> Self {
    Config {
      output_dir: output_dir.into(),
      ..Config::default()
    }
  }

  pub fn metadata_path(&self) -> PathBuf {
    self.output_dir.join(METADATA_FILENAME)
  }

  pub fn output_path(&self, title: &str) -> PathBuf {
    self.output_dir.join(format!("{}.csv", slugify(title)))
  }

  pub fn output_dir(&self) -> &Path {
    &self.output_dir
  }

  /// Creates the output directory if it is not there yet.
  pub fn prepare(&self) -> Result<()> {
    fs::create_dir_all(&self.output_dir).map_err(|e| EtlError::io(&self.output_dir, e))
  }

  pub fn http_client(&self) -> Result<Client> {
    let mut builder = Client::builder().user_agent(self.user_agent.as_str());
    if let Some(timeout) = self.timeout {
      builder = builder.timeout(timeout);
    }
    Ok(builder.build()?)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn derived_paths_live_in_output_dir() {
    let config = Config::new("/tmp/cms");
    assert_eq!(
      config.metadata_path(),
      PathBuf::from("/tmp/cms/metadata_last_update.json")
    );
    assert_eq!(
      config.output_path("Hospital General Information"),
      PathBuf::from("/tmp/cms/hospital_general_information.csv")
    );
  }

  #[test]
  fn defaults_match_the_cms_job() {
    let config = Config::default();
    assert_eq!(config.catalog_url, CMS_CATALOG_URL);
    assert_eq!(config.output_dir, PathBuf::from("processed_csvs_output"));
    assert_eq!(config.keyword, "hospital");
    assert_eq!(config.workers, 5);
    assert_eq!(config.watermark_policy, WatermarkPolicy::RunStart);
  }

  #[test]
  fn prepare_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::new(dir.path().join("nested").join("out"));
    config.prepare().unwrap();
    config.prepare().unwrap();
    assert!(config.output_dir().is_dir());
  }
}
