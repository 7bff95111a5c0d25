/// This script is meant to be ran periodically, ideally once a day after the
/// CMS provider-data metastore refreshes. Each invocation runs exactly one
/// batch: only datasets modified since the last successful run are fetched.
///
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cms_etl::config::{
  CMS_CATALOG_URL, DEFAULT_KEYWORD, DEFAULT_OUTPUT_DIR, DEFAULT_TIMEOUT_SECS, DEFAULT_WORKERS,
  USER_AGENT,
};
use cms_etl::{run, Config, RunReport, WatermarkPolicy};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum WatermarkAt {
  /// Record the instant the run started
  RunStart,
  /// Record the instant the batch finished
  Completion,
}

impl From<WatermarkAt> for WatermarkPolicy {
  fn from(at: WatermarkAt) -> Self {
    match at {
      WatermarkAt::RunStart => WatermarkPolicy::RunStart,
      WatermarkAt::Completion => WatermarkPolicy::Completion,
    }
  }
}

#[derive(Debug, Parser)]
#[command(name = "cron_update")]
#[command(about = "Fetch CMS provider datasets modified since the last successful run")]
struct Cli {
  /// Directory for the normalized CSVs and the last-run metadata file
  #[arg(long, env = "OUTPUT_DIR", default_value = DEFAULT_OUTPUT_DIR)]
  output_dir: PathBuf,

  /// Metastore endpoint listing every dataset
  #[arg(long, env = "CMS_CATALOG_URL", default_value = CMS_CATALOG_URL)]
  catalog_url: String,

  /// Case-insensitive keyword a dataset title must contain
  #[arg(long, default_value = DEFAULT_KEYWORD)]
  keyword: String,

  /// Number of concurrent download workers
  #[arg(long, default_value_t = DEFAULT_WORKERS)]
  workers: usize,

  /// Per-request timeout in seconds, 0 to disable
  #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
  timeout: u64,

  /// Which instant becomes the new watermark
  #[arg(long, value_enum, default_value = "run-start")]
  watermark_at: WatermarkAt,
}

impl Cli {
  fn into_config(self) -> anyhow::Result<Config> {
    anyhow::ensure!(self.workers > 0, "--workers must be at least 1");
    let catalog_url = reqwest::Url::parse(&self.catalog_url)
      .with_context(|| format!("invalid catalog URL {:?}", self.catalog_url))?;
    Ok(Config {
      catalog_url: catalog_url.into(),
      output_dir: self.output_dir,
      keyword: self.keyword,
      workers: self.workers,
      timeout: (self.timeout > 0).then(|| Duration::from_secs(self.timeout)),
      user_agent: USER_AGENT.to_string(),
      watermark_policy: self.watermark_at.into(),
    })
  }
}

fn init_tracing() {
  let filter = tracing_subscriber::EnvFilter::new(
    std::env::var("RUST_LOG").unwrap_or_else(|_| "cms_etl=info,cron_update=info".into()),
  );
  tracing_subscriber::registry()
    .with(filter)
    .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
    .init();
}

pub fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing();

  let config = match cli.into_config() {
    Ok(config) => config,
    Err(e) => {
      error!("{:#}", e);
      return ExitCode::FAILURE;
    }
  };

  finish(run(&config))
}

/// A failed run is logged with its cause chain but still exits cleanly; only
/// errors before a run starts produce a non-zero status.
fn finish(result: cms_etl::Result<RunReport>) -> ExitCode {
  if let Err(e) = result {
    let e = anyhow::Error::new(e).context("ETL job failed");
    error!("{:?}", e);
  }
  ExitCode::SUCCESS
}
