use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rayon::ThreadPoolBuilder;
use reqwest::blocking::Client;
use tracing::{debug, error, info, warn};

use crate::catalog::{fetch_catalog, select, SelectedItem};
use crate::config::{Config, WatermarkPolicy};
use crate::error::Result;
use crate::fetch::{process, ItemOutcome};
use crate::watermark::WatermarkStore;

/// Where a run is, or where it ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
  NotStarted,
  CatalogFetched,
  ItemsSelected,
  Dispatched,
  Completed,
  Skipped,
  Failed,
}

impl fmt::Display for RunState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      RunState::NotStarted => "NOT_STARTED",
      RunState::CatalogFetched => "CATALOG_FETCHED",
      RunState::ItemsSelected => "ITEMS_SELECTED",
      RunState::Dispatched => "DISPATCHED",
      RunState::Completed => "COMPLETED",
      RunState::Skipped => "SKIPPED",
      RunState::Failed => "FAILED",
    };
    f.write_str(name)
  }
}

/// Summary of a run that reached `Completed` or `Skipped`.
#[derive(Debug)]
pub struct RunReport {
  pub state: RunState,
  pub previous_watermark: DateTime<Utc>,
  /// The watermark written at the end of the run, `None` when skipped.
  pub watermark: Option<DateTime<Utc>>,
  pub outcomes: Vec<ItemOutcome>,
}

impl RunReport {
  pub fn selected(&self) -> usize {
    self.outcomes.len()
  }

  pub fn saved(&self) -> usize {
    self.outcomes.iter().filter(|o| o.is_saved()).count()
  }

  pub fn abandoned(&self) -> usize {
    self.selected() - self.saved()
  }
}

fn enter(state: RunState) -> RunState {
  debug!("run state -> {}", state);
  state
}

/// Runs one batch: load the watermark, fetch and filter the catalog,
/// process the selected items and advance the watermark. An `Err` is the
/// FAILED state; the stored watermark is untouched in that case.
pub fn run(config: &Config) -> Result<RunReport> {
  let started = Utc::now();
  let mut state = enter(RunState::NotStarted);
  info!("CMS {} ETL job started", config.keyword);

  let result = execute(config, started, &mut state);
  if let Err(e) = &result {
    error!("ETL job failed in {}: {}", state, e);
    enter(RunState::Failed);
  }
  result
}

fn execute(config: &Config, started: DateTime<Utc>, state: &mut RunState) -> Result<RunReport> {
  config.prepare()?;
  let store = WatermarkStore::new(config.metadata_path());
  let previous_watermark = store.load();
  debug!("last successful run: {}", previous_watermark);

  let client = config.http_client()?;
  let catalog = fetch_catalog(&client, &config.catalog_url)?;
  *state = enter(RunState::CatalogFetched);

  let items = select(&catalog, previous_watermark, &config.keyword);
  *state = enter(RunState::ItemsSelected);
  info!("Found {} new/updated {} datasets.", items.len(), config.keyword);

  if items.is_empty() {
    *state = enter(RunState::Skipped);
    info!("No updates found. Job skipped.");
    return Ok(RunReport {
      state: RunState::Skipped,
      previous_watermark,
      watermark: None,
      outcomes: Vec::new(),
    });
  }

  *state = enter(RunState::Dispatched);
  let outcomes = dispatch(config, items)?;

  let candidate = match config.watermark_policy {
    WatermarkPolicy::RunStart => started,
    WatermarkPolicy::Completion => Utc::now(),
  };
  let watermark = candidate.max(previous_watermark);
  store.save(watermark)?;
  *state = enter(RunState::Completed);

  let report = RunReport {
    state: RunState::Completed,
    previous_watermark,
    watermark: Some(watermark),
    outcomes,
  };
  for outcome in &report.outcomes {
    if let ItemOutcome::Abandoned { title, reason } = outcome {
      warn!(title = %title, error = %reason, "abandoned");
    }
  }
  info!(
    "ETL job completed: {} selected, {} saved, {} abandoned; watermark set to {}",
    report.selected(),
    report.saved(),
    report.abandoned(),
    watermark
  );
  Ok(report)
}

type WorkQueue = Mutex<std::iter::Enumerate<std::vec::IntoIter<SelectedItem>>>;

/// Processes every item on a pool of `config.workers` threads and waits for
/// all of them. Each worker owns one HTTP client and pulls the next pending
/// item whenever it is free, so a slow download only holds its own slot.
/// Outcomes come back in the order the items were given.
pub fn dispatch(config: &Config, items: Vec<SelectedItem>) -> Result<Vec<ItemOutcome>> {
  let workers = config.workers.clamp(1, items.len().max(1));
  let clients = (0..workers)
    .map(|_| config.http_client())
    .collect::<Result<Vec<_>>>()?;
  let queue: WorkQueue = Mutex::new(items.into_iter().enumerate());

  let pool = ThreadPoolBuilder::new()
    .num_threads(workers)
    .thread_name(|i| format!("etl-worker-{}", i))
    .build()?;

  let per_worker = pool.broadcast(|ctx| {
    let worker = ctx.index();
    drain(&clients[worker], config, worker, &queue)
  });

  let mut outcomes: Vec<(usize, ItemOutcome)> = per_worker.into_iter().flatten().collect();
  outcomes.sort_by_key(|(index, _)| *index);
  Ok(outcomes.into_iter().map(|(_, outcome)| outcome).collect())
}

fn drain(client: &Client, config: &Config, worker: usize, queue: &WorkQueue) -> Vec<(usize, ItemOutcome)> {
  let mut done = Vec::new();
  loop {
    let next = queue.lock().next();
    let Some((index, item)) = next else {
      break;
    };
    done.push((index, process(client, config, worker, item)));
  }
  debug!(worker, processed = done.len(), "worker drained the queue");
  done
}
