use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EtlError>;

#[derive(Debug, Error)]
pub enum EtlError {
  #[error("HTTP request failed: {0}")]
  Http(#[from] reqwest::Error),

  #[error("GET {url} returned {status}")]
  Status {
    url: String,
    status: reqwest::StatusCode,
  },

  #[error("invalid JSON: {0}")]
  Json(#[from] serde_json::Error),

  #[error("malformed CSV payload: {0}")]
  Csv(#[from] csv::Error),

  #[error("{}: {source}", .path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("{url} returned no header row")]
  EmptyPayload { url: String },

  #[error("unrecognised timestamp {0:?}")]
  Timestamp(String),

  #[error("could not start worker pool: {0}")]
  WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

impl EtlError {
  pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    EtlError::Io {
      path: path.into(),
      source,
    }
  }
}
