//! Incremental retrieval of the CMS provider-data catalog.
//!
//! A run loads the last-run watermark, filters the remote catalog for
//! entries of one category modified since then, downloads each selected
//! CSV on a small worker pool, rewrites its headers to snake-case slugs and
//! stores it in the output directory.

pub mod batch;
pub mod catalog;
pub mod config;
pub mod error;
pub mod fetch;
pub mod slug;
pub mod watermark;

pub use batch::{run, RunReport, RunState};
pub use config::{Config, WatermarkPolicy};
pub use error::{EtlError, Result};
