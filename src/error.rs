use std::io;
use std::time::Duration;
use thiserror::Error;

/// Failures of an external indexing-tool call.
///
/// Every variant is recoverable: callers log it and fall back to an empty
/// listing or an unresolved URL.
#[derive(Error, Debug)]
pub enum CatalogError {
  #[error("{0}")]
  ToolNotFound(String),

  #[error("{program} exited with {status}: {stderr}")]
  ProcessFailure { program: String, status: String, stderr: String },

  #[error("could not parse {what}: {reason}")]
  ParseFailure { what: &'static str, reason: String },

  #[error("{what} timed out after {}s", .after.as_secs())]
  Timeout { what: &'static str, after: Duration },

  #[error("I/O error: {0}")]
  Io(#[from] io::Error),
}

impl CatalogError {
  pub fn parse<E: std::fmt::Display>(what: &'static str, err: E) -> Self {
    CatalogError::ParseFailure { what, reason: err.to_string() }
  }
}

/// Failures of the on-disk config store.
#[derive(Error, Debug)]
pub enum StoreError {
  #[error("I/O error on {path}: {source}")]
  Io { path: String, source: io::Error },

  #[error("malformed JSON in {path}: {source}")]
  Json { path: String, source: serde_json::Error },

  #[error("invalid value for {key}: {reason}")]
  InvalidValue { key: String, reason: String },
}

impl StoreError {
  pub fn io(path: &std::path::Path, source: io::Error) -> Self {
    StoreError::Io { path: path.display().to_string(), source }
  }

  pub fn json(path: &std::path::Path, source: serde_json::Error) -> Self {
    StoreError::Json { path: path.display().to_string(), source }
  }
}
