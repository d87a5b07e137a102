use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum FetchError {
    #[error("JGI_TOKEN is not set; export a session token before running")]
    MissingToken,

    #[error("invalid setting: {0}")]
    InvalidSetting(String),

    #[error("failed to read query batch at {0}")]
    QueryBatchRead(PathBuf),

    #[error("failed to parse query batch: {0}")]
    QueryBatchParse(String),

    #[error("query batch has no valid rows (expected name,search_url)")]
    EmptyQueryBatch,

    #[error("invalid query name: {0}")]
    InvalidQueryName(String),

    #[error("invalid glob pattern: {0}")]
    InvalidGlob(String),

    #[error("archive protocol error: {0}")]
    Protocol(String),

    #[error("restore request expired before it became ready (resubmit the restore): {status_url}")]
    RestoreExpired { status_url: String },

    #[error("timed out waiting for restore after {waited_secs}s (max {max_wait_secs}s)")]
    RestoreTimeout { waited_secs: u64, max_wait_secs: u64 },

    #[error("archive request failed: {0}")]
    Http(String),

    #[error("archive returned status {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl FetchError {
    /// True for errors that must stop the whole run rather than one query.
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(
            self,
            FetchError::MissingToken
                | FetchError::InvalidSetting(_)
                | FetchError::QueryBatchRead(_)
                | FetchError::QueryBatchParse(_)
                | FetchError::EmptyQueryBatch
                | FetchError::InvalidGlob(_)
        )
    }
}
