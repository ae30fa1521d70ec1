//! Caller-facing error taxonomy (§7).
//!
//! Read APIs never return `NotFound` as an `Err` — a miss is an empty
//! result (§7 "Surfaced as an empty/miss result, not an error, on read
//! APIs"). `LciError` exists for the operations that genuinely need to
//! signal failure to a caller: writers on a closed store, malformed
//! glob/regex input, and internal faults that a per-file failure
//! recovered from but that are still worth surfacing in aggregate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LciError {
    /// FileID unknown, pattern too short, symbol absent. Most APIs avoid
    /// returning this and instead return an empty collection; it exists
    /// for call sites where "not found" must be distinguished from "empty
    /// but valid query" (e.g. resolving a single FileID to a record).
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed glob, malformed regex, unsupported search type.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The content store's writer has shut down.
    #[error("store is closed")]
    Closed,

    /// Bucket-lock poisoning, parser failure, or any other fault a
    /// component recovered from locally but must still report.
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, LciError>;

impl From<regex::Error> for LciError {
    fn from(err: regex::Error) -> Self {
        LciError::InvalidInput(format!("invalid regex: {err}"))
    }
}

impl LciError {
    pub fn internal(context: impl std::fmt::Display) -> Self {
        LciError::Internal(context.to_string())
    }
}
