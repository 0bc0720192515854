use chrono::NaiveDate;
use thiserror::Error;

use crate::normalize::NormalizeError;

/// Engine-level error taxonomy. Batch operations never surface `Malformed`
/// or `Storage` for a single record — those are logged, counted and skipped;
/// the variants exist for the single-record entry points.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Subscription or history connectivity lost. Retried with backoff at
    /// the ingestion boundary before it ever reaches a caller.
    #[error("source unavailable: {0}")]
    Source(String),

    /// The normalizer could not extract a usable identity or timestamp.
    #[error(transparent)]
    Malformed(#[from] NormalizeError),

    #[error("storage failure: {0}")]
    Storage(#[source] anyhow::Error),

    /// Navigation without an open browse session — the caller re-opens a day.
    #[error("no browse session for user {0}")]
    SessionNotFound(i64),

    #[error("no messages archived on {year:04}-{month:02}-{day:02}")]
    EmptyPartition { year: i32, month: u32, day: u32 },

    #[error("no messages to export for {0}")]
    EmptyRange(NaiveDate),
}
