//! Live and backfill ingestion. Both entry points funnel through the same
//! normalize -> upsert path; per-record failures are logged and skipped so a
//! bad record never takes down a batch.

use std::sync::Arc;
use std::time::Duration;

use arkiv_db::Archive;
use arkiv_types::RawMessage;
use chrono::{NaiveDate, NaiveTime, Utc};
use futures_util::StreamExt;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::EngineError;
use crate::normalize::normalize;
use crate::source::ChannelSource;

/// How often a running backfill publishes its stored-record count.
const PROGRESS_EVERY: u64 = 100;

/// Consecutive history failures tolerated before a backfill gives up.
const MAX_SOURCE_RETRIES: u32 = 5;

/// Outcome of a backfill run. `stored` counts successful upserts only;
/// cancellation keeps everything stored so far.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BackfillReport {
    pub stored: u64,
    pub malformed: u64,
    pub failed: u64,
    pub cancelled: bool,
}

pub struct Ingestor {
    store: Arc<Archive>,
    source: Arc<dyn ChannelSource>,
    channel_id: i64,
    cancel: watch::Sender<bool>,
    progress: watch::Sender<u64>,
}

impl Ingestor {
    pub fn new(store: Arc<Archive>, source: Arc<dyn ChannelSource>, channel_id: i64) -> Self {
        let (progress, _) = watch::channel(0);
        let (cancel, _) = watch::channel(false);
        Self {
            store,
            source,
            channel_id,
            cancel,
            progress,
        }
    }

    /// Watch the stored-record count of the running backfill.
    pub fn progress(&self) -> watch::Receiver<u64> {
        self.progress.subscribe()
    }

    /// Ask the running backfill to stop. Cooperative — the record in flight
    /// completes and stays stored; a walk parked on a stalled source wakes
    /// up and stops too.
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    /// Normalize and store a single record. Shared by both modes; this is
    /// also the live entry point for callers holding one record.
    pub async fn ingest_one(&self, raw: RawMessage) -> Result<(), EngineError> {
        let msg = normalize(&raw, Utc::now())?;
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.upsert(&msg))
            .await
            .map_err(|e| EngineError::Storage(anyhow::anyhow!("storage task panicked: {}", e)))?
            .map_err(EngineError::Storage)?;
        Ok(())
    }

    /// Consume the live subscription. Never returns under normal operation:
    /// when the feed closes, resubscribes with exponential backoff.
    pub async fn run_live(&self) {
        let mut backoff = Duration::from_secs(1);
        loop {
            let mut feed = self.source.subscribe(self.channel_id);
            info!(channel = self.channel_id, "live subscription open");

            while let Some(raw) = feed.recv().await {
                backoff = Duration::from_secs(1);
                let id = raw.id;
                match self.ingest_one(raw).await {
                    Ok(()) => info!(message = id, "archived live record"),
                    Err(e) => warn!(message = id, error = %e, "skipping live record"),
                }
            }

            warn!(
                channel = self.channel_id,
                "live subscription closed, resubscribing in {:?}", backoff
            );
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(Duration::from_secs(60));
        }
    }

    /// Backfill every record dated within `[start, end]`, walking the
    /// source's history newest-first from just past `end` and stopping at the
    /// first record older than `start`. Long-running; callers spawn it beside
    /// the live loop and may cancel it at any point.
    pub async fn ingest_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BackfillReport, EngineError> {
        let _ = self.cancel.send(false);
        let mut cancel_rx = self.cancel.subscribe();
        let _ = self.progress.send(0);

        let mut offset = end
            .succ_opt()
            .unwrap_or(NaiveDate::MAX)
            .and_time(NaiveTime::MIN)
            .and_utc();
        let mut report = BackfillReport::default();
        let mut retries = 0u32;
        let mut backoff = Duration::from_secs(1);

        info!(%start, %end, "backfill started");

        'walk: loop {
            let mut history = self.source.history(self.channel_id, offset);

            loop {
                if *cancel_rx.borrow_and_update() {
                    report.cancelled = true;
                    info!(stored = report.stored, "backfill cancelled");
                    break 'walk;
                }

                let item = tokio::select! {
                    _ = cancel_rx.changed() => {
                        report.cancelled = true;
                        info!(stored = report.stored, "backfill cancelled");
                        break 'walk;
                    }
                    item = history.next() => item,
                };
                let raw = match item {
                    None => break 'walk,
                    Some(Ok(raw)) => raw,
                    Some(Err(e)) => {
                        retries += 1;
                        if retries > MAX_SOURCE_RETRIES {
                            return Err(EngineError::Source(e.to_string()));
                        }
                        warn!(
                            error = %e,
                            retry = retries,
                            "history stream failed, restarting in {:?}", backoff
                        );
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(Duration::from_secs(60));
                        // Restart the iterator from the last record we saw.
                        continue 'walk;
                    }
                };
                retries = 0;

                let Some(date) = raw.date else {
                    report.malformed += 1;
                    warn!(message = raw.id, "skipping undated record");
                    continue;
                };
                let day = date.date_naive();
                if day < start {
                    break 'walk;
                }
                offset = date;
                if day > end {
                    // Sources may over-deliver around the offset; not ours.
                    continue;
                }

                match self.ingest_one(raw).await {
                    Ok(()) => {
                        report.stored += 1;
                        if report.stored % PROGRESS_EVERY == 0 {
                            let _ = self.progress.send(report.stored);
                            info!(stored = report.stored, "backfill progress");
                        }
                    }
                    Err(EngineError::Malformed(e)) => {
                        report.malformed += 1;
                        warn!(error = %e, "skipping malformed record");
                    }
                    Err(e) => {
                        report.failed += 1;
                        warn!(error = %e, "skipping record after write failure");
                    }
                }
            }
        }

        let _ = self.progress.send(report.stored);
        info!(
            stored = report.stored,
            malformed = report.malformed,
            failed = report.failed,
            cancelled = report.cancelled,
            "backfill finished"
        );
        Ok(report)
    }
}
