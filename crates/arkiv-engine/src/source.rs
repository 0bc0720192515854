//! The seam to the external message source: a live subscription plus a
//! restartable historical iterator. The engine only ever sees this trait;
//! the real client (and the in-memory one below) live behind it.

use std::cmp::Reverse;
use std::sync::Mutex;

use arkiv_types::RawMessage;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source channel unavailable: {0}")]
    Unavailable(String),
}

pub trait ChannelSource: Send + Sync {
    /// Live feed of new records on a channel. The channel buffers, so slow
    /// ingestion never blocks the source's delivery side. A closed receiver
    /// means the subscription dropped; the pipeline resubscribes.
    fn subscribe(&self, channel_id: i64) -> mpsc::Receiver<RawMessage>;

    /// Historical records, newest first, starting strictly before `offset`.
    /// Finite per call and restartable with a new offset.
    fn history(
        &self,
        channel_id: i64,
        offset: DateTime<Utc>,
    ) -> BoxStream<'static, Result<RawMessage, SourceError>>;
}

/// In-memory source used by the test suite and local experiments.
pub struct MemorySource {
    records: Vec<RawMessage>,
    subscribers: Mutex<Vec<mpsc::Sender<RawMessage>>>,
}

impl MemorySource {
    pub fn new(records: Vec<RawMessage>) -> Self {
        Self {
            records,
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Deliver a record to every live subscriber, as the real client would
    /// on a new-message event.
    pub async fn push_live(&self, raw: RawMessage) {
        let senders: Vec<_> = self
            .subscribers
            .lock()
            .expect("subscriber lock poisoned")
            .clone();
        for tx in senders {
            let _ = tx.send(raw.clone()).await;
        }
    }

    /// Drop every live subscription (the receivers see a closed feed).
    pub fn disconnect(&self) {
        self.subscribers
            .lock()
            .expect("subscriber lock poisoned")
            .clear();
    }

    /// Number of live subscriptions currently held open.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .expect("subscriber lock poisoned")
            .len()
    }
}

impl ChannelSource for MemorySource {
    fn subscribe(&self, _channel_id: i64) -> mpsc::Receiver<RawMessage> {
        let (tx, rx) = mpsc::channel(256);
        self.subscribers
            .lock()
            .expect("subscriber lock poisoned")
            .push(tx);
        rx
    }

    fn history(
        &self,
        channel_id: i64,
        offset: DateTime<Utc>,
    ) -> BoxStream<'static, Result<RawMessage, SourceError>> {
        let mut records: Vec<RawMessage> = self
            .records
            .iter()
            .filter(|r| r.channel_id == channel_id)
            .filter(|r| r.date.is_none_or(|d| d < offset))
            .cloned()
            .collect();
        // Newest first; undated records sort last so the walk sees every
        // dated record before deciding it has passed the range.
        records.sort_by_key(|r| Reverse(r.date));

        Box::pin(futures_util::stream::iter(records.into_iter().map(Ok)))
    }
}
