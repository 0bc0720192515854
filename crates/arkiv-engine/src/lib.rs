//! Archive engine: ingestion, storage, browsing, search and export for a
//! single source channel. The [`Engine`] facade wires the pieces together;
//! every dependency is injected through [`Config`] and the optional
//! [`ChannelSource`] — there are no process-wide globals.

pub mod browse;
pub mod config;
pub mod error;
pub mod export;
pub mod ingest;
pub mod normalize;
pub mod query;
pub mod source;

use std::sync::Arc;

use anyhow::Context;
use arkiv_db::Archive;
use arkiv_types::{ArchivedMessage, BrowseView, RawMessage, Stats};
use chrono::NaiveDate;
use tokio::sync::watch;

pub use crate::browse::Browser;
pub use crate::config::Config;
pub use crate::error::EngineError;
pub use crate::export::Exporter;
pub use crate::ingest::{BackfillReport, Ingestor};
pub use crate::query::QueryService;
pub use crate::source::{ChannelSource, MemorySource, SourceError};

/// Search results are capped at this many records; the flag in the result
/// tells the caller whether more matches exist.
pub const SEARCH_LIMIT: usize = 20;

pub struct Engine {
    store: Arc<Archive>,
    queries: QueryService,
    browser: Browser,
    exporter: Exporter,
    ingestor: Option<Arc<Ingestor>>,
}

impl Engine {
    /// Open the engine without a source attached: every read, browse and
    /// export operation works; ingestion reports the source as unavailable.
    pub fn open(config: &Config) -> anyhow::Result<Self> {
        let store = Arc::new(
            Archive::open(&config.db_path, &config.archive_dir)
                .context("opening archive store")?,
        );

        let source_label = config
            .source_channel
            .map(|id| id.to_string())
            .unwrap_or_else(|| "unknown".into());

        Ok(Self {
            queries: QueryService::new(Arc::clone(&store)),
            browser: Browser::new(Arc::clone(&store)),
            exporter: Exporter::new(Arc::clone(&store), &config.export_dir, source_label)?,
            store,
            ingestor: None,
        })
    }

    /// Open the engine and attach the source-channel client. Requires
    /// `config.source_channel` to know which channel to follow.
    pub fn with_source(
        config: &Config,
        source: Arc<dyn ChannelSource>,
    ) -> anyhow::Result<Self> {
        let channel_id = config
            .source_channel
            .context("source_channel is required when attaching a source client")?;

        let mut engine = Self::open(config)?;
        engine.ingestor = Some(Arc::new(Ingestor::new(
            Arc::clone(&engine.store),
            source,
            channel_id,
        )));
        Ok(engine)
    }

    fn ingestor(&self) -> Result<&Arc<Ingestor>, EngineError> {
        self.ingestor
            .as_ref()
            .ok_or_else(|| EngineError::Source("no source channel attached".into()))
    }

    // -- Ingestion --

    /// Archive one live record.
    pub async fn ingest_live(&self, raw: RawMessage) -> Result<(), EngineError> {
        self.ingestor()?.ingest_one(raw).await
    }

    /// Run the live subscription loop. Does not return while the source
    /// stays reachable; callers spawn it.
    pub async fn run_live(&self) -> Result<(), EngineError> {
        self.ingestor()?.run_live().await;
        Ok(())
    }

    /// Backfill the inclusive date range, returning what was stored.
    pub async fn ingest_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BackfillReport, EngineError> {
        self.ingestor()?.ingest_range(start, end).await
    }

    /// Cooperatively stop a running backfill.
    pub fn cancel_backfill(&self) -> Result<(), EngineError> {
        self.ingestor()?.cancel();
        Ok(())
    }

    /// Stored-record counter of the running backfill.
    pub fn backfill_progress(&self) -> Result<watch::Receiver<u64>, EngineError> {
        Ok(self.ingestor()?.progress())
    }

    // -- Queries --

    pub fn stats(&self) -> Result<Stats, EngineError> {
        self.queries.stats()
    }

    pub fn list_years(&self) -> Result<Vec<(i32, u64)>, EngineError> {
        self.queries.list_years()
    }

    pub fn list_months(&self, year: i32) -> Result<Vec<(u32, u64)>, EngineError> {
        self.queries.list_months(year)
    }

    pub fn list_days(&self, year: i32, month: u32) -> Result<Vec<(u32, u64)>, EngineError> {
        self.queries.list_days(year, month)
    }

    pub fn search(&self, term: &str) -> Result<(Vec<ArchivedMessage>, bool), EngineError> {
        self.queries.search(term, SEARCH_LIMIT)
    }

    pub fn find_by_message_id(
        &self,
        message_id: i64,
    ) -> Result<Option<ArchivedMessage>, EngineError> {
        self.queries.find_by_message_id(message_id)
    }

    pub fn messages_for_day(&self, date: NaiveDate) -> Result<Vec<ArchivedMessage>, EngineError> {
        self.queries.messages_for_day(date)
    }

    // -- Browsing --

    pub fn open_day(
        &self,
        user_id: i64,
        year: i32,
        month: u32,
        day: u32,
    ) -> Result<BrowseView, EngineError> {
        self.browser.open_day(user_id, year, month, day)
    }

    pub fn next(&self, user_id: i64) -> Result<BrowseView, EngineError> {
        self.browser.next(user_id)
    }

    pub fn previous(&self, user_id: i64) -> Result<BrowseView, EngineError> {
        self.browser.previous(user_id)
    }

    // -- Export & maintenance --

    pub fn export_day(&self, date: NaiveDate) -> Result<std::path::PathBuf, EngineError> {
        self.exporter.export_day(date)
    }

    /// Regenerate the derived day-document tree from the table.
    pub fn rebuild_day_tree(&self) -> Result<usize, EngineError> {
        self.store.rebuild_day_tree().map_err(EngineError::Storage)
    }
}
