//! Read-only facade over the store: enumeration, search, lookup, and the
//! composed aggregate statistics.

use std::sync::Arc;

use arkiv_db::Archive;
use arkiv_types::{ArchivedMessage, Stats};
use chrono::{Datelike, NaiveDate, Utc};

use crate::error::EngineError;

pub struct QueryService {
    store: Arc<Archive>,
}

impl QueryService {
    pub fn new(store: Arc<Archive>) -> Self {
        Self { store }
    }

    pub fn stats(&self) -> Result<Stats, EngineError> {
        let today = Utc::now().date_naive();

        let total_messages = self.store.count().map_err(EngineError::Storage)?;
        let today_count = self
            .store
            .count_for_day(today.year(), today.month(), today.day())
            .map_err(EngineError::Storage)?;
        let this_month = self
            .store
            .count_for_month(today.year(), today.month())
            .map_err(EngineError::Storage)?;
        let media_counts = self
            .store
            .media_histogram()
            .map_err(EngineError::Storage)?
            .into_iter()
            .collect();
        let (views, forwards, replies) =
            self.store.engagement_totals().map_err(EngineError::Storage)?;
        let latest = self.store.latest_date().map_err(EngineError::Storage)?;
        let db_size_bytes = self.store.size_on_disk().map_err(EngineError::Storage)?;

        Ok(Stats {
            total_messages,
            today: today_count,
            this_month,
            media_counts,
            views,
            forwards,
            replies,
            latest,
            db_size_bytes,
        })
    }

    pub fn list_years(&self) -> Result<Vec<(i32, u64)>, EngineError> {
        self.store.list_years().map_err(EngineError::Storage)
    }

    pub fn list_months(&self, year: i32) -> Result<Vec<(u32, u64)>, EngineError> {
        self.store.list_months(year).map_err(EngineError::Storage)
    }

    pub fn list_days(&self, year: i32, month: u32) -> Result<Vec<(u32, u64)>, EngineError> {
        self.store.list_days(year, month).map_err(EngineError::Storage)
    }

    pub fn search(
        &self,
        term: &str,
        limit: usize,
    ) -> Result<(Vec<ArchivedMessage>, bool), EngineError> {
        self.store
            .search_content(term, limit)
            .map_err(EngineError::Storage)
    }

    pub fn find_by_message_id(
        &self,
        message_id: i64,
    ) -> Result<Option<ArchivedMessage>, EngineError> {
        self.store
            .find_by_message_id(message_id)
            .map_err(EngineError::Storage)
    }

    /// The ordered day partition, oldest first.
    pub fn messages_for_day(&self, date: NaiveDate) -> Result<Vec<ArchivedMessage>, EngineError> {
        self.store
            .messages_for_day(date.year(), date.month(), date.day())
            .map_err(EngineError::Storage)
    }
}
