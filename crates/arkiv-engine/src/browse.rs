//! Per-user pagination cursor over one day partition.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use arkiv_db::Archive;
use arkiv_types::{ArchivedMessage, BrowseView, Position};
use tracing::warn;

use crate::error::EngineError;

/// A user's cursor into a day partition. `total` is a snapshot taken when
/// the day was opened.
#[derive(Debug, Clone, Copy)]
struct BrowseSession {
    year: i32,
    month: u32,
    day: u32,
    index: usize,
    total: usize,
}

pub struct Browser {
    store: Arc<Archive>,
    /// One session per user, last write wins. The write lock serializes
    /// navigation for the same user; distinct users are distinct entries.
    sessions: RwLock<HashMap<i64, BrowseSession>>,
}

impl Browser {
    pub fn new(store: Arc<Archive>) -> Self {
        Self {
            store,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Open a day for browsing, replacing any session the user already had.
    pub fn open_day(
        &self,
        user_id: i64,
        year: i32,
        month: u32,
        day: u32,
    ) -> Result<BrowseView, EngineError> {
        let partition = self
            .store
            .messages_for_day(year, month, day)
            .map_err(EngineError::Storage)?;
        let total = partition.len();
        let Some(first) = partition.into_iter().next() else {
            return Err(EngineError::EmptyPartition { year, month, day });
        };

        let session = BrowseSession {
            year,
            month,
            day,
            index: 0,
            total,
        };
        self.write_sessions()?.insert(user_id, session);

        Ok(view(first, &session))
    }

    pub fn next(&self, user_id: i64) -> Result<BrowseView, EngineError> {
        self.step(user_id, 1)
    }

    pub fn previous(&self, user_id: i64) -> Result<BrowseView, EngineError> {
        self.step(user_id, -1)
    }

    /// Drop a user's session, if any.
    pub fn close(&self, user_id: i64) -> Result<(), EngineError> {
        self.write_sessions()?.remove(&user_id);
        Ok(())
    }

    fn step(&self, user_id: i64, delta: i64) -> Result<BrowseView, EngineError> {
        // The index update happens under the write lock, so concurrent moves
        // by the same user apply one at a time.
        let session = {
            let mut sessions = self.write_sessions()?;
            let session = sessions
                .get_mut(&user_id)
                .ok_or(EngineError::SessionNotFound(user_id))?;
            let last = session.total.saturating_sub(1);
            session.index = session
                .index
                .saturating_add_signed(delta as isize)
                .min(last);
            *session
        };

        let partition = self
            .store
            .messages_for_day(session.year, session.month, session.day)
            .map_err(EngineError::Storage)?;

        match partition.into_iter().nth(session.index) {
            Some(message) => Ok(view(message, &session)),
            None => {
                // The partition shrank beneath the cursor; the session is no
                // longer meaningful. Drop it and make the caller re-open.
                warn!(user = user_id, "browse session outlived its partition");
                self.write_sessions()?.remove(&user_id);
                Err(EngineError::SessionNotFound(user_id))
            }
        }
    }

    fn write_sessions(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<i64, BrowseSession>>, EngineError> {
        self.sessions
            .write()
            .map_err(|e| EngineError::Storage(anyhow::anyhow!("session lock poisoned: {}", e)))
    }
}

fn view(message: ArchivedMessage, session: &BrowseSession) -> BrowseView {
    BrowseView {
        message,
        position: Position {
            current: session.index + 1,
            total: session.total,
        },
        has_previous: session.index > 0,
        has_next: session.index + 1 < session.total,
    }
}
