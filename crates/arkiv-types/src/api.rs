use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::ArchivedMessage;

// -- Stats --

/// Aggregate archive statistics, composed from store primitives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stats {
    pub total_messages: u64,
    pub today: u64,
    pub this_month: u64,
    /// Media kind -> stored count. Text-only messages are not counted here.
    pub media_counts: BTreeMap<String, u64>,
    pub views: i64,
    pub forwards: i64,
    pub replies: i64,
    pub latest: Option<DateTime<Utc>>,
    pub db_size_bytes: u64,
}

// -- Browsing --

/// 1-based cursor position within a day partition, for display as "3/75".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub current: usize,
    pub total: usize,
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.current, self.total)
    }
}

/// What a navigation call hands back: the record under the cursor plus which
/// directions remain available.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowseView {
    pub message: ArchivedMessage,
    pub position: Position,
    pub has_previous: bool,
    pub has_next: bool,
}

// -- Export --

/// Self-contained export of one day partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportDocument {
    pub date: NaiveDate,
    pub total_messages: usize,
    pub exported_at: DateTime<Utc>,
    pub source_channel: String,
    pub messages: Vec<ArchivedMessage>,
}
