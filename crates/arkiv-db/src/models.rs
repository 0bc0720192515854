//! Database row types — these map directly to SQLite rows.
//! Distinct from the arkiv-types model to keep the DB layer's column shapes
//! in one place.

use arkiv_types::{ArchivedMessage, Media};
use chrono::{DateTime, Utc};
use rusqlite::Row;
use tracing::warn;

/// Column list shared by every SELECT that maps to [`MessageRow`]. Keep in
/// sync with `from_row` ordinals.
pub(crate) const MESSAGE_COLUMNS: &str = "message_id, channel_id, date, year, month, day, \
     content, media_type, file_id, file_name, file_size, \
     views, forwards, replies, reactions, edited_at, archived_at";

pub struct MessageRow {
    pub message_id: i64,
    pub channel_id: i64,
    pub date: String,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub content: String,
    pub media_type: Option<String>,
    pub file_id: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub views: i64,
    pub forwards: i64,
    pub replies: i64,
    pub reactions: String,
    pub edited_at: Option<String>,
    pub archived_at: String,
}

impl MessageRow {
    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(MessageRow {
            message_id: row.get(0)?,
            channel_id: row.get(1)?,
            date: row.get(2)?,
            year: row.get(3)?,
            month: row.get(4)?,
            day: row.get(5)?,
            content: row.get(6)?,
            media_type: row.get(7)?,
            file_id: row.get(8)?,
            file_name: row.get(9)?,
            file_size: row.get(10)?,
            views: row.get(11)?,
            forwards: row.get(12)?,
            replies: row.get(13)?,
            reactions: row.get(14)?,
            edited_at: row.get(15)?,
            archived_at: row.get(16)?,
        })
    }

    pub fn into_message(self) -> ArchivedMessage {
        let media = Media::from_columns(
            self.media_type.as_deref(),
            self.file_id,
            self.file_name,
            self.file_size,
        );

        let reactions = serde_json::from_str(&self.reactions).unwrap_or_else(|e| {
            warn!(
                "Corrupt reactions column on message {}: {}",
                self.message_id, e
            );
            vec![]
        });

        ArchivedMessage {
            message_id: self.message_id,
            channel_id: self.channel_id,
            date: parse_ts(&self.date, self.message_id, "date"),
            year: self.year,
            month: self.month,
            day: self.day,
            content: self.content,
            media,
            views: self.views,
            forwards: self.forwards,
            replies: self.replies,
            reactions,
            edited_at: self.edited_at.map(|s| parse_ts(&s, self.message_id, "edited_at")),
            archived_at: parse_ts(&self.archived_at, self.message_id, "archived_at"),
        }
    }
}

fn parse_ts(raw: &str, message_id: i64, column: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>().unwrap_or_else(|e| {
        warn!(
            "Corrupt {} '{}' on message {}: {}",
            column, raw, message_id, e
        );
        DateTime::default()
    })
}
