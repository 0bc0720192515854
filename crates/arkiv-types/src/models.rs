use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

/// One archived record. Identity is `(message_id, channel_id)` — re-ingesting
/// the same identity replaces every field except `archived_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedMessage {
    pub message_id: i64,
    pub channel_id: i64,
    /// Authoritative instant. `year`/`month`/`day` are always derived from it.
    pub date: DateTime<Utc>,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub media: Media,
    #[serde(default)]
    pub views: i64,
    #[serde(default)]
    pub forwards: i64,
    #[serde(default)]
    pub replies: i64,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    pub edited_at: Option<DateTime<Utc>>,
    pub archived_at: DateTime<Utc>,
}

impl ArchivedMessage {
    /// Recompute the calendar partition from `date`. The three integer fields
    /// exist for indexed partition queries and must never drift from `date`.
    pub fn set_partition(&mut self) {
        let d = self.date.date_naive();
        self.year = d.year();
        self.month = d.month();
        self.day = d.day();
    }
}

/// Aggregate reaction counts as reported by the source channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub emoji: String,
    pub count: i64,
}

/// Media attached to a message. Closed set — each variant carries only the
/// fields its source type actually has (photos have no file name or size,
/// voice notes have a size but no name, stickers have a name but no size).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Media {
    #[default]
    None,
    Photo {
        file_id: String,
    },
    Video {
        file_id: String,
        file_name: Option<String>,
        file_size: Option<i64>,
    },
    Document {
        file_id: String,
        file_name: Option<String>,
        file_size: Option<i64>,
    },
    Audio {
        file_id: String,
        file_name: Option<String>,
        file_size: Option<i64>,
    },
    Voice {
        file_id: String,
        file_size: Option<i64>,
    },
    Sticker {
        file_id: String,
        file_name: Option<String>,
    },
}

impl Media {
    /// Stable kind label, used for the `media_type` column and the stats
    /// histogram. `None` has no label.
    pub fn kind(&self) -> Option<&'static str> {
        match self {
            Media::None => None,
            Media::Photo { .. } => Some("photo"),
            Media::Video { .. } => Some("video"),
            Media::Document { .. } => Some("document"),
            Media::Audio { .. } => Some("audio"),
            Media::Voice { .. } => Some("voice"),
            Media::Sticker { .. } => Some("sticker"),
        }
    }

    pub fn file_id(&self) -> Option<&str> {
        match self {
            Media::None => None,
            Media::Photo { file_id }
            | Media::Video { file_id, .. }
            | Media::Document { file_id, .. }
            | Media::Audio { file_id, .. }
            | Media::Voice { file_id, .. }
            | Media::Sticker { file_id, .. } => Some(file_id),
        }
    }

    pub fn file_name(&self) -> Option<&str> {
        match self {
            Media::Video { file_name, .. }
            | Media::Document { file_name, .. }
            | Media::Audio { file_name, .. }
            | Media::Sticker { file_name, .. } => file_name.as_deref(),
            _ => None,
        }
    }

    pub fn file_size(&self) -> Option<i64> {
        match self {
            Media::Video { file_size, .. }
            | Media::Document { file_size, .. }
            | Media::Audio { file_size, .. }
            | Media::Voice { file_size, .. } => *file_size,
            _ => None,
        }
    }

    /// Rebuild a variant from flat columns. Unknown kinds fold into the
    /// nearest shape that keeps all stored fields (a document).
    pub fn from_columns(
        kind: Option<&str>,
        file_id: Option<String>,
        file_name: Option<String>,
        file_size: Option<i64>,
    ) -> Media {
        let Some(file_id) = file_id else {
            return Media::None;
        };
        match kind {
            Some("photo") => Media::Photo { file_id },
            Some("video") => Media::Video { file_id, file_name, file_size },
            Some("audio") => Media::Audio { file_id, file_name, file_size },
            Some("voice") => Media::Voice { file_id, file_size },
            Some("sticker") => Media::Sticker { file_id, file_name },
            Some(_) => Media::Document { file_id, file_name, file_size },
            None => Media::None,
        }
    }
}
