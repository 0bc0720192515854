use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A record as delivered by the source channel client, before normalization.
/// Every field the source may omit is optional; the normalizer decides what
/// degrades to a default and what makes the record unusable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawMessage {
    pub id: i64,
    pub channel_id: i64,
    pub date: Option<DateTime<Utc>>,
    pub text: Option<String>,
    pub caption: Option<String>,
    pub media: Option<RawMedia>,
    pub views: Option<i64>,
    pub forwards: Option<i64>,
    pub replies: Option<i64>,
    #[serde(default)]
    pub reactions: Vec<RawReaction>,
    pub edited_at: Option<DateTime<Utc>>,
}

/// Media envelope as the source presents it. Mirrors the canonical variant
/// set but keeps the source's field shapes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RawMedia {
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

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawReaction {
    pub emoji: String,
    pub count: i64,
}
