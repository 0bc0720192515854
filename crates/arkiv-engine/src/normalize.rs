//! Raw source records -> canonical archive entities.

use arkiv_types::{ArchivedMessage, Media, RawMedia, RawMessage, Reaction};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// The only two conditions that make a record unusable. Everything else
/// degrades to a default.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("record has no usable identity (id {0})")]
    BadIdentity(i64),

    #[error("record {0} has no timestamp")]
    MissingTimestamp(i64),
}

/// Map a raw record into an `ArchivedMessage`. `archived_at` only applies on
/// first insert — the store keeps the original value for known identities.
pub fn normalize(
    raw: &RawMessage,
    archived_at: DateTime<Utc>,
) -> Result<ArchivedMessage, NormalizeError> {
    if raw.id <= 0 {
        return Err(NormalizeError::BadIdentity(raw.id));
    }
    let date = raw.date.ok_or(NormalizeError::MissingTimestamp(raw.id))?;

    // Primary text, else caption, else empty. An empty text field counts as
    // absent so captioned media keeps its caption.
    let content = raw
        .text
        .clone()
        .filter(|t| !t.is_empty())
        .or_else(|| raw.caption.clone())
        .unwrap_or_default();

    let mut msg = ArchivedMessage {
        message_id: raw.id,
        channel_id: raw.channel_id,
        date,
        year: 0,
        month: 0,
        day: 0,
        content,
        media: normalize_media(raw.media.as_ref()),
        views: raw.views.unwrap_or(0).max(0),
        forwards: raw.forwards.unwrap_or(0).max(0),
        replies: raw.replies.unwrap_or(0).max(0),
        reactions: raw
            .reactions
            .iter()
            .map(|r| Reaction {
                emoji: r.emoji.clone(),
                count: r.count,
            })
            .collect(),
        edited_at: raw.edited_at,
        archived_at,
    };
    msg.set_partition();
    Ok(msg)
}

/// Each variant extracts only the fields its source type carries.
fn normalize_media(raw: Option<&RawMedia>) -> Media {
    match raw {
        None => Media::None,
        Some(RawMedia::Photo { file_id }) => Media::Photo {
            file_id: file_id.clone(),
        },
        Some(RawMedia::Video {
            file_id,
            file_name,
            file_size,
        }) => Media::Video {
            file_id: file_id.clone(),
            file_name: file_name.clone(),
            file_size: *file_size,
        },
        Some(RawMedia::Document {
            file_id,
            file_name,
            file_size,
        }) => Media::Document {
            file_id: file_id.clone(),
            file_name: file_name.clone(),
            file_size: *file_size,
        },
        Some(RawMedia::Audio {
            file_id,
            file_name,
            file_size,
        }) => Media::Audio {
            file_id: file_id.clone(),
            file_name: file_name.clone(),
            file_size: *file_size,
        },
        Some(RawMedia::Voice { file_id, file_size }) => Media::Voice {
            file_id: file_id.clone(),
            file_size: *file_size,
        },
        Some(RawMedia::Sticker { file_id, file_name }) => Media::Sticker {
            file_id: file_id.clone(),
            file_name: file_name.clone(),
        },
    }
}
