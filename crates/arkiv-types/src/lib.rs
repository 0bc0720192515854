pub mod api;
pub mod models;
pub mod raw;

pub use api::{BrowseView, ExportDocument, Position, Stats};
pub use models::{ArchivedMessage, Media, Reaction};
pub use raw::{RawMedia, RawMessage, RawReaction};
