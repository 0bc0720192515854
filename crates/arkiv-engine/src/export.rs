//! Day export: one self-contained JSON document per exported date.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use arkiv_db::Archive;
use arkiv_types::ExportDocument;
use chrono::{Datelike, NaiveDate, Utc};
use tracing::info;

use crate::error::EngineError;

pub struct Exporter {
    store: Arc<Archive>,
    export_dir: PathBuf,
    source_channel: String,
}

impl Exporter {
    pub fn new(
        store: Arc<Archive>,
        export_dir: &Path,
        source_channel: String,
    ) -> anyhow::Result<Self> {
        fs::create_dir_all(export_dir)
            .with_context(|| format!("creating export directory {}", export_dir.display()))?;
        Ok(Self {
            store,
            export_dir: export_dir.to_path_buf(),
            source_channel,
        })
    }

    /// Materialize one day partition as `archive_YYYY-MM-DD.json`. Reads the
    /// table, never the day-document tree, so the export is always current.
    /// Re-exporting a date overwrites the previous document.
    pub fn export_day(&self, date: NaiveDate) -> Result<PathBuf, EngineError> {
        let messages = self
            .store
            .messages_for_day(date.year(), date.month(), date.day())
            .map_err(EngineError::Storage)?;
        if messages.is_empty() {
            return Err(EngineError::EmptyRange(date));
        }

        let doc = ExportDocument {
            date,
            total_messages: messages.len(),
            exported_at: Utc::now(),
            source_channel: self.source_channel.clone(),
            messages,
        };

        let path = self.export_dir.join(format!("archive_{}.json", date));
        let tmp = path.with_extension("json.tmp");
        let write = || -> anyhow::Result<()> {
            fs::write(&tmp, serde_json::to_vec_pretty(&doc)?)?;
            fs::rename(&tmp, &path)
                .with_context(|| format!("replacing export {}", path.display()))?;
            Ok(())
        };
        write().map_err(EngineError::Storage)?;

        info!(%date, messages = doc.total_messages, "exported day partition");
        Ok(path)
    }
}
