//! Derived per-day document tree: `archive/{year}/{month:02}/{day:02}.json`.
//!
//! The tree is an export convenience, rebuildable from the relational table
//! at any time. Readers of the archive never consult it; a file left stale by
//! a crash between the row write and the merge is recovered by
//! [`crate::Archive::rebuild_day_tree`].

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use arkiv_types::ArchivedMessage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One day document. `messages` is kept sorted by timestamp ascending.
#[derive(Debug, Serialize, Deserialize)]
pub struct DayDocument {
    pub date: String,
    pub total_messages: usize,
    pub last_updated: DateTime<Utc>,
    pub messages: Vec<ArchivedMessage>,
}

pub struct DayTree {
    root: PathBuf,
    // Serializes the read-modify-write cycle on day files.
    lock: Mutex<()>,
}

impl DayTree {
    pub fn open(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)
            .with_context(|| format!("creating archive tree at {}", root.display()))?;
        Ok(Self {
            root: root.to_path_buf(),
            lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn day_path(&self, year: i32, month: u32, day: u32) -> PathBuf {
        self.root
            .join(year.to_string())
            .join(format!("{:02}", month))
            .join(format!("{:02}.json", day))
    }

    /// Merge one message into its day document: replace an entry with the
    /// same message_id, otherwise append; then restore timestamp order and
    /// rewrite the document metadata.
    pub fn merge(&self, msg: &ArchivedMessage) -> Result<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|e| anyhow::anyhow!("day tree lock poisoned: {}", e))?;

        let path = self.day_path(msg.year, msg.month, msg.day);
        let mut messages = match read_messages(&path) {
            Ok(messages) => messages,
            Err(e) => {
                // A torn or hand-edited file must not block ingestion; the
                // table still holds every record.
                warn!("Unreadable day document {}: {}", path.display(), e);
                vec![]
            }
        };

        match messages.iter_mut().find(|m| m.message_id == msg.message_id) {
            Some(existing) => *existing = msg.clone(),
            None => messages.push(msg.clone()),
        }
        messages.sort_by_key(|m| m.date);

        self.write_document(&path, msg.year, msg.month, msg.day, messages)
    }

    /// Replace a day document wholesale (used by the rebuild pass).
    pub fn write_full(
        &self,
        year: i32,
        month: u32,
        day: u32,
        messages: Vec<ArchivedMessage>,
    ) -> Result<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|e| anyhow::anyhow!("day tree lock poisoned: {}", e))?;
        let path = self.day_path(year, month, day);
        self.write_document(&path, year, month, day, messages)
    }

    /// Load a day document, if one exists.
    pub fn read_day(&self, year: i32, month: u32, day: u32) -> Result<Option<DayDocument>> {
        let path = self.day_path(year, month, day);
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&data)?))
    }

    fn write_document(
        &self,
        path: &Path,
        year: i32,
        month: u32,
        day: u32,
        messages: Vec<ArchivedMessage>,
    ) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let doc = DayDocument {
            date: format!("{:04}-{:02}-{:02}", year, month, day),
            total_messages: messages.len(),
            last_updated: Utc::now(),
            messages,
        };

        // Write next to the target and rename so readers never see a torn file.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&doc)?)?;
        fs::rename(&tmp, path)
            .with_context(|| format!("replacing day document {}", path.display()))?;
        Ok(())
    }
}

fn read_messages(path: &Path) -> Result<Vec<ArchivedMessage>> {
    if !path.exists() {
        return Ok(vec![]);
    }
    let data = fs::read_to_string(path)?;
    if data.trim().is_empty() {
        return Ok(vec![]);
    }
    let doc: DayDocument = serde_json::from_str(&data)?;
    Ok(doc.messages)
}
