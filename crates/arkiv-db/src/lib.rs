pub mod daytree;
pub mod migrations;
pub mod models;
pub mod queries;

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

use daytree::DayTree;

/// The archive store: a SQLite table (source of truth) plus a derived
/// per-day JSON document tree. All relational access is serialized through
/// one connection mutex; tree writes hold their own lock inside `DayTree`.
pub struct Archive {
    conn: Mutex<Connection>,
    db_path: PathBuf,
    tree: DayTree,
}

impl Archive {
    /// Open or create the archive. Failing here is fatal — the engine cannot
    /// run without its table.
    pub fn open(db_path: &Path, archive_dir: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        migrations::run(&conn)?;

        let tree = DayTree::open(archive_dir)?;

        info!("Archive opened at {}", db_path.display());
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: db_path.to_path_buf(),
            tree,
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("connection lock poisoned: {}", e))?;
        f(&conn)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub(crate) fn tree(&self) -> &DayTree {
        &self.tree
    }

    /// Size of the SQLite file in bytes.
    pub fn size_on_disk(&self) -> Result<u64> {
        Ok(std::fs::metadata(&self.db_path)?.len())
    }
}
