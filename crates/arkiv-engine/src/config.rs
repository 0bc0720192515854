use std::path::PathBuf;

/// Engine configuration. Built explicitly and passed in, never read from
/// globals, so tests and embedders can point each engine at its own paths.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite file holding the authoritative table.
    pub db_path: PathBuf,
    /// Root of the derived per-day JSON document tree.
    pub archive_dir: PathBuf,
    /// Destination for day exports.
    pub export_dir: PathBuf,
    /// Source channel id, required only when a source client is attached.
    pub source_channel: Option<i64>,
}

impl Config {
    /// Read configuration from the environment (a `.env` file is honored if
    /// present), falling back to the defaults below.
    pub fn from_env() -> Config {
        let _ = dotenvy::dotenv();

        Config {
            db_path: std::env::var("ARKIV_DB_PATH")
                .unwrap_or_else(|_| "archive.db".into())
                .into(),
            archive_dir: std::env::var("ARKIV_ARCHIVE_DIR")
                .unwrap_or_else(|_| "archive".into())
                .into(),
            export_dir: std::env::var("ARKIV_EXPORT_DIR")
                .unwrap_or_else(|_| "exports".into())
                .into(),
            source_channel: std::env::var("ARKIV_SOURCE_CHANNEL")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }
}
