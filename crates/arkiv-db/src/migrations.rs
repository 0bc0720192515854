use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS archived_messages (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            message_id      INTEGER NOT NULL,
            channel_id      INTEGER NOT NULL,
            date            TEXT NOT NULL,
            year            INTEGER NOT NULL,
            month           INTEGER NOT NULL,
            day             INTEGER NOT NULL,
            content         TEXT NOT NULL DEFAULT '',
            media_type      TEXT,
            file_id         TEXT,
            file_name       TEXT,
            file_size       INTEGER,
            views           INTEGER NOT NULL DEFAULT 0,
            forwards        INTEGER NOT NULL DEFAULT 0,
            replies         INTEGER NOT NULL DEFAULT 0,
            reactions       TEXT NOT NULL DEFAULT '[]',
            edited_at       TEXT,
            archived_at     TEXT NOT NULL,
            UNIQUE(message_id, channel_id)
        );

        CREATE INDEX IF NOT EXISTS idx_date
            ON archived_messages(date);
        CREATE INDEX IF NOT EXISTS idx_content
            ON archived_messages(content);
        CREATE INDEX IF NOT EXISTS idx_ymd
            ON archived_messages(year, month, day);
        CREATE INDEX IF NOT EXISTS idx_media
            ON archived_messages(media_type);
        CREATE INDEX IF NOT EXISTS idx_message_id
            ON archived_messages(message_id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
