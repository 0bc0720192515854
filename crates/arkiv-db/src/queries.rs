use anyhow::{Context, Result};
use arkiv_types::ArchivedMessage;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::Archive;
use crate::models::{MESSAGE_COLUMNS, MessageRow};

impl Archive {
    /// Insert-or-replace keyed by `(message_id, channel_id)`. Every mutable
    /// column is taken from the new record; `archived_at` survives from the
    /// first write. The row lands before the day-document merge, so the table
    /// stays authoritative if the process dies in between.
    pub fn upsert(&self, msg: &ArchivedMessage) -> Result<()> {
        let reactions = serde_json::to_string(&msg.reactions)?;

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO archived_messages
                    (message_id, channel_id, date, year, month, day, content,
                     media_type, file_id, file_name, file_size,
                     views, forwards, replies, reactions, edited_at, archived_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
                 ON CONFLICT(message_id, channel_id) DO UPDATE SET
                    date = excluded.date,
                    year = excluded.year,
                    month = excluded.month,
                    day = excluded.day,
                    content = excluded.content,
                    media_type = excluded.media_type,
                    file_id = excluded.file_id,
                    file_name = excluded.file_name,
                    file_size = excluded.file_size,
                    views = excluded.views,
                    forwards = excluded.forwards,
                    replies = excluded.replies,
                    reactions = excluded.reactions,
                    edited_at = excluded.edited_at",
                params![
                    msg.message_id,
                    msg.channel_id,
                    msg.date.to_rfc3339(),
                    msg.year,
                    msg.month,
                    msg.day,
                    msg.content,
                    msg.media.kind(),
                    msg.media.file_id(),
                    msg.media.file_name(),
                    msg.media.file_size(),
                    msg.views,
                    msg.forwards,
                    msg.replies,
                    reactions,
                    msg.edited_at.map(|d| d.to_rfc3339()),
                    msg.archived_at.to_rfc3339(),
                ],
            )
            .context("upserting archived message")?;
            Ok(())
        })?;

        self.tree().merge(msg)
    }

    pub fn count(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM archived_messages", params![], |row| {
                row.get(0)
            })?;
            Ok(n as u64)
        })
    }

    pub fn count_for_year(&self, year: i32) -> Result<u64> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM archived_messages WHERE year = ?1",
                [year],
                |row| row.get(0),
            )?;
            Ok(n as u64)
        })
    }

    pub fn count_for_month(&self, year: i32, month: u32) -> Result<u64> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM archived_messages WHERE year = ?1 AND month = ?2",
                params![year, month],
                |row| row.get(0),
            )?;
            Ok(n as u64)
        })
    }

    pub fn count_for_day(&self, year: i32, month: u32, day: u32) -> Result<u64> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM archived_messages
                 WHERE year = ?1 AND month = ?2 AND day = ?3",
                params![year, month, day],
                |row| row.get(0),
            )?;
            Ok(n as u64)
        })
    }

    /// Timestamp of the most recent archived record, if any.
    pub fn latest_date(&self) -> Result<Option<DateTime<Utc>>> {
        self.with_conn(|conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT date FROM archived_messages ORDER BY date DESC LIMIT 1",
                    params![],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(raw.and_then(|s| s.parse().ok()))
        })
    }

    /// Look up a record by its source message id. If the same id was archived
    /// from more than one channel, the newest row wins.
    pub fn find_by_message_id(&self, message_id: i64) -> Result<Option<ArchivedMessage>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM archived_messages
                 WHERE message_id = ?1 ORDER BY date DESC LIMIT 1",
                MESSAGE_COLUMNS
            );
            let row = conn
                .query_row(&sql, [message_id], MessageRow::from_row)
                .optional()?;
            Ok(row.map(MessageRow::into_message))
        })
    }

    /// Years holding at least one record, newest first, with per-year counts.
    pub fn list_years(&self) -> Result<Vec<(i32, u64)>> {
        self.with_conn(|conn| {
            query_buckets(
                conn,
                "SELECT year, COUNT(*) FROM archived_messages
                 GROUP BY year ORDER BY year DESC",
                params![],
            )
        })
    }

    pub fn list_months(&self, year: i32) -> Result<Vec<(u32, u64)>> {
        self.with_conn(|conn| {
            query_buckets(
                conn,
                "SELECT month, COUNT(*) FROM archived_messages
                 WHERE year = ?1 GROUP BY month ORDER BY month",
                [year],
            )
        })
    }

    pub fn list_days(&self, year: i32, month: u32) -> Result<Vec<(u32, u64)>> {
        self.with_conn(|conn| {
            query_buckets(
                conn,
                "SELECT day, COUNT(*) FROM archived_messages
                 WHERE year = ?1 AND month = ?2 GROUP BY day ORDER BY day",
                params![year, month],
            )
        })
    }

    /// Case-insensitive substring search over content, newest first. Returns
    /// at most `limit` records plus a flag for whether more matches exist.
    pub fn search_content(
        &self,
        term: &str,
        limit: usize,
    ) -> Result<(Vec<ArchivedMessage>, bool)> {
        let pattern = escape_like(term);
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM archived_messages
                 WHERE content LIKE '%' || ?1 || '%' ESCAPE '\\'
                 ORDER BY date DESC LIMIT ?2",
                MESSAGE_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            // Probe one past the cap to learn whether results were truncated.
            let mut messages: Vec<ArchivedMessage> = stmt
                .query_map(params![pattern, (limit + 1) as i64], MessageRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?
                .into_iter()
                .map(MessageRow::into_message)
                .collect();

            let more = messages.len() > limit;
            messages.truncate(limit);
            Ok((messages, more))
        })
    }

    /// The full day partition, ordered by timestamp ascending.
    pub fn messages_for_day(
        &self,
        year: i32,
        month: u32,
        day: u32,
    ) -> Result<Vec<ArchivedMessage>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM archived_messages
                 WHERE year = ?1 AND month = ?2 AND day = ?3
                 ORDER BY date",
                MESSAGE_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let messages = stmt
                .query_map(params![year, month, day], MessageRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?
                .into_iter()
                .map(MessageRow::into_message)
                .collect();
            Ok(messages)
        })
    }

    /// Media kind -> stored count. Text-only rows are excluded.
    pub fn media_histogram(&self) -> Result<Vec<(String, u64)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT media_type, COUNT(*) FROM archived_messages
                 WHERE media_type IS NOT NULL
                 GROUP BY media_type ORDER BY media_type",
            )?;
            let rows = stmt
                .query_map(params![], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Sum of (views, forwards, replies) across the archive.
    pub fn engagement_totals(&self) -> Result<(i64, i64, i64)> {
        self.with_conn(|conn| {
            let totals = conn.query_row(
                "SELECT COALESCE(SUM(views), 0),
                        COALESCE(SUM(forwards), 0),
                        COALESCE(SUM(replies), 0)
                 FROM archived_messages",
                params![],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;
            Ok(totals)
        })
    }

    /// Regenerate the entire day-document tree from the table. Recovers files
    /// left stale by a crash between the row write and the tree merge.
    /// Returns the number of day documents written.
    pub fn rebuild_day_tree(&self) -> Result<usize> {
        let partitions = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT year, month, day FROM archived_messages
                 ORDER BY year, month, day",
            )?;
            let rows = stmt
                .query_map(params![], |row| {
                    Ok((
                        row.get::<_, i32>(0)?,
                        row.get::<_, u32>(1)?,
                        row.get::<_, u32>(2)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        for &(year, month, day) in &partitions {
            let messages = self.messages_for_day(year, month, day)?;
            self.tree().write_full(year, month, day, messages)?;
        }
        Ok(partitions.len())
    }
}

fn query_buckets<K, P>(conn: &Connection, sql: &str, params: P) -> Result<Vec<(K, u64)>>
where
    K: rusqlite::types::FromSql,
    P: rusqlite::Params,
{
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, |row| {
            Ok((row.get::<_, K>(0)?, row.get::<_, i64>(1)? as u64))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Escape LIKE wildcards so a search for "100%" matches the literal text.
fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use arkiv_types::{Media, Reaction};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn test_archive() -> (TempDir, Archive) {
        let dir = tempfile::tempdir().unwrap();
        let archive = Archive::open(&dir.path().join("archive.db"), &dir.path().join("archive"))
            .unwrap();
        (dir, archive)
    }

    fn msg(message_id: i64, y: i32, mo: u32, d: u32, hour: u32, content: &str) -> ArchivedMessage {
        let date = Utc.with_ymd_and_hms(y, mo, d, hour, 0, 0).unwrap();
        let mut m = ArchivedMessage {
            message_id,
            channel_id: 42,
            date,
            year: 0,
            month: 0,
            day: 0,
            content: content.to_string(),
            media: Media::None,
            views: 0,
            forwards: 0,
            replies: 0,
            reactions: vec![],
            edited_at: None,
            archived_at: date,
        };
        m.set_partition();
        m
    }

    #[test]
    fn upsert_is_idempotent_per_identity() {
        let (_dir, archive) = test_archive();

        let first = msg(10, 2024, 5, 1, 8, "hello");
        archive.upsert(&first).unwrap();

        let mut second = msg(10, 2024, 5, 1, 8, "hello world");
        second.views = 99;
        second.archived_at = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        archive.upsert(&second).unwrap();

        assert_eq!(archive.count().unwrap(), 1);

        let stored = archive.find_by_message_id(10).unwrap().unwrap();
        assert_eq!(stored.content, "hello world");
        assert_eq!(stored.views, 99);
        // archived_at is set once, at first write
        assert_eq!(stored.archived_at, first.archived_at);
    }

    #[test]
    fn same_id_in_different_channels_stays_distinct() {
        let (_dir, archive) = test_archive();

        let a = msg(5, 2024, 5, 1, 8, "channel a");
        let mut b = msg(5, 2024, 5, 1, 9, "channel b");
        b.channel_id = 43;

        archive.upsert(&a).unwrap();
        archive.upsert(&b).unwrap();
        assert_eq!(archive.count().unwrap(), 2);
    }

    #[test]
    fn partition_listing_and_counts() {
        let (_dir, archive) = test_archive();

        for i in 0..3 {
            archive.upsert(&msg(i, 2023, 12, 31, 10, "old")).unwrap();
        }
        for i in 10..15 {
            archive.upsert(&msg(i, 2024, 5, 1, 10, "new")).unwrap();
        }
        for i in 20..22 {
            archive.upsert(&msg(i, 2024, 5, 2, 10, "new")).unwrap();
        }

        // Years newest first, months and days ascending
        assert_eq!(archive.list_years().unwrap(), vec![(2024, 7), (2023, 3)]);
        assert_eq!(archive.list_months(2024).unwrap(), vec![(5, 7)]);
        assert_eq!(archive.list_days(2024, 5).unwrap(), vec![(1, 5), (2, 2)]);

        assert_eq!(archive.count_for_year(2023).unwrap(), 3);
        assert_eq!(archive.count_for_month(2024, 5).unwrap(), 7);
        assert_eq!(archive.count_for_day(2024, 5, 2).unwrap(), 2);
    }

    #[test]
    fn messages_for_day_is_ordered_ascending() {
        let (_dir, archive) = test_archive();

        archive.upsert(&msg(2, 2024, 5, 1, 14, "later")).unwrap();
        archive.upsert(&msg(1, 2024, 5, 1, 9, "earlier")).unwrap();

        let day = archive.messages_for_day(2024, 5, 1).unwrap();
        assert_eq!(day.len(), 2);
        assert_eq!(day[0].message_id, 1);
        assert_eq!(day[1].message_id, 2);
    }

    #[test]
    fn search_is_case_insensitive_and_capped() {
        let (_dir, archive) = test_archive();

        for i in 0..5 {
            archive
                .upsert(&msg(i, 2024, 5, 1, i as u32, "Rust Update Notes"))
                .unwrap();
        }
        archive.upsert(&msg(99, 2024, 5, 2, 1, "unrelated")).unwrap();

        let (hits, more) = archive.search_content("rust update", 3).unwrap();
        assert_eq!(hits.len(), 3);
        assert!(more);

        let (hits, more) = archive.search_content("rust update", 10).unwrap();
        assert_eq!(hits.len(), 5);
        assert!(!more);

        // Newest first
        assert_eq!(hits[0].message_id, 4);

        let (hits, more) = archive.search_content("nothing here", 10).unwrap();
        assert!(hits.is_empty());
        assert!(!more);
    }

    #[test]
    fn search_escapes_like_wildcards() {
        let (_dir, archive) = test_archive();

        archive.upsert(&msg(1, 2024, 5, 1, 8, "sale: 100% off")).unwrap();
        archive.upsert(&msg(2, 2024, 5, 1, 9, "sale: 100 items")).unwrap();

        let (hits, _) = archive.search_content("100%", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].message_id, 1);

        let (hits, _) = archive.search_content("100_", 10).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn media_and_reactions_round_trip() {
        let (_dir, archive) = test_archive();

        let mut m = msg(1, 2024, 5, 1, 8, "with attachment");
        m.media = Media::Video {
            file_id: "abc123".into(),
            file_name: Some("clip.mp4".into()),
            file_size: Some(1_048_576),
        };
        m.reactions = vec![
            Reaction { emoji: "👍".into(), count: 12 },
            Reaction { emoji: "🔥".into(), count: 3 },
        ];
        m.views = 250;
        m.forwards = 4;
        archive.upsert(&m).unwrap();

        let mut p = msg(2, 2024, 5, 1, 9, "");
        p.media = Media::Photo { file_id: "p1".into() };
        archive.upsert(&p).unwrap();

        let stored = archive.find_by_message_id(1).unwrap().unwrap();
        assert_eq!(stored.media, m.media);
        assert_eq!(stored.reactions, m.reactions);

        assert_eq!(
            archive.media_histogram().unwrap(),
            vec![("photo".to_string(), 1), ("video".to_string(), 1)]
        );
        assert_eq!(archive.engagement_totals().unwrap(), (250, 4, 0));
    }

    #[test]
    fn latest_date_tracks_newest_record() {
        let (_dir, archive) = test_archive();
        assert!(archive.latest_date().unwrap().is_none());

        archive.upsert(&msg(1, 2024, 5, 1, 8, "a")).unwrap();
        archive.upsert(&msg(2, 2024, 5, 3, 8, "b")).unwrap();
        archive.upsert(&msg(3, 2024, 5, 2, 8, "c")).unwrap();

        let latest = archive.latest_date().unwrap().unwrap();
        assert_eq!(latest, Utc.with_ymd_and_hms(2024, 5, 3, 8, 0, 0).unwrap());
    }

    #[test]
    fn rebuild_regenerates_tree_from_table() {
        let (dir, archive) = test_archive();

        archive.upsert(&msg(1, 2024, 5, 1, 8, "a")).unwrap();
        archive.upsert(&msg(2, 2024, 5, 1, 9, "b")).unwrap();
        archive.upsert(&msg(3, 2024, 6, 2, 9, "c")).unwrap();

        // Clobber the tree, then rebuild from the table.
        std::fs::remove_dir_all(dir.path().join("archive")).unwrap();
        let written = archive.rebuild_day_tree().unwrap();
        assert_eq!(written, 2);

        let doc = archive.tree().read_day(2024, 5, 1).unwrap().unwrap();
        assert_eq!(doc.total_messages, 2);
        let ids: Vec<i64> = doc.messages.iter().map(|m| m.message_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }
}
