//! End-to-end tests driving the engine the way the command layer would:
//! backfill and live ingestion through a memory source, then browsing,
//! search, stats and export over the result.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use arkiv_engine::{
    ChannelSource, Config, Engine, EngineError, MemorySource, SourceError,
};
use arkiv_types::{ExportDocument, RawMessage};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use tempfile::TempDir;
use tokio::sync::mpsc;

const CHANNEL: i64 = 42;

fn test_config(dir: &Path) -> Config {
    Config {
        db_path: dir.join("archive.db"),
        archive_dir: dir.join("archive"),
        export_dir: dir.join("exports"),
        source_channel: Some(CHANNEL),
    }
}

fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
}

fn raw(id: i64, date: DateTime<Utc>, content: &str) -> RawMessage {
    RawMessage {
        id,
        channel_id: CHANNEL,
        date: Some(date),
        text: Some(content.to_string()),
        ..Default::default()
    }
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// 75 records per day, distinct ids and ascending timestamps.
fn two_day_corpus() -> Vec<RawMessage> {
    let mut records = Vec::new();
    for i in 0..75i64 {
        records.push(raw(
            1 + i,
            at(2024, 5, 1, 6, (i / 60) as u32, (i % 60) as u32),
            &format!("may first {}", i),
        ));
        records.push(raw(
            101 + i,
            at(2024, 5, 2, 6, (i / 60) as u32, (i % 60) as u32),
            &format!("may second {}", i),
        ));
    }
    records
}

async fn wait_until<F: Fn() -> bool>(cond: F, what: &str) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}

#[tokio::test]
async fn backfill_stats_listing_and_export() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());

    // Two records outside the range: one too old (stops the walk), one too new.
    let mut records = two_day_corpus();
    records.push(raw(900, at(2024, 4, 30, 23, 59, 0), "too old"));
    records.push(raw(901, at(2024, 5, 3, 0, 1, 0), "too new"));

    let source = Arc::new(MemorySource::new(records));
    let engine = Engine::with_source(&config, source).unwrap();

    let report = engine
        .ingest_range(day(2024, 5, 1), day(2024, 5, 2))
        .await
        .unwrap();
    assert_eq!(report.stored, 150);
    assert_eq!(report.failed, 0);
    assert!(!report.cancelled);

    let stats = engine.stats().unwrap();
    assert_eq!(stats.total_messages, 150);

    assert_eq!(engine.list_years().unwrap(), vec![(2024, 150)]);
    assert_eq!(engine.list_months(2024).unwrap(), vec![(5, 150)]);
    assert_eq!(engine.list_days(2024, 5).unwrap(), vec![(1, 75), (2, 75)]);

    // Export round-trip: same ids as the store's partition, ascending order.
    let path = engine.export_day(day(2024, 5, 1)).unwrap();
    let doc: ExportDocument =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(doc.total_messages, 75);
    assert_eq!(doc.date, day(2024, 5, 1));

    let partition = engine.messages_for_day(day(2024, 5, 1)).unwrap();
    let exported: Vec<i64> = doc.messages.iter().map(|m| m.message_id).collect();
    let stored: Vec<i64> = partition.iter().map(|m| m.message_id).collect();
    assert_eq!(exported, stored);
    assert!(doc.messages.windows(2).all(|w| w[0].date <= w[1].date));
}

#[tokio::test]
async fn reingesting_an_identity_replaces_its_content() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let source = Arc::new(MemorySource::new(vec![]));
    let engine = Engine::with_source(&config, source).unwrap();

    let when = at(2024, 5, 1, 12, 0, 0);
    engine.ingest_live(raw(10, when, "hello")).await.unwrap();
    engine
        .ingest_live(raw(10, when, "hello world"))
        .await
        .unwrap();

    assert_eq!(engine.stats().unwrap().total_messages, 1);

    let (hits, more) = engine.search("world").unwrap();
    assert_eq!(hits.len(), 1);
    assert!(!more);
    assert_eq!(hits[0].message_id, 10);

    let (hits, _) = engine.search("hello").unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].content, "hello world");
}

/// Source whose history yields a fixed prefix and then stalls forever —
/// the shape of a connection that silently stops delivering.
struct StallingSource {
    records: Vec<RawMessage>,
    yield_before_stall: usize,
}

impl ChannelSource for StallingSource {
    fn subscribe(&self, _channel_id: i64) -> mpsc::Receiver<RawMessage> {
        mpsc::channel(1).1
    }

    fn history(
        &self,
        _channel_id: i64,
        _offset: DateTime<Utc>,
    ) -> BoxStream<'static, Result<RawMessage, SourceError>> {
        let head: Vec<_> = self
            .records
            .iter()
            .take(self.yield_before_stall)
            .cloned()
            .map(Ok)
            .collect();
        Box::pin(stream::iter(head).chain(stream::pending()))
    }
}

#[tokio::test]
async fn cancelled_backfill_keeps_only_what_was_stored() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());

    // 100 in-range records, newest first as a history walk would see them.
    let records: Vec<RawMessage> = (0..100i64)
        .map(|i| {
            raw(
                1 + i,
                at(2024, 5, 1, 20, 0, 0) - chrono::Duration::seconds(i),
                &format!("record {}", i),
            )
        })
        .collect();

    let source = Arc::new(StallingSource {
        records,
        yield_before_stall: 40,
    });
    let engine = Arc::new(Engine::with_source(&config, source).unwrap());

    let backfill = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.ingest_range(day(2024, 5, 1), day(2024, 5, 1)).await }
    });

    {
        let engine = Arc::clone(&engine);
        wait_until(
            move || engine.stats().unwrap().total_messages == 40,
            "40 records stored",
        )
        .await;
    }
    engine.cancel_backfill().unwrap();

    let report = backfill.await.unwrap().unwrap();
    assert!(report.cancelled);
    assert_eq!(report.stored, 40);
    assert_eq!(engine.stats().unwrap().total_messages, 40);
    assert_eq!(engine.list_days(2024, 5).unwrap(), vec![(1, 40)]);
}

#[tokio::test]
async fn backfill_skips_malformed_records_and_continues() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());

    let records = vec![
        raw(1, at(2024, 5, 1, 8, 0, 0), "fine"),
        raw(2, at(2024, 5, 1, 9, 0, 0), "also fine"),
        raw(-7, at(2024, 5, 1, 10, 0, 0), "bad identity"),
        RawMessage {
            id: 3,
            channel_id: CHANNEL,
            date: None,
            text: Some("undated".into()),
            ..Default::default()
        },
    ];

    let source = Arc::new(MemorySource::new(records));
    let engine = Engine::with_source(&config, source).unwrap();

    let report = engine
        .ingest_range(day(2024, 5, 1), day(2024, 5, 1))
        .await
        .unwrap();
    assert_eq!(report.stored, 2);
    assert_eq!(report.malformed, 2);
    assert_eq!(engine.stats().unwrap().total_messages, 2);
}

#[tokio::test]
async fn live_subscription_archives_pushed_records() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());

    let source = Arc::new(MemorySource::new(vec![]));
    let engine = Arc::new(
        Engine::with_source(&config, Arc::clone(&source) as Arc<dyn ChannelSource>).unwrap(),
    );

    let live = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.run_live().await }
    });

    {
        let source = Arc::clone(&source);
        wait_until(move || source.subscriber_count() == 1, "live subscriber").await;
    }
    source
        .push_live(raw(77, at(2024, 5, 1, 15, 0, 0), "breaking news"))
        .await;

    {
        let engine = Arc::clone(&engine);
        wait_until(
            move || engine.stats().unwrap().total_messages == 1,
            "live record archived",
        )
        .await;
    }
    let stored = engine.find_by_message_id(77).unwrap().unwrap();
    assert_eq!(stored.content, "breaking news");
    assert_eq!((stored.year, stored.month, stored.day), (2024, 5, 1));

    live.abort();
}

#[tokio::test]
async fn browse_cursor_clamps_at_both_bounds() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let source = Arc::new(MemorySource::new(vec![]));
    let engine = Engine::with_source(&config, source).unwrap();

    for i in 1..=3i64 {
        engine
            .ingest_live(raw(i, at(2024, 5, 1, 8 + i as u32, 0, 0), &format!("m{}", i)))
            .await
            .unwrap();
    }

    let user = 1000;
    let view = engine.open_day(user, 2024, 5, 1).unwrap();
    assert_eq!(view.position.to_string(), "1/3");
    assert_eq!(view.message.message_id, 1);
    assert!(!view.has_previous);
    assert!(view.has_next);

    // previous at the start is a no-op
    let view = engine.previous(user).unwrap();
    assert_eq!(view.position.to_string(), "1/3");
    assert!(!view.has_previous);

    let view = engine.next(user).unwrap();
    assert_eq!(view.position.to_string(), "2/3");
    let view = engine.next(user).unwrap();
    assert_eq!(view.position.to_string(), "3/3");
    assert!(!view.has_next);
    assert_eq!(view.message.message_id, 3);

    // next at the end is a no-op
    let view = engine.next(user).unwrap();
    assert_eq!(view.position.to_string(), "3/3");
    assert!(!view.has_next);
}

#[tokio::test]
async fn sessions_are_independent_per_user() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let source = Arc::new(MemorySource::new(vec![]));
    let engine = Engine::with_source(&config, source).unwrap();

    for i in 1..=2i64 {
        engine
            .ingest_live(raw(i, at(2024, 5, 1, 8 + i as u32, 0, 0), "x"))
            .await
            .unwrap();
    }

    engine.open_day(1, 2024, 5, 1).unwrap();
    engine.open_day(2, 2024, 5, 1).unwrap();

    let view = engine.next(1).unwrap();
    assert_eq!(view.position.to_string(), "2/2");

    // User 2's cursor did not move
    let view = engine.next(2).unwrap();
    assert_eq!(view.position.to_string(), "2/2");
    let view = engine.previous(2).unwrap();
    assert_eq!(view.position.to_string(), "1/2");

    // Re-opening replaces the session (last write wins)
    let view = engine.open_day(1, 2024, 5, 1).unwrap();
    assert_eq!(view.position.to_string(), "1/2");
}

#[tokio::test]
async fn search_finds_exactly_the_matching_record() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let source = Arc::new(MemorySource::new(vec![]));
    let engine = Engine::with_source(&config, source).unwrap();

    engine
        .ingest_live(raw(1, at(2024, 5, 1, 8, 0, 0), "the quick brown fox"))
        .await
        .unwrap();
    engine
        .ingest_live(raw(2, at(2024, 5, 1, 9, 0, 0), "lazy dog"))
        .await
        .unwrap();

    let (hits, more) = engine.search("Quick Brown").unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].message_id, 1);
    assert!(!more);

    let (hits, more) = engine.search("zebra").unwrap();
    assert!(hits.is_empty());
    assert!(!more);
}

#[tokio::test]
async fn empty_partitions_are_explicit_errors() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let source = Arc::new(MemorySource::new(vec![]));
    let engine = Engine::with_source(&config, source).unwrap();

    assert!(matches!(
        engine.open_day(1, 2024, 5, 1),
        Err(EngineError::EmptyPartition {
            year: 2024,
            month: 5,
            day: 1
        })
    ));
    assert!(matches!(
        engine.export_day(day(2024, 5, 1)),
        Err(EngineError::EmptyRange(_))
    ));
    assert!(matches!(
        engine.next(1),
        Err(EngineError::SessionNotFound(1))
    ));
}

#[tokio::test]
async fn engine_without_a_source_rejects_ingestion() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let engine = Engine::open(&config).unwrap();

    let result = engine
        .ingest_live(raw(1, at(2024, 5, 1, 8, 0, 0), "x"))
        .await;
    assert!(matches!(result, Err(EngineError::Source(_))));
    assert!(matches!(
        engine.cancel_backfill(),
        Err(EngineError::Source(_))
    ));

    // Reads still work
    assert_eq!(engine.stats().unwrap().total_messages, 0);
}

#[tokio::test]
async fn reexporting_a_day_overwrites_the_document() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let source = Arc::new(MemorySource::new(vec![]));
    let engine = Engine::with_source(&config, source).unwrap();

    engine
        .ingest_live(raw(1, at(2024, 5, 1, 8, 0, 0), "first"))
        .await
        .unwrap();
    let path = engine.export_day(day(2024, 5, 1)).unwrap();

    engine
        .ingest_live(raw(2, at(2024, 5, 1, 9, 0, 0), "second"))
        .await
        .unwrap();
    let path_again = engine.export_day(day(2024, 5, 1)).unwrap();
    assert_eq!(path, path_again);

    let doc: ExportDocument =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(doc.total_messages, 2);
}

#[tokio::test]
async fn stats_compose_media_and_engagement() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let source = Arc::new(MemorySource::new(vec![]));
    let engine = Engine::with_source(&config, source).unwrap();

    let mut with_photo = raw(1, at(2024, 5, 1, 8, 0, 0), "");
    with_photo.caption = Some("sunset".into());
    with_photo.media = Some(arkiv_types::RawMedia::Photo {
        file_id: "p1".into(),
    });
    with_photo.views = Some(120);
    with_photo.forwards = Some(7);
    engine.ingest_live(with_photo).await.unwrap();

    engine
        .ingest_live(raw(2, at(2024, 5, 1, 9, 0, 0), "plain text"))
        .await
        .unwrap();

    let stats = engine.stats().unwrap();
    assert_eq!(stats.total_messages, 2);
    assert_eq!(stats.media_counts.get("photo"), Some(&1));
    assert_eq!(stats.views, 120);
    assert_eq!(stats.forwards, 7);
    assert_eq!(stats.latest, Some(at(2024, 5, 1, 9, 0, 0)));
    assert!(stats.db_size_bytes > 0);

    // The captioned photo is searchable by its caption
    let (hits, _) = engine.search("sunset").unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].message_id, 1);
}
