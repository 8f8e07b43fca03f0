//! Backfill batch semantics driven directly against the runner.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use guildmirror_core::events::EventPublisher;
use guildmirror_core::models::ChannelMapping;
use guildmirror_core::platform::{SourceMessage, SourceWorkspace};
use guildmirror_core::session::{BackfillConfig, BackfillRunner};
use guildmirror_core::test_helpers::{
    MockSourcePlatform, RecordingProcessor, SetProcessedIndex,
};

fn mapping() -> ChannelMapping {
    ChannelMapping {
        mirror_id: "mirror-1".to_string(),
        source_id: "chan".to_string(),
        source_workspace_id: "src-ws".to_string(),
        name: "general".to_string(),
        kind_code: 0,
        category_id: None,
        blacklisted: false,
        blacklist_reason: None,
        last_synced: Utc::now(),
    }
}

fn workspace() -> SourceWorkspace {
    SourceWorkspace {
        id: "src-ws".to_string(),
        name: "origin".to_string(),
    }
}

fn build_runner(
    source: Arc<MockSourcePlatform>,
    processor: Arc<RecordingProcessor>,
    processed: Arc<SetProcessedIndex>,
    limit: usize,
) -> BackfillRunner {
    BackfillRunner::new(
        source,
        processor,
        processed,
        EventPublisher::new(16),
        BackfillConfig {
            limit,
            pacing: Duration::from_millis(0),
        },
    )
}

#[tokio::test]
async fn test_backfill_caps_at_limit_and_replays_chronologically() {
    let source = Arc::new(MockSourcePlatform::new());
    let processor = Arc::new(RecordingProcessor::new());
    let processed = Arc::new(SetProcessedIndex::new());

    // 60 messages served newest first, ids msg-060 down to msg-001
    let history: Vec<SourceMessage> = (1..=60)
        .rev()
        .map(|i| SourceMessage {
            id: format!("msg-{i:03}"),
            channel_id: "chan".to_string(),
            timestamp: Utc.timestamp_opt(1_700_000_000 + i, 0).unwrap(),
            raw: serde_json::json!({ "id": format!("msg-{i:03}") }),
        })
        .collect();
    source.set_messages("chan", history);

    let runner = build_runner(
        Arc::clone(&source),
        processor.clone(),
        processed.clone(),
        50,
    );
    runner.backfill("chan", &mapping(), &workspace()).await;

    let ids = processor.processed_ids();
    assert_eq!(ids.len(), 50, "batch is capped at 50 messages");
    // The 50 newest survive the cap; replay runs oldest to newest
    assert_eq!(ids.first().map(String::as_str), Some("msg-011"));
    assert_eq!(ids.last().map(String::as_str), Some("msg-060"));
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted, "replay is strictly ascending");
}

#[tokio::test]
async fn test_backfill_skips_processed_and_survives_failures() {
    let source = Arc::new(MockSourcePlatform::new());
    let processor = Arc::new(RecordingProcessor::new());
    let processed = Arc::new(SetProcessedIndex::new());

    let history: Vec<SourceMessage> = (1..=10)
        .rev()
        .map(|i| SourceMessage {
            id: format!("m{i:02}"),
            channel_id: "chan".to_string(),
            timestamp: Utc.timestamp_opt(1_700_000_000 + i, 0).unwrap(),
            raw: serde_json::json!({}),
        })
        .collect();
    source.set_messages("chan", history);

    processed.mark("m03");
    processor.fail_on("m07");

    let runner = build_runner(
        Arc::clone(&source),
        processor.clone(),
        processed.clone(),
        50,
    );
    runner.backfill("chan", &mapping(), &workspace()).await;

    let ids = processor.processed_ids();
    assert!(!ids.contains(&"m03".to_string()), "processed id is skipped");
    assert!(!ids.contains(&"m07".to_string()), "failed id is not recorded");
    assert_eq!(ids.len(), 8, "the rest of the batch replays");
    assert_eq!(ids.first().map(String::as_str), Some("m01"));
    assert_eq!(ids.last().map(String::as_str), Some("m10"));
}

#[tokio::test]
async fn test_backfill_fetch_failure_leaves_room_empty() {
    let source = Arc::new(MockSourcePlatform::new());
    let processor = Arc::new(RecordingProcessor::new());
    let processed = Arc::new(SetProcessedIndex::new());

    // No history registered: the mock serves an empty batch; an explicit
    // error path is covered by the session tests.
    let runner = build_runner(
        Arc::clone(&source),
        processor.clone(),
        processed.clone(),
        50,
    );
    runner.backfill("chan", &mapping(), &workspace()).await;

    assert!(processor.processed_ids().is_empty());
}
