//! Poll cycles end to end: scripted feed, in-memory channel, real store.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use common::{Harness, Page, id, live};
use streamwatch::domain::RetryPolicy;
use streamwatch::notification::{ChannelOp, DeliveryError, MessageHandle};
use streamwatch::scheduler::{CycleOutcome, CycleSummary, SchedulerConfig};
use streamwatch::watchlist::RemoveOutcome;

fn completed(outcome: CycleOutcome) -> CycleSummary {
    match outcome {
        CycleOutcome::Completed(summary) => summary,
        other => panic!("expected a completed cycle, got {other:?}"),
    }
}

fn handle_of(h: &Harness, login: &str) -> MessageHandle {
    h.tracker
        .get(&id(login))
        .and_then(|s| s.notification)
        .expect("streamer should have a live message")
}

#[tokio::test]
async fn test_live_edit_then_offline() {
    let h = Harness::new(&["alice"]).await;

    h.feed.push_live(vec![live("alice", "Game A", 10)]);
    let summary = completed(h.scheduler.tick().await);
    assert_eq!(summary.became_live, 1);
    assert_eq!(summary.effects.sent, 1);
    let handle = handle_of(&h, "alice");
    assert_eq!(h.channel.messages().len(), 1);
    assert!(h.tracker.get(&id("alice")).unwrap().is_live);

    h.channel.clear_ops();
    h.feed.push_live(vec![live("alice", "Game A", 15)]);
    let summary = completed(h.scheduler.tick().await);
    assert_eq!(summary.still_live, 1);
    assert_eq!(h.channel.ops(), vec![ChannelOp::Edit(handle.clone())]);
    assert_eq!(handle_of(&h, "alice"), handle);
    let embed = &h.channel.message(&handle).unwrap().embeds[0];
    assert!(embed.description.as_ref().unwrap().contains("Viewers: **15**"));

    h.channel.clear_ops();
    h.feed.push_live(vec![]);
    let summary = completed(h.scheduler.tick().await);
    assert_eq!(summary.became_offline, 1);
    assert_eq!(
        h.channel.ops(),
        vec![ChannelOp::Delete(handle.clone()), ChannelOp::Send]
    );
    let messages = h.channel.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(
        messages[0].1.content.as_deref(),
        Some("⚫ **alice** ended the stream.")
    );

    let state = h.tracker.get(&id("alice")).unwrap();
    assert!(!state.is_live);
    assert!(state.notification.is_none());
}

#[tokio::test]
async fn test_feed_unavailable_aborts_without_mutation() {
    let h = Harness::new(&["alice"]).await;
    h.feed.push_live(vec![live("alice", "Game A", 10)]);
    completed(h.scheduler.tick().await);
    let before = h.tracker.snapshot();
    h.channel.clear_ops();

    h.feed.push_cycle(vec![Page::Fail("helix returned 503")]);
    let outcome = h.scheduler.tick().await;
    match &outcome {
        CycleOutcome::Aborted { reason } => assert!(reason.contains("helix returned 503")),
        other => panic!("expected an aborted cycle, got {other:?}"),
    }
    assert_eq!(h.tracker.snapshot(), before);
    assert!(h.channel.ops().is_empty());
    assert!(matches!(
        h.scheduler.last_cycle().unwrap().outcome,
        CycleOutcome::Aborted { .. }
    ));

    // The next cycle proceeds normally.
    h.feed.push_live(vec![live("alice", "Game A", 10)]);
    let summary = completed(h.scheduler.tick().await);
    assert_eq!(summary.still_live, 1);
    assert_eq!(summary.effects.verified, 1);
    assert_eq!(h.channel.messages().len(), 1);
}

#[tokio::test]
async fn test_partial_feed_defers_offline() {
    let h = Harness::new(&["alice", "bob"]).await;
    h.feed
        .push_live(vec![live("alice", "Game A", 1), live("bob", "Game B", 2)]);
    completed(h.scheduler.tick().await);
    let bob_handle = handle_of(&h, "bob");
    h.channel.clear_ops();

    h.feed.push_cycle(vec![
        Page::Records(vec![live("alice", "Game A", 5)]),
        Page::Fail("connection reset"),
    ]);
    let summary = completed(h.scheduler.tick().await);
    assert!(summary.partial);
    assert_eq!(summary.became_offline, 0);
    assert_eq!(summary.effects.edited, 1);

    assert!(h.tracker.get(&id("bob")).unwrap().is_live);
    assert!(h.channel.message(&bob_handle).is_some());
    assert!(
        !h.channel
            .ops()
            .iter()
            .any(|op| matches!(op, ChannelOp::Delete(_)))
    );
}

#[tokio::test]
async fn test_deleted_message_is_replaced() {
    let h = Harness::new(&["alice"]).await;
    h.feed.push_live(vec![live("alice", "Game A", 10)]);
    completed(h.scheduler.tick().await);
    let first = handle_of(&h, "alice");

    assert!(h.channel.remove_externally(&first));
    h.feed.push_live(vec![live("alice", "Game A", 10)]);
    let summary = completed(h.scheduler.tick().await);
    assert_eq!(summary.failures, 0);
    assert_eq!(summary.effects.sent, 1);

    let second = handle_of(&h, "alice");
    assert_ne!(first, second);
    assert_eq!(h.channel.messages().len(), 1);
    assert!(h.tracker.get(&id("alice")).unwrap().is_live);
}

#[tokio::test]
async fn test_unchanged_stream_is_not_edited() {
    let h = Harness::new(&["alice"]).await;
    h.feed.push_live(vec![live("alice", "Game A", 10)]);
    completed(h.scheduler.tick().await);
    let handle = handle_of(&h, "alice");
    h.channel.clear_ops();

    for _ in 0..2 {
        h.feed.push_live(vec![live("alice", "Game A", 10)]);
        let summary = completed(h.scheduler.tick().await);
        assert_eq!(summary.effects.edited, 0);
        assert_eq!(summary.effects.verified, 1);
    }
    assert_eq!(
        h.channel.ops(),
        vec![ChannelOp::Fetch(handle.clone()), ChannelOp::Fetch(handle)]
    );
}

#[tokio::test]
async fn test_failed_send_is_retried_next_cycle() {
    let h = Harness::new(&["alice"]).await;
    h.channel.fail_next(
        ChannelOp::Send,
        DeliveryError::Request("connection refused".to_string()),
    );

    h.feed.push_live(vec![live("alice", "Game A", 10)]);
    let summary = completed(h.scheduler.tick().await);
    assert_eq!(summary.failures, 1);
    assert!(!h.tracker.get(&id("alice")).unwrap().is_live);
    assert!(h.channel.messages().is_empty());

    h.feed.push_live(vec![live("alice", "Game A", 10)]);
    let summary = completed(h.scheduler.tick().await);
    assert_eq!(summary.became_live, 1);
    assert_eq!(summary.effects.sent, 1);
    assert_eq!(h.channel.messages().len(), 1);
}

#[tokio::test]
async fn test_concurrent_tick_is_skipped() {
    let h = Harness::new(&["alice"]).await;
    let gate = Arc::new(Notify::new());
    h.feed.hold_next(gate.clone());
    h.feed.push_live(vec![live("alice", "Game A", 10)]);

    let scheduler = h.scheduler.clone();
    let first = tokio::spawn(async move { scheduler.tick().await });

    h.feed.entered.notified().await;
    assert!(h.scheduler.is_cycle_running());
    assert_eq!(h.scheduler.tick().await, CycleOutcome::Skipped);
    assert_eq!(h.feed.fetches(), 1);

    gate.notify_one();
    let summary = completed(first.await.unwrap());
    assert_eq!(summary.became_live, 1);
    assert_eq!(h.scheduler.cycles_run(), 1);
    assert!(!h.scheduler.is_cycle_running());
}

#[tokio::test]
async fn test_removed_mid_cycle_is_not_resurrected() {
    let h = Harness::new(&["alice"]).await;
    let gate = Arc::new(Notify::new());
    h.feed.hold_next(gate.clone());
    h.feed.push_live(vec![live("alice", "Game A", 10)]);

    let scheduler = h.scheduler.clone();
    let cycle = tokio::spawn(async move { scheduler.tick().await });
    h.feed.entered.notified().await;

    let reply = h.commands.watch_remove("alice").await.unwrap();
    assert_eq!(reply.outcome, RemoveOutcome::Removed);

    gate.notify_one();
    completed(cycle.await.unwrap());
    assert!(h.tracker.get(&id("alice")).is_none());
    assert_eq!(h.scheduler.tick().await, CycleOutcome::Idle);
}

#[tokio::test]
async fn test_unwatch_while_live_then_rewatch_starts_fresh() {
    let h = Harness::new(&["alice"]).await;
    h.feed.know("alice");
    h.feed.push_live(vec![live("alice", "Game A", 10)]);
    completed(h.scheduler.tick().await);
    let old = handle_of(&h, "alice");

    h.commands.watch_remove("alice").await.unwrap();
    assert!(h.tracker.get(&id("alice")).is_none());
    assert_eq!(h.scheduler.tick().await, CycleOutcome::Idle);
    // The live message is left where it is.
    assert!(h.channel.message(&old).is_some());

    h.commands.watch_add("Alice").await.unwrap();
    h.channel.clear_ops();
    h.feed.push_live(vec![live("alice", "Game A", 10)]);
    let summary = completed(h.scheduler.tick().await);
    assert_eq!(summary.became_live, 1);
    assert_eq!(h.channel.ops(), vec![ChannelOp::Send]);
    assert_ne!(handle_of(&h, "alice"), old);
}

#[tokio::test]
async fn test_records_for_unwatched_ids_are_ignored() {
    let h = Harness::new(&["alice"]).await;
    h.feed
        .push_live(vec![live("alice", "Game A", 10), live("mallory", "Game M", 99)]);

    let summary = completed(h.scheduler.tick().await);
    assert_eq!(summary.live, 1);
    assert_eq!(h.channel.messages().len(), 1);
    assert!(h.tracker.get(&id("mallory")).is_none());
}

#[tokio::test]
async fn test_empty_watch_list_is_idle() {
    let h = Harness::new(&[]).await;
    assert_eq!(h.scheduler.tick().await, CycleOutcome::Idle);
    assert_eq!(h.feed.fetches(), 0);
}

#[tokio::test]
async fn test_handshake_failure_degrades() {
    let config = SchedulerConfig {
        handshake_retry: RetryPolicy {
            max_retries: 2,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            backoff_multiplier: 2.0,
            use_jitter: false,
        },
        ..Default::default()
    };
    let h = Harness::with_config(&["alice"], config).await;
    h.feed
        .fail_handshake
        .store(true, std::sync::atomic::Ordering::SeqCst);

    assert!(!h.scheduler.handshake(&CancellationToken::new()).await);
    assert_eq!(h.feed.handshakes(), 3);
    assert!(!h.scheduler.handshake_succeeded());

    // Polling still runs.
    h.feed.push_live(vec![live("alice", "Game A", 10)]);
    completed(h.scheduler.tick().await);
}

#[tokio::test]
async fn test_run_loop_stops_on_cancel() {
    let config = SchedulerConfig {
        poll_interval: Duration::from_millis(20),
        handshake_retry: RetryPolicy::no_retry(),
    };
    let h = Harness::with_config(&["alice"], config).await;
    h.feed.push_live(vec![live("alice", "Game A", 10)]);

    let cancel = CancellationToken::new();
    let task = tokio::spawn(h.scheduler.clone().run(cancel.clone()));
    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("scheduler should stop")
        .unwrap();

    assert!(h.scheduler.handshake_succeeded());
    assert!(h.scheduler.cycles_run() >= 2);
    assert_eq!(h.channel.messages().len(), 1);
    // Once the scripts run out nobody is live.
    assert!(!h.tracker.get(&id("alice")).unwrap().is_live);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_add_racing_cycles_posts_one_message() {
    for _ in 0..25 {
        let h = Harness::new(&["bob"]).await;
        h.feed.know("alice");
        h.feed.live_by_default(vec![live("alice", "Game A", 10)]);

        let scheduler = h.scheduler.clone();
        let ticker = tokio::spawn(async move {
            for _ in 0..20 {
                scheduler.tick().await;
                tokio::task::yield_now().await;
            }
        });
        h.commands.watch_add("alice").await.unwrap();
        ticker.await.unwrap();

        completed(h.scheduler.tick().await);
        completed(h.scheduler.tick().await);

        let live_messages = h
            .channel
            .messages()
            .into_iter()
            .filter(|(_, content)| !content.embeds.is_empty())
            .count();
        assert_eq!(live_messages, 1);
        assert!(h.tracker.get(&id("alice")).unwrap().is_live);
    }
}

#[tokio::test]
async fn test_add_during_cycle_keeps_single_message() {
    let h = Harness::new(&["bob"]).await;
    h.feed.know("alice");
    let gate = Arc::new(Notify::new());
    h.feed.hold_next(gate.clone());

    let scheduler = h.scheduler.clone();
    let cycle = tokio::spawn(async move { scheduler.tick().await });
    h.feed.entered.notified().await;
    h.commands.watch_add("alice").await.unwrap();
    gate.notify_one();
    completed(cycle.await.unwrap());

    h.feed.live_by_default(vec![live("alice", "Game A", 10)]);
    let summary = completed(h.scheduler.tick().await);
    assert_eq!(summary.became_live, 1);
    let summary = completed(h.scheduler.tick().await);
    assert_eq!(summary.still_live, 1);
    assert_eq!(summary.effects.sent, 0);
    assert_eq!(h.channel.messages().len(), 1);
}

#[tokio::test]
async fn test_failed_ended_announcement_is_resent() {
    let h = Harness::new(&["alice"]).await;
    h.feed.push_live(vec![live("alice", "Game A", 10)]);
    completed(h.scheduler.tick().await);

    h.channel.fail_next(
        ChannelOp::Send,
        DeliveryError::Request("connection refused".to_string()),
    );
    h.feed.push_live(vec![]);
    let summary = completed(h.scheduler.tick().await);
    assert_eq!(summary.effects.announced, 0);
    assert_eq!(summary.failures, 1);
    assert!(h.channel.messages().is_empty());

    h.feed.push_live(vec![]);
    let summary = completed(h.scheduler.tick().await);
    assert_eq!(summary.effects.announced, 1);
    let messages = h.channel.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(
        messages[0].1.content.as_deref(),
        Some("⚫ **alice** ended the stream.")
    );
    assert!(!h.tracker.get(&id("alice")).unwrap().pending_announce);
}

#[tokio::test]
async fn test_cancel_lets_running_cycle_finish() {
    let config = SchedulerConfig {
        poll_interval: Duration::from_secs(3600),
        handshake_retry: RetryPolicy::no_retry(),
    };
    let h = Harness::with_config(&["alice"], config).await;
    let gate = Arc::new(Notify::new());
    h.feed.hold_next(gate.clone());
    h.feed.push_live(vec![live("alice", "Game A", 10)]);

    let cancel = CancellationToken::new();
    let task = tokio::spawn(h.scheduler.clone().run(cancel.clone()));
    h.feed.entered.notified().await;

    cancel.cancel();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!task.is_finished());
    assert!(h.scheduler.is_cycle_running());

    gate.notify_one();
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("scheduler should stop after the cycle")
        .unwrap();

    assert_eq!(h.scheduler.cycles_run(), 1);
    assert!(h.tracker.get(&id("alice")).unwrap().is_live);
    assert_eq!(h.channel.messages().len(), 1);
}

#[tokio::test]
async fn test_panicking_cycle_does_not_stop_loop() {
    let config = SchedulerConfig {
        poll_interval: Duration::from_millis(20),
        handshake_retry: RetryPolicy::no_retry(),
    };
    let h = Harness::with_config(&["alice"], config).await;
    h.feed.panic_next.store(true, std::sync::atomic::Ordering::SeqCst);
    h.feed.push_live(vec![live("alice", "Game A", 10)]);

    let cancel = CancellationToken::new();
    let task = tokio::spawn(h.scheduler.clone().run(cancel.clone()));
    tokio::time::sleep(Duration::from_millis(150)).await;
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("scheduler should stop")
        .unwrap();

    assert!(!h.feed.panic_next.load(std::sync::atomic::Ordering::SeqCst));
    assert!(h.scheduler.cycles_run() >= 1);
    // The script survived the panic and was played by a later cycle.
    assert_eq!(h.feed.fetches(), h.scheduler.cycles_run() as usize);
    assert!(
        h.channel
            .messages()
            .iter()
            .any(|(_, content)| !content.embeds.is_empty())
    );
}
