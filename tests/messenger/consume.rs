use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::support::{assert_quiet, message, messenger, next, wait_until, within, RecordingHandler};

#[tokio::test(flavor = "multi_thread")]
async fn handler_receives_arriving_message_once() {
    let (messenger, driver, _logger) = messenger();
    let root = CancellationToken::new();
    let (handler, mut rx) = RecordingHandler::new("h1");

    let consumer = messenger.spawn_consumer("orders", "svc", handler, &root);
    let dispatcher = messenger.spawn_dispatcher(root.clone());

    let sent = message("orders", json!({"id": "42"}));
    driver.inject(sent.clone()).await.unwrap();

    assert_eq!(next(&mut rx).await, sent);
    assert_quiet(&mut rx).await;

    consumer.stop().await;
    root.cancel();
    let stats = within(dispatcher).await.unwrap().unwrap();
    assert_eq!(stats.received, 1);
    assert_eq!(stats.handled, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_registrations_each_reach_the_driver() {
    let (messenger, driver, _logger) = messenger();
    let root = CancellationToken::new();
    let topics: Vec<String> = (0..8).map(|i| format!("topic-{i}")).collect();

    let mut tasks = tokio::task::JoinSet::new();
    for topic in &topics {
        let messenger = Arc::clone(&messenger);
        let topic = topic.clone();
        let root = root.clone();
        tasks.spawn(async move {
            let (handler, _rx) = RecordingHandler::new("h");
            messenger.consume(&topic, "svc", handler, &root).await;
        });
    }

    wait_until(|| driver.consume_calls() == topics.len()).await;
    assert_eq!(messenger.subscription_count(), topics.len());

    let mut consumed = driver.consumed_topics();
    consumed.sort();
    let mut expected = topics.clone();
    expected.sort();
    assert_eq!(consumed, expected);

    root.cancel();
    while let Some(joined) = within(tasks.join_next()).await {
        joined.unwrap();
    }
    assert_eq!(messenger.subscription_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn reregistering_replaces_and_cancels_previous() {
    let (messenger, driver, _logger) = messenger();
    let root = CancellationToken::new();
    let (first, mut first_rx) = RecordingHandler::new("h1");
    let (second, mut second_rx) = RecordingHandler::new("h1");

    let old = messenger.spawn_consumer("orders", "svc", first, &root);
    let new = messenger.spawn_consumer("orders", "svc", second, &root);

    assert!(old.is_cancelled());
    assert!(!new.is_cancelled());
    within(old.join()).await;

    // The old task ending must not remove the newer registration.
    assert!(messenger.is_subscribed("orders", "h1"));
    assert_eq!(messenger.subscription_count(), 1);

    let dispatcher = messenger.spawn_dispatcher(root.clone());
    let sent = message("orders", json!({"id": "1"}));
    driver.inject(sent.clone()).await.unwrap();

    assert_eq!(next(&mut second_rx).await, sent);
    assert_quiet(&mut first_rx).await;

    root.cancel();
    within(new.join()).await;
    within(dispatcher).await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_driver_subscription_is_unregistered() {
    let (messenger, driver, _logger) = messenger();
    driver.close();
    let (handler, _rx) = RecordingHandler::new("h1");

    let consumer = messenger.spawn_consumer("orders", "svc", handler, &CancellationToken::new());
    within(consumer.join()).await;

    assert!(!messenger.has_topic("orders"));
    assert_eq!(driver.consume_calls(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn handlers_sharing_a_group_each_see_a_dispatch_once() {
    let (messenger, driver, _logger) = messenger();
    let root = CancellationToken::new();
    let (h1, mut rx1) = RecordingHandler::new("h1");
    let (h2, mut rx2) = RecordingHandler::new("h2");

    let c1 = messenger.spawn_consumer("orders", "svc", h1, &root);
    let c2 = messenger.spawn_consumer("orders", "svc", h2, &root);
    let dispatcher = messenger.spawn_dispatcher(root.clone());
    wait_until(|| driver.consume_calls() == 2).await;
    wait_until(|| driver.active_groups("orders") == vec!["svc".to_string()]).await;

    let sent = message("orders", json!({"id": "7"}));
    messenger.dispatch(&sent).await.unwrap();

    assert_eq!(next(&mut rx1).await, sent);
    assert_eq!(next(&mut rx2).await, sent);
    assert_quiet(&mut rx1).await;
    assert_quiet(&mut rx2).await;

    root.cancel();
    within(c1.join()).await;
    within(c2.join()).await;
    within(dispatcher).await.unwrap().unwrap();
    assert!(driver.active_groups("orders").is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn dropping_a_consume_future_unregisters_it() {
    let (messenger, driver, logger) = messenger();
    let root = CancellationToken::new();
    let (handler, mut rx) = RecordingHandler::new("h1");

    let timed_out = tokio::time::timeout(
        std::time::Duration::from_millis(50),
        messenger.consume("orders", "svc", handler, &root),
    )
    .await;
    assert!(timed_out.is_err());
    assert_eq!(driver.consume_calls(), 1);

    assert!(!messenger.is_subscribed("orders", "h1"));
    assert_eq!(messenger.subscription_count(), 0);
    assert!(driver.active_groups("orders").is_empty());

    let dispatcher = messenger.spawn_dispatcher(root.clone());
    driver
        .inject(message("orders", json!({"id": "stale"})))
        .await
        .unwrap();
    wait_until(|| logger.count() == 1).await;
    assert_quiet(&mut rx).await;

    root.cancel();
    let stats = within(dispatcher).await.unwrap().unwrap();
    assert_eq!(stats.unrouted, 1);
}
