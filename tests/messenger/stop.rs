use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::support::{assert_quiet, message, messenger, wait_until, within, RecordingHandler};

#[tokio::test(flavor = "multi_thread")]
async fn stop_consumer_cancels_and_clears_the_topic() {
    let (messenger, _driver, _logger) = messenger();
    let root = CancellationToken::new();
    let (h1, _rx1) = RecordingHandler::new("h1");
    let (h2, _rx2) = RecordingHandler::new("h2");
    let (h3, _rx3) = RecordingHandler::new("h3");

    let c1 = messenger.spawn_consumer("orders", "svc", h1, &root);
    let c2 = messenger.spawn_consumer("orders", "svc", h2, &root);
    let other = messenger.spawn_consumer("payments", "svc", h3, &root);

    assert_eq!(messenger.stop_consumer("orders", "h1"), 2);

    assert!(c1.is_cancelled());
    assert!(c2.is_cancelled());
    assert!(!other.is_cancelled());
    assert!(!messenger.has_topic("orders"));
    assert_eq!(messenger.topics(), vec!["payments"]);

    within(c1.join()).await;
    within(c2.join()).await;
    other.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_consumer_on_unknown_topic_is_a_no_op() {
    let (messenger, _driver, _logger) = messenger();
    let root = CancellationToken::new();
    let (handler, _rx) = RecordingHandler::new("h1");
    let consumer = messenger.spawn_consumer("orders", "svc", handler, &root);

    assert_eq!(messenger.stop_consumer("nonexistent", "h1"), 0);
    assert_eq!(messenger.stop_topic("nonexistent"), 0);
    assert!(!messenger.stop_handler("nonexistent", "h1"));

    assert!(!consumer.is_cancelled());
    assert_eq!(messenger.subscription_count(), 1);
    consumer.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn stopped_handler_receives_nothing_further() {
    let (messenger, driver, logger) = messenger();
    let root = CancellationToken::new();
    let (handler, mut rx) = RecordingHandler::new("h1");
    let consumer = messenger.spawn_consumer("orders", "svc", handler, &root);
    let dispatcher = messenger.spawn_dispatcher(root.clone());

    assert!(messenger.stop_handler("orders", "h1"));
    within(consumer.join()).await;

    driver
        .inject(message("orders", json!({"id": "late"})))
        .await
        .unwrap();
    wait_until(|| logger.count() == 1).await;
    assert_quiet(&mut rx).await;

    root.cancel();
    let stats = within(dispatcher).await.unwrap().unwrap();
    assert_eq!(stats.unrouted, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn cancelling_the_dispatcher_leaves_subscriptions_alone() {
    let (messenger, _driver, _logger) = messenger();
    let root = CancellationToken::new();
    let subscriptions = CancellationToken::new();
    let (handler, _rx) = RecordingHandler::new("h1");

    let consumer = messenger.spawn_consumer("orders", "svc", handler, &subscriptions);
    let dispatcher = messenger.spawn_dispatcher(root.clone());

    root.cancel();
    within(dispatcher).await.unwrap().unwrap();

    assert!(!consumer.is_cancelled());
    assert!(messenger.is_subscribed("orders", "h1"));

    assert_eq!(messenger.stop_all(), 1);
    within(consumer.join()).await;
    assert_eq!(messenger.subscription_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_all_cancels_every_topic() {
    let (messenger, driver, _logger) = messenger();
    let root = CancellationToken::new();
    let mut consumers = Vec::new();
    for topic in ["a", "b", "c"] {
        let (handler, _rx) = RecordingHandler::new("h");
        consumers.push(messenger.spawn_consumer(topic, "svc", handler, &root));
    }

    assert_eq!(messenger.stop_all(), 3);
    for consumer in consumers {
        assert!(consumer.is_cancelled());
        within(consumer.join()).await;
    }
    assert!(messenger.topics().is_empty());
    wait_until(|| ["a", "b", "c"].iter().all(|t| driver.active_groups(t).is_empty())).await;
}
