use std::sync::Arc;

use messenger::{DriverError, Message};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::support::{message, messenger, next, wait_until, within, RecordingHandler};

#[tokio::test(flavor = "multi_thread")]
async fn dispatches_reach_driver_in_order() {
    let (messenger, driver, _logger) = messenger();

    for i in 0..10 {
        let msg = message("hello_world", json!({ "number": i.to_string() }));
        messenger.dispatch(&msg).await.unwrap();
    }

    let numbers: Vec<String> = driver
        .dispatched()
        .iter()
        .map(|m| m.get_str("number").unwrap().to_string())
        .collect();
    let expected: Vec<String> = (0..10).map(|i| i.to_string()).collect();
    assert_eq!(numbers, expected);
    assert!(driver.dispatched_topics().iter().all(|t| t == "hello_world"));
}

#[tokio::test(flavor = "multi_thread")]
async fn dispatch_is_unaffected_by_registry_churn() {
    let (messenger, driver, _logger) = messenger();
    let root = CancellationToken::new();

    let churn = {
        let messenger = Arc::clone(&messenger);
        let root = root.clone();
        tokio::spawn(async move {
            for i in 0..50 {
                let (handler, _rx) = RecordingHandler::new(&format!("h{i}"));
                messenger.spawn_consumer("churn", "svc", handler, &root);
                messenger.stop_topic("churn");
                tokio::task::yield_now().await;
            }
        })
    };

    for i in 0..50 {
        messenger
            .dispatch(&message("audit", json!({ "seq": i })))
            .await
            .unwrap();
    }
    within(churn).await.unwrap();

    let dispatched = driver.dispatched();
    assert_eq!(dispatched.len(), 50);
    assert!(dispatched
        .iter()
        .enumerate()
        .all(|(i, m)| m.get("seq") == Some(&json!(i))));
    root.cancel();
}

#[tokio::test(flavor = "multi_thread")]
async fn orders_message_is_logged_then_handled() {
    let (messenger, driver, logger) = messenger();
    let root = CancellationToken::new();
    let (handler, mut rx) = RecordingHandler::new("h1");

    let consumer = messenger.spawn_consumer("orders", "svc", handler, &root);
    let dispatcher = messenger.spawn_dispatcher(root.clone());

    let sent = message("orders", json!({"id": "42"}));
    driver.inject(sent.clone()).await.unwrap();

    let handled = next(&mut rx).await;
    assert_eq!(handled.payload(), sent.payload());
    assert_eq!(handled.get_str("id"), Some("42"));
    assert_eq!(logger.messages(), vec![sent]);

    consumer.stop().await;
    root.cancel();
    within(dispatcher).await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn every_handler_on_a_topic_is_invoked_once() {
    let (messenger, driver, _logger) = messenger();
    let root = CancellationToken::new();
    let (h1, mut rx1) = RecordingHandler::new("h1");
    let (h2, mut rx2) = RecordingHandler::new("h2");

    messenger.spawn_consumer("orders", "svc", h1, &root);
    messenger.spawn_consumer("orders", "svc", h2, &root);
    let dispatcher = messenger.spawn_dispatcher(root.clone());

    let sent = message("orders", json!({"id": "1"}));
    driver.inject(sent.clone()).await.unwrap();
    let marker = message("orders", json!({"id": "2"}));
    driver.inject(marker.clone()).await.unwrap();

    // Each handler sees the first message exactly once, then the second.
    assert_eq!(next(&mut rx1).await, sent);
    assert_eq!(next(&mut rx1).await, marker);
    assert_eq!(next(&mut rx2).await, sent);
    assert_eq!(next(&mut rx2).await, marker);

    root.cancel();
    let stats = within(dispatcher).await.unwrap().unwrap();
    assert_eq!(stats.received, 2);
    assert_eq!(stats.handled, 4);
    messenger.stop_all();
}

#[tokio::test(flavor = "multi_thread")]
async fn messages_without_handlers_are_logged_and_counted() {
    let (messenger, driver, logger) = messenger();
    let root = CancellationToken::new();
    let dispatcher = messenger.spawn_dispatcher(root.clone());

    driver
        .inject(message("nobody-listens", json!({"x": 1})))
        .await
        .unwrap();
    wait_until(|| logger.count() == 1).await;

    root.cancel();
    let stats = within(dispatcher).await.unwrap().unwrap();
    assert_eq!(stats.received, 1);
    assert_eq!(stats.unrouted, 1);
    assert_eq!(stats.handled, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_wire_payload_reaches_handler_as_empty_map() {
    let (messenger, driver, _logger) = messenger();
    let root = CancellationToken::new();
    let (handler, mut rx) = RecordingHandler::new("h1");
    messenger.spawn_consumer("raw", "svc", handler, &root);
    let dispatcher = messenger.spawn_dispatcher(root.clone());

    driver
        .inject(Message::from_wire("raw", b"{definitely not json").unwrap())
        .await
        .unwrap();
    driver
        .inject(Message::from_wire("raw", b"[1, 2, 3]").unwrap())
        .await
        .unwrap();

    assert!(next(&mut rx).await.payload().is_empty());
    assert!(next(&mut rx).await.payload().is_empty());

    root.cancel();
    within(dispatcher).await.unwrap().unwrap();
    messenger.stop_all();
}

#[tokio::test(flavor = "multi_thread")]
async fn driver_errors_are_returned_from_dispatch() {
    let (messenger, driver, _logger) = messenger();
    driver.close();

    let err = messenger
        .dispatch(&message("orders", json!({"id": "1"})))
        .await
        .unwrap_err();
    assert!(matches!(err, DriverError::Closed));
    assert!(driver.dispatched().is_empty());
}
