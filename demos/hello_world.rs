//! Publishes ten messages on `hello_world` and prints them as they come back.
//!
//! In-memory by default. Against a broker:
//!
//! ```sh
//! MESSENGER_DRIVER__KIND=kafka MESSENGER_DRIVER__BROKERS=localhost:9092 \
//!     cargo run --example hello_world --features kafka
//! ```

use std::time::Duration;

use messenger::config::{DriverKind, Settings};
use messenger::probe::wait_for_tcp;
use messenger::{handler_fn, Message, Messenger};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const TOPIC: &str = "hello_world";
const SERVICE_ID: &str = "hello-world";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::load()?;
    let root = CancellationToken::new();

    if settings.driver.kind == DriverKind::Kafka {
        if let Some(broker) = settings.driver.primary_broker() {
            wait_for_tcp(broker, Duration::from_secs(2), &root).await?;
        }
    }

    let messenger = std::sync::Arc::new(Messenger::new(
        settings.driver.build()?,
        settings.logger.build()?,
    ));

    let consumer = messenger.spawn_consumer(
        TOPIC,
        SERVICE_ID,
        handler_fn("hello_world_handler", |msg| {
            println!("{}: {:?}", msg.topic(), msg.get("number"));
            Ok(())
        }),
        &root,
    );
    let dispatcher = messenger.spawn_dispatcher(root.clone());

    for i in 0..10 {
        let message = Message::encode(TOPIC, &json!({ "number": i.to_string() }))?;
        messenger.dispatch(&message).await?;
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");

    consumer.stop().await;
    root.cancel();
    let stats = dispatcher.await??;
    tracing::info!(
        received = stats.received,
        handled = stats.handled,
        failed = stats.failed,
        "dispatch loop stopped"
    );
    Ok(())
}
