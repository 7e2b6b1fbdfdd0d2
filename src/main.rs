//! CLI for pubsub-client
//!
//! Subcommands:
//! - `demo`: publish sample payloads through the in-process broker and
//!   consume them until interrupted
//! - `flow`: run the flow-controlled producer/worker pipeline until interrupted

use std::collections::HashMap;
use std::sync::Arc;

use clap::Parser;
use pubsub_client::broker::Broker;
use pubsub_client::client::{PublisherClient, SubscriberClient};
use pubsub_client::config::{Settings, load_config};
use pubsub_client::flow::FlowControlledPipeline;
use pubsub_client::subscription::{
    DeliveredMessage, HandlerResult, SubscriptionService, termination_signal,
};
use pubsub_client::utils::logging;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "pubsub-client")]
enum Command {
    /// Publish bytes, text and structured data, then consume them
    Demo {
        /// Short topic name, qualified with the configured project
        #[arg(long, default_value = "test-topic")]
        topic: String,
        /// Short subscription name, qualified with the configured project
        #[arg(long, default_value = "test-sub")]
        subscription: String,
    },
    /// Run the bounded producer/worker pipeline
    Flow,
}

#[tokio::main]
async fn main() {
    let cmd = Command::parse();

    let settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            logging::init("info");
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    logging::init(&settings.logging.level);

    let result = match cmd {
        Command::Demo {
            topic,
            subscription,
        } => run_demo(settings, &topic, &subscription).await,
        Command::Flow => run_flow(settings).await,
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }
}

async fn run_demo(
    settings: Settings,
    topic: &str,
    subscription: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        project = %settings.client.project,
        credentials = ?settings.client.credentials,
        "starting demo"
    );

    let broker = Broker::new(settings.broker.clone());
    let cancel = CancellationToken::new();
    let redelivery = broker.spawn_redelivery_loop(cancel.clone());

    let transport = Arc::new(broker);
    let publisher = PublisherClient::new(settings.client.project.clone(), transport.clone());
    let subscriber = SubscriberClient::new(
        settings.client.project.clone(),
        transport,
        settings.subscriber.clone(),
    );

    publisher.create_topic(topic).await?;
    let channel = subscriber.create_subscription(topic, subscription).await?;

    publisher
        .publish(
            topic,
            b"bytes data",
            HashMap::new(),
            Some(Box::new(|message_id: Option<String>| {
                info!(?message_id, "publish callback")
            })),
        )
        .await?;
    publisher
        .publish(topic, "string data", HashMap::new(), None)
        .await?;
    let attributes = HashMap::from([
        ("addition1".to_string(), "test1".to_string()),
        ("addition2".to_string(), "test2".to_string()),
    ]);
    publisher
        .publish(
            topic,
            json!({"f1": 1, "f2": "2", "f3": [3, 4, 5]}),
            attributes,
            None,
        )
        .await?;

    let service = SubscriptionService::new(channel).handle_signals(settings.subscriber.handle_signals);
    if !settings.subscriber.handle_signals {
        let stop = service.stop_token();
        tokio::spawn(async move {
            let signal = termination_signal().await;
            info!(signal, "Shutdown signal received.");
            stop.cancel();
        });
    }

    info!("Listening for messages, press CTRL+C to interrupt.");
    let handler = |message: DeliveredMessage| async move {
        info!(payload = ?message.data, attributes = ?message.attributes, "message received");
        let result: HandlerResult = Ok(true);
        result
    };
    let result = service.run(Some(Arc::new(handler))).await;

    cancel.cancel();
    redelivery.await?;

    let stats = result?;
    info!(
        received = stats.received,
        acked = stats.acked,
        unacked = stats.unacked(),
        "demo finished"
    );
    Ok(())
}

async fn run_flow(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let stop = CancellationToken::new();
    let trigger = stop.clone();
    tokio::spawn(async move {
        let signal = termination_signal().await;
        info!(signal, "Shutdown signal received.");
        trigger.cancel();
    });

    info!("Pipeline running, press CTRL+C to interrupt.");
    let report = FlowControlledPipeline::new(settings.flow).simulate(stop).await;
    info!(
        produced = report.produced,
        consumed = report.consumed,
        "flow finished"
    );
    Ok(())
}
