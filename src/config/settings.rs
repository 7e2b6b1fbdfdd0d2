use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration settings for the application.
///
/// Groups the client identity, subscriber behaviour, the in-process broker,
/// the flow-controlled pipeline and logging.
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct Settings {
    pub client: ClientSettings,
    pub subscriber: SubscriberSettings,
    pub broker: BrokerSettings,
    pub flow: FlowSettings,
    pub logging: LoggingSettings,
}

/// Identity of the client against the messaging backend.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ClientSettings {
    pub project: String,
    /// Path to a credential file. Resolved by the transport, not by this crate.
    pub credentials: Option<String>,
}

/// Subscription channel and service behaviour.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SubscriberSettings {
    /// Maximum number of handler invocations running at once per channel.
    pub max_outstanding: usize,
    /// Whether `SubscriptionService::run` listens for SIGINT/SIGTERM.
    pub handle_signals: bool,
}

/// In-process broker tuning.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BrokerSettings {
    pub ack_deadline_ms: u64,
    pub max_delivery_attempts: u32,
    pub redelivery_interval_ms: u64,
    /// Artificial delay before a publish is committed.
    pub publish_latency_ms: u64,
}

/// Bounded producer/consumer pipeline parameters.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct FlowSettings {
    pub queue_capacity: usize,
    pub workers: usize,
    pub io_delay_ms: u64,
    pub grace_period_ms: u64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level: String,
}

impl BrokerSettings {
    pub fn ack_deadline(&self) -> Duration {
        Duration::from_millis(self.ack_deadline_ms)
    }

    /// Never zero, so it can drive a `tokio::time::interval`.
    pub fn redelivery_interval(&self) -> Duration {
        Duration::from_millis(self.redelivery_interval_ms.max(1))
    }

    pub fn publish_latency(&self) -> Duration {
        Duration::from_millis(self.publish_latency_ms)
    }
}

impl FlowSettings {
    pub fn io_delay(&self) -> Duration {
        Duration::from_millis(self.io_delay_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            project: "local-project".to_string(),
            credentials: None,
        }
    }
}

impl Default for SubscriberSettings {
    fn default() -> Self {
        Self {
            max_outstanding: 1,
            handle_signals: true,
        }
    }
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            ack_deadline_ms: 10_000,
            max_delivery_attempts: 5,
            redelivery_interval_ms: 1_000,
            publish_latency_ms: 0,
        }
    }
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 100,
            workers: 20,
            io_delay_ms: 3_000,
            grace_period_ms: 3_000,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values are filled from
/// the defaults above.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub client: Option<PartialClientSettings>,
    pub subscriber: Option<PartialSubscriberSettings>,
    pub broker: Option<PartialBrokerSettings>,
    pub flow: Option<PartialFlowSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialClientSettings {
    pub project: Option<String>,
    pub credentials: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialSubscriberSettings {
    pub max_outstanding: Option<usize>,
    pub handle_signals: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialBrokerSettings {
    pub ack_deadline_ms: Option<u64>,
    pub max_delivery_attempts: Option<u32>,
    pub redelivery_interval_ms: Option<u64>,
    pub publish_latency_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialFlowSettings {
    pub queue_capacity: Option<usize>,
    pub workers: Option<usize>,
    pub io_delay_ms: Option<u64>,
    pub grace_period_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

impl PartialSettings {
    /// Merges what was loaded over `Settings::default()`.
    pub fn merge(self) -> Settings {
        let default = Settings::default();
        let client = self.client.unwrap_or_default();
        let subscriber = self.subscriber.unwrap_or_default();
        let broker = self.broker.unwrap_or_default();
        let flow = self.flow.unwrap_or_default();
        let logging = self.logging.unwrap_or_default();

        Settings {
            client: ClientSettings {
                project: client.project.unwrap_or(default.client.project),
                credentials: client.credentials.or(default.client.credentials),
            },
            subscriber: SubscriberSettings {
                max_outstanding: subscriber
                    .max_outstanding
                    .unwrap_or(default.subscriber.max_outstanding),
                handle_signals: subscriber
                    .handle_signals
                    .unwrap_or(default.subscriber.handle_signals),
            },
            broker: BrokerSettings {
                ack_deadline_ms: broker
                    .ack_deadline_ms
                    .unwrap_or(default.broker.ack_deadline_ms),
                max_delivery_attempts: broker
                    .max_delivery_attempts
                    .unwrap_or(default.broker.max_delivery_attempts),
                redelivery_interval_ms: broker
                    .redelivery_interval_ms
                    .unwrap_or(default.broker.redelivery_interval_ms),
                publish_latency_ms: broker
                    .publish_latency_ms
                    .unwrap_or(default.broker.publish_latency_ms),
            },
            flow: FlowSettings {
                queue_capacity: flow.queue_capacity.unwrap_or(default.flow.queue_capacity),
                workers: flow.workers.unwrap_or(default.flow.workers),
                io_delay_ms: flow.io_delay_ms.unwrap_or(default.flow.io_delay_ms),
                grace_period_ms: flow.grace_period_ms.unwrap_or(default.flow.grace_period_ms),
            },
            logging: LoggingSettings {
                level: logging.level.unwrap_or(default.logging.level),
            },
        }
    }
}
