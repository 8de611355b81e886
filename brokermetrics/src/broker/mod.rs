//! The capability interface to a streaming message broker.
//!
//! This crate never speaks a broker protocol itself. A [`BrokerConnector`] builds
//! a [`BrokerClient`] from the validated configuration, and the poll loop owns that
//! client exclusively from then on.

use std::{fmt::Display, time::Duration};

use bytes::Bytes;

use crate::{config::ValidatedConfig, error::StdError, BrokerEventError};

#[cfg(feature = "rdkafka")]
mod kafka;

#[cfg(feature = "rdkafka")]
pub use kafka::{KafkaClient, KafkaConnector};

/// Where a message sat in the broker
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageOrigin {
    /// The topic the message was consumed from
    pub topic: String,
    /// The partition within the topic
    pub partition: i32,
    /// The message's offset within the partition
    pub offset: i64,
}

impl MessageOrigin {
    pub fn new(topic: impl Into<String>, partition: i32, offset: i64) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
        }
    }
}

impl Display for MessageOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]@{}", self.topic, self.partition, self.offset)
    }
}

/// One consumed message: an opaque payload and where it came from.
#[derive(Debug, Clone)]
pub struct RawMessage {
    payload: Bytes,
    origin: MessageOrigin,
}

impl RawMessage {
    pub fn new(payload: impl Into<Bytes>, origin: MessageOrigin) -> Self {
        Self {
            payload: payload.into(),
            origin,
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn origin(&self) -> &MessageOrigin {
        &self.origin
    }

    pub fn into_origin(self) -> MessageOrigin {
        self.origin
    }
}

/// What a single poll can yield
#[derive(Debug)]
pub enum BrokerEvent {
    /// A message arrived
    Message(RawMessage),
    /// The client reported an error for this poll cycle
    Error(BrokerEventError),
}

/// A connected, consuming broker client.
pub trait BrokerClient: Send + 'static {
    /// Subscribe to the named topics. Called once, during initialization.
    fn subscribe(&mut self, topics: &[String]) -> Result<(), StdError>;

    /// Wait at most `timeout` for the next event. `None` means nothing arrived.
    ///
    /// A zero timeout must not block.
    fn poll(&mut self, timeout: Duration) -> Option<BrokerEvent>;
}

/// Builds broker clients from configuration.
///
/// Closures of the form `Fn(&ValidatedConfig) -> Result<Client, StdError>` are connectors.
pub trait BrokerConnector {
    /// The client this connector produces
    type Client: BrokerClient;

    /// Construct a client and connect it to the configured brokers.
    fn connect(&self, config: &ValidatedConfig) -> Result<Self::Client, StdError>;
}

impl<F, TClient> BrokerConnector for F
where
    F: Fn(&ValidatedConfig) -> Result<TClient, StdError>,
    TClient: BrokerClient,
{
    type Client = TClient;

    fn connect(&self, config: &ValidatedConfig) -> Result<Self::Client, StdError> {
        self(config)
    }
}
