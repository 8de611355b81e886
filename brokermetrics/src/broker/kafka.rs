use std::time::Duration;

use bytes::Bytes;
use rdkafka::{
    config::ClientConfig,
    consumer::{BaseConsumer, Consumer},
    Message,
};

use crate::{config::ValidatedConfig, error::StdError, BrokerEventError};

use super::{BrokerClient, BrokerConnector, BrokerEvent, MessageOrigin, RawMessage};

/// Connects to Kafka-protocol clusters (Confluent Cloud included) through librdkafka.
#[derive(Debug, Clone, Copy, Default)]
pub struct KafkaConnector;

impl BrokerConnector for KafkaConnector {
    type Client = KafkaClient;

    fn connect(&self, config: &ValidatedConfig) -> Result<Self::Client, StdError> {
        let mut client_config = ClientConfig::new();
        for (key, value) in config.client_properties() {
            client_config.set(key, value);
        }
        let consumer: BaseConsumer = client_config.create()?;
        log::info!("created kafka consumer for {}", config.brokers().join(","));
        Ok(KafkaClient { consumer })
    }
}

/// A librdkafka consumer driven by explicit polls
pub struct KafkaClient {
    consumer: BaseConsumer,
}

impl BrokerClient for KafkaClient {
    fn subscribe(&mut self, topics: &[String]) -> Result<(), StdError> {
        let topics: Vec<&str> = topics.iter().map(String::as_str).collect();
        self.consumer.subscribe(&topics)?;
        Ok(())
    }

    fn poll(&mut self, timeout: Duration) -> Option<BrokerEvent> {
        let event = match self.consumer.poll(timeout)? {
            Ok(message) => BrokerEvent::Message(RawMessage::new(
                Bytes::copy_from_slice(message.payload().unwrap_or_default()),
                MessageOrigin::new(message.topic(), message.partition(), message.offset()),
            )),
            Err(error) => BrokerEvent::Error(BrokerEventError::new(error.to_string())),
        };
        Some(event)
    }
}
