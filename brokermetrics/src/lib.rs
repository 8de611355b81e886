//! Broker-fed metric ingestion for polling collection agents.
//!
//! [`brokermetrics`](crate) subscribes to topics on a Kafka-compatible broker, such
//! as Confluent Cloud, parses every message into [`MetricRecord`]s and holds them
//! until the host's next collection. A dedicated thread does the polling; the host
//! only ever calls [`Collector::collect`] on its own schedule.
//!
//! A malformed message or a broker hiccup is logged and counted, never fatal. Only
//! configuration, connection and subscription problems surface as errors, and only
//! from [`Collector::initialize`].
//!
//! # Getting Started
//!
//! Build a [`ConsumerConfig`] (or parse one from TOML, see
//! [`config::SAMPLE_CONFIG`]), pick a [`broker::BrokerConnector`] and a
//! [`RecordParser`], then hand records to any [`Accumulator`].
//!
//! # Feature Flags
//!
//! * `rdkafka`: [`broker::KafkaConnector`], a librdkafka-backed consumer.
//! * `ahash-hasher`: use ahash for tag and field maps.

pub mod accumulator;
pub mod broker;
pub mod buffer;
pub mod config;
pub mod error;
pub mod parser;
pub mod stats;
pub mod types;

mod collector;
mod poll_loop;

#[cfg(test)]
mod test_support;

pub use accumulator::Accumulator;
pub use buffer::IngestionBuffer;
pub use collector::Collector;
pub use config::ConsumerConfig;
pub use error::{BrokerEventError, Error, ParseError, Result, StdError};
pub use parser::RecordParser;
pub use types::{Batch, FieldSet, FieldValue, MetricRecord, Name, TagSet};
