//! Errors surfaced to the host and errors recovered inside the poll loop.

/// Boxed error from an external collaborator (broker client library, connector).
pub type StdError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias defaulting to this crate's [`Error`]
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that stop startup or a collection cycle. These reach the host.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The configuration text is not valid for this input
    #[error("could not read configuration: {0}")]
    ConfigSyntax(#[from] toml::de::Error),

    /// The broker client could not be built or could not reach the cluster
    #[error("could not connect to brokers {brokers}: {source}")]
    Connection {
        brokers: String,
        #[source]
        source: StdError,
    },

    /// The broker rejected the topic subscription
    #[error("could not subscribe to topics {topics:?}: {source}")]
    Subscription {
        topics: Vec<String>,
        #[source]
        source: StdError,
    },

    /// The background poll worker could not be started
    #[error("could not start the poll worker: {0}")]
    Spawn(#[source] std::io::Error),
}

/// A payload the parser could not turn into records. Logged and skipped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ParseError {
    message: String,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// An error event reported by the broker client during a poll. Logged and skipped.
///
/// Rebalance notices, transient disconnects and the like arrive this way; none of
/// them stop ingestion.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct BrokerEventError {
    message: String,
}

impl BrokerEventError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
