//! Consumer configuration: the TOML plugin block, its defaults and its validation.

use std::{collections::BTreeMap, fmt::Debug, num::NonZeroUsize, str::FromStr, time::Duration};

use serde::{Deserialize, Deserializer};

use crate::{
    buffer::{BufferLimit, OverflowPolicy},
    error::{Error, Result},
};

/// Broker-side session timeout used when none is configured
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_millis(6000);
/// Where to start consuming when the group has no committed offset
pub const DEFAULT_AUTO_OFFSET_RESET: OffsetReset = OffsetReset::Earliest;
/// How long one broker poll may block
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(100);
/// First wait after a poll that returned nothing
pub const DEFAULT_IDLE_BACKOFF_MIN: Duration = Duration::from_millis(1);
/// Longest wait between polls while the broker is idle
pub const DEFAULT_IDLE_BACKOFF_MAX: Duration = Duration::from_millis(100);
/// The parser name assumed when the host does not name one
pub const DEFAULT_DATA_FORMAT: &str = "influx";

/// One-line description for the host's plugin listing
pub const DESCRIPTION: &str = "Consume metrics from Confluent Cloud or any Kafka-protocol broker.";

/// The plugin block a host would show as this input's sample configuration.
pub const SAMPLE_CONFIG: &str = r#"
  ## Broker(s) of the cluster. Provide a comma separated list or a list of strings.
  brokers = "localhost:9092"

  ## Topics to consume from
  topics = ["test"]

  ## Consumer group
  consumer_group = "my-group"

  ## Security protocol: PLAINTEXT, SSL, SASL_PLAINTEXT or SASL_SSL
  security_protocol = "SASL_SSL"

  ## SASL mechanism
  sasl_mechanisms = "PLAIN"

  ## Confluent Cloud authentication
  confluent_api_key = "my-api-key"
  confluent_api_secret = "my-api-secret"

  ## Session timeout (ms)
  session_timeout = 6000

  ## Auto offset reset. Can be set to earliest or latest
  auto_offset_reset = "earliest"

  ## How long a single broker poll may block (ms)
  # poll_timeout_ms = 100

  ## Wait between polls while no messages arrive; doubles from min up to max (ms)
  # idle_backoff_min_ms = 1
  # idle_backoff_max_ms = 100

  ## Cap on batches held between collections. Unset means unbounded.
  ## When full, "drop_oldest" evicts the oldest batch and "block" pauses consumption.
  # max_buffered_batches = 10000
  # buffer_overflow = "drop_oldest"

  ## Data format to consume.
  data_format = "json"
"#;

/// Offset policy used when a consumer group has no committed offset
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OffsetReset {
    /// Start at the oldest retained message
    Earliest,
    /// Start at the next message produced
    Latest,
}

impl OffsetReset {
    pub fn as_str(&self) -> &'static str {
        match self {
            OffsetReset::Earliest => "earliest",
            OffsetReset::Latest => "latest",
        }
    }

    fn parse(value: &str) -> Result<Option<Self>> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" => Ok(None),
            // librdkafka's aliases
            "earliest" | "smallest" | "beginning" => Ok(Some(OffsetReset::Earliest)),
            "latest" | "largest" | "end" => Ok(Some(OffsetReset::Latest)),
            other => Err(Error::Config(format!(
                "auto_offset_reset must be earliest or latest, not {other:?}"
            ))),
        }
    }
}

/// Transport security between client and brokers. Case does not matter in config.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum SecurityProtocol {
    Plaintext,
    Ssl,
    SaslPlaintext,
    SaslSsl,
}

impl SecurityProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityProtocol::Plaintext => "PLAINTEXT",
            SecurityProtocol::Ssl => "SSL",
            SecurityProtocol::SaslPlaintext => "SASL_PLAINTEXT",
            SecurityProtocol::SaslSsl => "SASL_SSL",
        }
    }
}

impl FromStr for SecurityProtocol {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        [
            SecurityProtocol::Plaintext,
            SecurityProtocol::Ssl,
            SecurityProtocol::SaslPlaintext,
            SecurityProtocol::SaslSsl,
        ]
        .into_iter()
        .find(|protocol| protocol.as_str().eq_ignore_ascii_case(value.trim()))
        .ok_or_else(|| {
            Error::Config(format!(
                "security_protocol must be plaintext, ssl, sasl_plaintext or sasl_ssl, not {value:?}"
            ))
        })
    }
}

impl TryFrom<String> for SecurityProtocol {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// The consumer configuration as the host hands it over: every option may be unset.
///
/// Call [`ConsumerConfig::validate`] (or let [`crate::Collector::initialize`] do it)
/// to apply defaults and check invariants.
#[derive(Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsumerConfig {
    /// Broker addresses. In TOML, either a list or a comma separated string.
    #[serde(default, deserialize_with = "deserialize_brokers")]
    pub brokers: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    pub consumer_group: Option<String>,
    pub security_protocol: Option<SecurityProtocol>,
    pub sasl_mechanisms: Option<String>,
    #[serde(alias = "confluent_api_key")]
    pub api_key: Option<String>,
    #[serde(alias = "confluent_api_secret")]
    pub api_secret: Option<String>,
    /// Milliseconds. Unset or 0 means the default.
    pub session_timeout: Option<u64>,
    /// `earliest` or `latest`. Unset or empty means the default.
    pub auto_offset_reset: Option<String>,
    /// Name of the parser the host wires in. Carried through untouched.
    pub data_format: Option<String>,
    pub poll_timeout_ms: Option<u64>,
    pub idle_backoff_min_ms: Option<u64>,
    pub idle_backoff_max_ms: Option<u64>,
    pub max_buffered_batches: Option<usize>,
    pub buffer_overflow: Option<OverflowPolicy>,
}

impl Debug for ConsumerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerConfig")
            .field("brokers", &self.brokers)
            .field("topics", &self.topics)
            .field("consumer_group", &self.consumer_group)
            .field("security_protocol", &self.security_protocol)
            .field("sasl_mechanisms", &self.sasl_mechanisms)
            .field("api_key", &self.api_key)
            .field("api_secret", &self.api_secret.as_ref().map(|_| "<redacted>"))
            .field("session_timeout", &self.session_timeout)
            .field("auto_offset_reset", &self.auto_offset_reset)
            .field("data_format", &self.data_format)
            .field("poll_timeout_ms", &self.poll_timeout_ms)
            .field("idle_backoff_min_ms", &self.idle_backoff_min_ms)
            .field("idle_backoff_max_ms", &self.idle_backoff_max_ms)
            .field("max_buffered_batches", &self.max_buffered_batches)
            .field("buffer_overflow", &self.buffer_overflow)
            .finish()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BrokerList {
    Joined(String),
    List(Vec<String>),
}

fn deserialize_brokers<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match BrokerList::deserialize(deserializer)? {
        BrokerList::Joined(joined) => joined.split(',').map(str::to_owned).collect(),
        BrokerList::List(list) => list,
    })
}

impl ConsumerConfig {
    /// Read the plugin block from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Apply defaults and check invariants.
    pub fn validate(self) -> Result<ValidatedConfig> {
        let brokers: Vec<String> = self
            .brokers
            .iter()
            .map(|broker| broker.trim())
            .filter(|broker| !broker.is_empty())
            .map(str::to_owned)
            .collect();
        if brokers.is_empty() {
            return Err(Error::Config("at least one broker is required".to_string()));
        }

        if self.topics.is_empty() {
            return Err(Error::Config("at least one topic is required".to_string()));
        }
        if self.topics.iter().any(|topic| topic.trim().is_empty()) {
            return Err(Error::Config("topic names must not be empty".to_string()));
        }

        let credentials = match (self.api_key, self.api_secret) {
            (Some(username), Some(password)) => Some(Credentials { username, password }),
            (None, None) => None,
            _ => {
                return Err(Error::Config(
                    "api_key and api_secret must be set together".to_string(),
                ))
            }
        };

        let session_timeout = match self.session_timeout {
            None | Some(0) => DEFAULT_SESSION_TIMEOUT,
            Some(millis) => Duration::from_millis(millis),
        };
        let auto_offset_reset = match self.auto_offset_reset.as_deref() {
            None => DEFAULT_AUTO_OFFSET_RESET,
            Some(value) => OffsetReset::parse(value)?.unwrap_or(DEFAULT_AUTO_OFFSET_RESET),
        };

        let ingestion = IngestionOptions {
            poll_timeout: self
                .poll_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_POLL_TIMEOUT),
            idle_backoff_min: self
                .idle_backoff_min_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_IDLE_BACKOFF_MIN),
            idle_backoff_max: self
                .idle_backoff_max_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_IDLE_BACKOFF_MAX),
            buffer_limit: match self.max_buffered_batches {
                None => {
                    if self.buffer_overflow.is_some() {
                        log::warn!("buffer_overflow has no effect without max_buffered_batches");
                    }
                    BufferLimit::Unbounded
                }
                Some(max_batches) => BufferLimit::Bounded {
                    max_batches: NonZeroUsize::new(max_batches).ok_or_else(|| {
                        Error::Config("max_buffered_batches must be at least 1".to_string())
                    })?,
                    overflow: self.buffer_overflow.unwrap_or_default(),
                },
            },
        };
        if ingestion.idle_backoff_min.is_zero() {
            return Err(Error::Config(
                "idle_backoff_min_ms must be at least 1".to_string(),
            ));
        }
        if ingestion.idle_backoff_max < ingestion.idle_backoff_min {
            return Err(Error::Config(
                "idle_backoff_max_ms must not be less than idle_backoff_min_ms".to_string(),
            ));
        }

        Ok(ValidatedConfig {
            brokers,
            topics: self.topics,
            consumer_group: self.consumer_group.filter(|group| !group.is_empty()),
            security_protocol: self.security_protocol,
            sasl_mechanisms: self
                .sasl_mechanisms
                .filter(|mechanisms| !mechanisms.is_empty()),
            credentials,
            session_timeout,
            auto_offset_reset,
            data_format: self
                .data_format
                .unwrap_or_else(|| DEFAULT_DATA_FORMAT.to_string()),
            ingestion,
        })
    }
}

/// SASL username and password. The password never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// How the poll loop and ingestion buffer behave
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IngestionOptions {
    /// Upper bound on a single broker poll. Always finite.
    pub poll_timeout: Duration,
    pub idle_backoff_min: Duration,
    pub idle_backoff_max: Duration,
    pub buffer_limit: BufferLimit,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            idle_backoff_min: DEFAULT_IDLE_BACKOFF_MIN,
            idle_backoff_max: DEFAULT_IDLE_BACKOFF_MAX,
            buffer_limit: BufferLimit::Unbounded,
        }
    }
}

/// A configuration that passed validation, with every default filled in.
#[derive(Clone, Debug)]
pub struct ValidatedConfig {
    brokers: Vec<String>,
    topics: Vec<String>,
    consumer_group: Option<String>,
    security_protocol: Option<SecurityProtocol>,
    sasl_mechanisms: Option<String>,
    credentials: Option<Credentials>,
    session_timeout: Duration,
    auto_offset_reset: OffsetReset,
    data_format: String,
    ingestion: IngestionOptions,
}

impl ValidatedConfig {
    pub fn brokers(&self) -> &[String] {
        &self.brokers
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    pub fn consumer_group(&self) -> Option<&str> {
        self.consumer_group.as_deref()
    }

    pub fn security_protocol(&self) -> Option<SecurityProtocol> {
        self.security_protocol
    }

    pub fn sasl_mechanisms(&self) -> Option<&str> {
        self.sasl_mechanisms.as_deref()
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn session_timeout(&self) -> Duration {
        self.session_timeout
    }

    pub fn auto_offset_reset(&self) -> OffsetReset {
        self.auto_offset_reset
    }

    pub fn data_format(&self) -> &str {
        &self.data_format
    }

    pub fn ingestion(&self) -> &IngestionOptions {
        &self.ingestion
    }

    /// The property map a Kafka-protocol client library expects. Unset options are omitted.
    pub fn client_properties(&self) -> BTreeMap<&'static str, String> {
        let mut properties = BTreeMap::from([
            ("bootstrap.servers", self.brokers.join(",")),
            (
                "session.timeout.ms",
                self.session_timeout.as_millis().to_string(),
            ),
            ("auto.offset.reset", self.auto_offset_reset.as_str().to_string()),
        ]);
        if let Some(group) = &self.consumer_group {
            properties.insert("group.id", group.clone());
        }
        if let Some(protocol) = self.security_protocol {
            properties.insert("security.protocol", protocol.as_str().to_string());
        }
        if let Some(mechanisms) = &self.sasl_mechanisms {
            properties.insert("sasl.mechanisms", mechanisms.clone());
        }
        if let Some(credentials) = &self.credentials {
            properties.insert("sasl.username", credentials.username.clone());
            properties.insert("sasl.password", credentials.password.clone());
        }
        properties
    }
}
