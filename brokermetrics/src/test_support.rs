//! Scripted broker and parser doubles for unit tests.

use std::{
    collections::{HashSet, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    thread::{self, ThreadId},
    time::{Duration, Instant, SystemTime},
};

use crate::{
    broker::{BrokerClient, BrokerConnector, BrokerEvent, MessageOrigin, RawMessage},
    config::{ConsumerConfig, ValidatedConfig},
    error::StdError,
    BrokerEventError, MetricRecord, ParseError,
};

pub(crate) type LineParser = fn(&[u8]) -> Result<Vec<MetricRecord>, ParseError>;

pub(crate) const LINE_PARSER: LineParser = parse_lines;

/// One record per `<name> <value>` line, stamped at the epoch.
pub(crate) fn parse_lines(payload: &[u8]) -> Result<Vec<MetricRecord>, ParseError> {
    let text = std::str::from_utf8(payload).map_err(|e| ParseError::new(e.to_string()))?;
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| -> Result<MetricRecord, ParseError> {
            let (name, value) = line
                .split_once(' ')
                .ok_or_else(|| ParseError::new(format!("no value in {line:?}")))?;
            let value: f64 = value
                .trim()
                .parse()
                .map_err(|e| ParseError::new(format!("bad value in {line:?}: {e}")))?;
            Ok(MetricRecord::new(
                name.to_string(),
                [("source", "script")],
                [("value", value)],
                SystemTime::UNIX_EPOCH,
            ))
        })
        .collect()
}

pub(crate) fn test_config() -> ConsumerConfig {
    ConsumerConfig {
        brokers: vec!["localhost:9092".to_string()],
        topics: vec!["test".to_string()],
        ..Default::default()
    }
}

/// Spin until `condition` holds, for up to 5 seconds.
pub(crate) fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

#[derive(Debug, Default)]
struct Probe {
    polls: AtomicUsize,
    poll_threads: Mutex<HashSet<ThreadId>>,
    subscriptions: Mutex<Vec<Vec<String>>>,
}

/// The test's side of a scripted broker: queue events, then watch what the client did.
#[derive(Clone, Debug, Default)]
pub(crate) struct Script {
    events: Arc<Mutex<VecDeque<BrokerEvent>>>,
    probe: Arc<Probe>,
}

impl Script {
    pub(crate) fn push_message(&self, offset: i64, payload: &'static str) {
        self.push(BrokerEvent::Message(RawMessage::new(
            payload.as_bytes(),
            MessageOrigin::new("test", 0, offset),
        )));
    }

    pub(crate) fn push_error(&self, message: &str) {
        self.push(BrokerEvent::Error(BrokerEventError::new(message)));
    }

    fn push(&self, event: BrokerEvent) {
        self.events
            .lock()
            .expect("script lock is not poisoned")
            .push_back(event);
    }

    pub(crate) fn polls(&self) -> usize {
        self.probe.polls.load(Ordering::SeqCst)
    }

    /// How many distinct threads have polled a client of this script
    pub(crate) fn poll_threads(&self) -> usize {
        self.probe
            .poll_threads
            .lock()
            .expect("probe lock is not poisoned")
            .len()
    }

    pub(crate) fn subscriptions(&self) -> Vec<Vec<String>> {
        self.probe
            .subscriptions
            .lock()
            .expect("probe lock is not poisoned")
            .clone()
    }

    pub(crate) fn client(&self) -> ScriptedClient {
        ScriptedClient {
            script: self.clone(),
            reject_subscription: false,
        }
    }

    pub(crate) fn connector(&self) -> ScriptedConnector {
        ScriptedConnector {
            script: self.clone(),
            refuse_connection: false,
            reject_subscription: false,
        }
    }
}

pub(crate) struct ScriptedClient {
    script: Script,
    reject_subscription: bool,
}

impl BrokerClient for ScriptedClient {
    fn subscribe(&mut self, topics: &[String]) -> Result<(), StdError> {
        if self.reject_subscription {
            return Err("subscription rejected".into());
        }
        self.script
            .probe
            .subscriptions
            .lock()
            .expect("probe lock is not poisoned")
            .push(topics.to_vec());
        Ok(())
    }

    fn poll(&mut self, _timeout: Duration) -> Option<BrokerEvent> {
        self.script.probe.polls.fetch_add(1, Ordering::SeqCst);
        self.script
            .probe
            .poll_threads
            .lock()
            .expect("probe lock is not poisoned")
            .insert(thread::current().id());
        self.script
            .events
            .lock()
            .expect("script lock is not poisoned")
            .pop_front()
    }
}

pub(crate) struct ScriptedConnector {
    script: Script,
    pub(crate) refuse_connection: bool,
    pub(crate) reject_subscription: bool,
}

impl BrokerConnector for ScriptedConnector {
    type Client = ScriptedClient;

    fn connect(&self, _config: &ValidatedConfig) -> Result<Self::Client, StdError> {
        if self.refuse_connection {
            return Err("brokers unreachable".into());
        }
        Ok(ScriptedClient {
            script: self.script.clone(),
            reject_subscription: self.reject_subscription,
        })
    }
}
