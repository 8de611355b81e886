use std::{fmt::Debug, sync::Arc, time::Duration};

use tokio::time::MissedTickBehavior;

use crate::{
    accumulator::Accumulator,
    broker::{BrokerClient, BrokerConnector},
    buffer::IngestionBuffer,
    config::{ConsumerConfig, ValidatedConfig},
    error::{Error, Result},
    parser::RecordParser,
    poll_loop::{PollLoop, PollLoopHandle},
    stats::{IngestionStats, PollCounters},
};

/// Where the poll loop is in its life. It only ever moves forward.
enum PollState<TClient, TParser> {
    /// Connected and subscribed, waiting for the first collection
    Pending(PollLoop<TClient, TParser>),
    Running(PollLoopHandle),
    Stopped,
}

/// The host's entry point: a connected consumer plus the buffer it fills.
///
/// Build one with [`Collector::initialize`], then call [`Collector::collect`] on the
/// host's schedule. Polling starts with the first collection, not before.
///
/// ```
/// use std::time::Duration;
///
/// use brokermetrics::{
///     broker::{BrokerClient, BrokerEvent},
///     config::ValidatedConfig,
///     Collector, ConsumerConfig, MetricRecord, ParseError, StdError,
/// };
///
/// struct Idle;
/// impl BrokerClient for Idle {
///     fn subscribe(&mut self, _topics: &[String]) -> Result<(), StdError> {
///         Ok(())
///     }
///     fn poll(&mut self, _timeout: Duration) -> Option<BrokerEvent> {
///         None
///     }
/// }
///
/// let config = ConsumerConfig::from_toml_str(r#"
///     brokers = "localhost:9092"
///     topics = ["test"]
/// "#)?;
/// let connector = |_config: &ValidatedConfig| -> Result<Idle, StdError> { Ok(Idle) };
/// let parser = |_payload: &[u8]| -> Result<Vec<MetricRecord>, ParseError> { Ok(vec![]) };
///
/// let mut collector = Collector::initialize(config, &connector, parser)?;
/// let mut collected: Vec<MetricRecord> = Vec::new();
/// collector.collect(&mut collected)?;
/// assert!(collected.is_empty());
/// # Ok::<(), brokermetrics::Error>(())
/// ```
pub struct Collector<TClient, TParser> {
    config: ValidatedConfig,
    buffer: Arc<IngestionBuffer>,
    counters: Arc<PollCounters>,
    poll_state: PollState<TClient, TParser>,
    records_delivered: u64,
}

impl<TClient, TParser> Collector<TClient, TParser>
where
    TClient: BrokerClient,
    TParser: RecordParser,
{
    /// Validate the configuration, connect, and subscribe. Does not poll.
    pub fn initialize<TConnector>(
        config: ConsumerConfig,
        connector: &TConnector,
        parser: TParser,
    ) -> Result<Self>
    where
        TConnector: BrokerConnector<Client = TClient>,
    {
        let config = config.validate()?;

        let mut client = connector
            .connect(&config)
            .map_err(|source| Error::Connection {
                brokers: config.brokers().join(","),
                source,
            })?;
        client
            .subscribe(config.topics())
            .map_err(|source| Error::Subscription {
                topics: config.topics().to_vec(),
                source,
            })?;
        log::info!(
            "subscribed to {:?} on {}",
            config.topics(),
            config.brokers().join(",")
        );

        let buffer = Arc::new(IngestionBuffer::new(config.ingestion().buffer_limit));
        let counters = Arc::new(PollCounters::default());
        let poll_loop = PollLoop::new(
            client,
            parser,
            buffer.clone(),
            counters.clone(),
            config.ingestion(),
        );

        Ok(Self {
            config,
            buffer,
            counters,
            poll_state: PollState::Pending(poll_loop),
            records_delivered: 0,
        })
    }

    /// Hand every buffered record to `accumulator`, oldest first.
    ///
    /// The first call starts the poll loop. An empty buffer is a normal, successful
    /// collection.
    pub fn collect(&mut self, accumulator: &mut impl Accumulator) -> Result<()> {
        self.start_polling()?;

        for batch in self.buffer.drain() {
            for record in batch {
                let (name, fields, tags, timestamp) = record.into_parts();
                accumulator.add_fields(name, fields, tags, timestamp);
                self.records_delivered += 1;
            }
        }
        Ok(())
    }

    /// Collect on a fixed period until a collection fails.
    ///
    /// Drop the future to stop collecting; the poll loop stops with the collector.
    /// Joining the poll thread can take up to one broker poll timeout, so inside a
    /// tokio runtime the join is moved to the blocking pool instead of stalling the
    /// worker that dropped the future.
    pub async fn collect_forever<TAccumulator>(
        self,
        period: Duration,
        mut accumulator: TAccumulator,
    ) -> Result<()>
    where
        TAccumulator: Accumulator,
    {
        let mut collector = StopOffRuntime(Some(self));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            if let Some(collector) = collector.0.as_mut() {
                collector.collect(&mut accumulator)?;
            }
        }
    }

    fn start_polling(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.poll_state, PollState::Stopped) {
            PollState::Pending(poll_loop) => {
                // A failed spawn leaves the state Stopped: the loop is never retried.
                self.poll_state = PollState::Running(poll_loop.spawn().map_err(Error::Spawn)?);
            }
            other => self.poll_state = other,
        }
        Ok(())
    }
}

impl<TClient, TParser> Collector<TClient, TParser> {
    /// Stop and join the poll loop. Batches already buffered can still be collected,
    /// but polling never resumes.
    pub fn stop(&mut self) {
        if let PollState::Running(mut handle) =
            std::mem::replace(&mut self.poll_state, PollState::Stopped)
        {
            handle.stop();
        }
        self.buffer.close();
    }

    /// Whether the poll loop is running right now
    pub fn is_polling(&self) -> bool {
        match &self.poll_state {
            PollState::Running(handle) => !handle.is_finished(),
            PollState::Pending(_) | PollState::Stopped => false,
        }
    }

    /// The configuration in effect, defaults included
    pub fn config(&self) -> &ValidatedConfig {
        &self.config
    }

    pub fn stats(&self) -> IngestionStats {
        IngestionStats::new(&self.counters, self.buffer.stats(), self.records_delivered)
    }
}

impl<TClient, TParser> Debug for Collector<TClient, TParser> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collector")
            .field("config", &self.config)
            .field("polling", &self.is_polling())
            .field("buffered_batches", &self.buffer.len())
            .field("records_delivered", &self.records_delivered)
            .finish()
    }
}

/// Drops its collector on tokio's blocking pool when there is a runtime to use.
struct StopOffRuntime<TClient, TParser>(Option<Collector<TClient, TParser>>)
where
    TClient: BrokerClient,
    TParser: RecordParser;

impl<TClient, TParser> Drop for StopOffRuntime<TClient, TParser>
where
    TClient: BrokerClient,
    TParser: RecordParser,
{
    fn drop(&mut self) {
        let Some(mut collector) = self.0.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn_blocking(move || collector.stop());
            }
            Err(_) => collector.stop(),
        }
    }
}
