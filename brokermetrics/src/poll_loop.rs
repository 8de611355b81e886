use std::{
    any::Any,
    io,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Condvar, Mutex, PoisonError},
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::{
    broker::{BrokerClient, BrokerEvent, RawMessage},
    buffer::IngestionBuffer,
    config::IngestionOptions,
    parser::RecordParser,
    stats::PollCounters,
    types::Batch,
    ParseError,
};

/// A one-way stop flag that sleepers can wait on.
#[derive(Clone, Debug, Default)]
pub(crate) struct ShutdownSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl ShutdownSignal {
    pub(crate) fn trigger(&self) {
        let (triggered, changed) = &*self.inner;
        *triggered.lock().unwrap_or_else(PoisonError::into_inner) = true;
        changed.notify_all();
    }

    pub(crate) fn is_triggered(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep for up to `timeout`, returning early with true once triggered.
    pub(crate) fn wait(&self, timeout: Duration) -> bool {
        let (triggered, changed) = &*self.inner;
        let guard = triggered.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _timeout) = changed
            .wait_timeout_while(guard, timeout, |triggered| !*triggered)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

/// Doubling wait between polls that find nothing.
#[derive(Debug)]
pub(crate) struct IdleBackoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl IdleBackoff {
    pub(crate) fn new(initial: Duration, max: Duration) -> Self {
        let max = max.max(initial);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    pub(crate) fn next_wait(&mut self) -> Duration {
        let wait = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        wait
    }

    pub(crate) fn reset(&mut self) {
        self.current = self.initial;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Polled {
    Message,
    Error,
    Nothing,
}

/// Moves messages from a broker client, through a parser, into the ingestion buffer.
///
/// The loop owns its client outright; nothing else polls it.
pub(crate) struct PollLoop<TClient, TParser> {
    client: TClient,
    parser: TParser,
    buffer: Arc<IngestionBuffer>,
    counters: Arc<PollCounters>,
    poll_timeout: Duration,
    backoff: IdleBackoff,
}

impl<TClient, TParser> PollLoop<TClient, TParser>
where
    TClient: BrokerClient,
    TParser: RecordParser,
{
    pub(crate) fn new(
        client: TClient,
        parser: TParser,
        buffer: Arc<IngestionBuffer>,
        counters: Arc<PollCounters>,
        options: &IngestionOptions,
    ) -> Self {
        Self {
            client,
            parser,
            buffer,
            counters,
            poll_timeout: options.poll_timeout,
            backoff: IdleBackoff::new(options.idle_backoff_min, options.idle_backoff_max),
        }
    }

    /// Start polling on a dedicated thread.
    pub(crate) fn spawn(self) -> io::Result<PollLoopHandle> {
        let shutdown = ShutdownSignal::default();
        let buffer = self.buffer.clone();
        let worker = thread::Builder::new()
            .name("broker-poll".to_string())
            .spawn({
                let shutdown = shutdown.clone();
                move || self.poll_until_stopped(&shutdown)
            })?;
        Ok(PollLoopHandle {
            shutdown,
            buffer,
            worker: Some(worker),
        })
    }

    pub(crate) fn poll_until_stopped(mut self, shutdown: &ShutdownSignal) {
        log::info!("poll loop started");
        while !shutdown.is_triggered() {
            match self.poll_once() {
                Polled::Message => self.backoff.reset(),
                Polled::Error | Polled::Nothing => {
                    if shutdown.wait(self.backoff.next_wait()) {
                        break;
                    }
                }
            }
        }
        log::info!("poll loop stopped");
    }

    pub(crate) fn poll_once(&mut self) -> Polled {
        match self.client.poll(self.poll_timeout) {
            Some(BrokerEvent::Message(message)) => {
                self.counters.message();
                self.ingest(message);
                Polled::Message
            }
            Some(BrokerEvent::Error(error)) => {
                self.counters.broker_error();
                log::error!("broker error: {error}");
                Polled::Error
            }
            None => Polled::Nothing,
        }
    }

    fn ingest(&mut self, message: RawMessage) {
        log::debug!(
            "message on {}: {} bytes",
            message.origin(),
            message.payload().len()
        );
        // A panicking parser costs one message, not the poll thread.
        let parsed = panic::catch_unwind(AssertUnwindSafe(|| {
            self.parser.parse(message.payload())
        }))
        .unwrap_or_else(|payload| {
            Err(ParseError::new(format!(
                "parser panicked: {}",
                panic_message(&*payload)
            )))
        });
        match parsed {
            Ok(records) if records.is_empty() => {
                self.counters.empty_payload();
                log::debug!("message on {} held no records", message.origin());
            }
            Ok(records) => {
                self.buffer.append(Batch::new(message.into_origin(), records));
            }
            Err(error) => {
                self.counters.parse_error();
                log::error!("message parsing error on {}: {error}", message.origin());
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string payload"
    }
}

/// Owner's handle on a running poll loop. Dropping it stops the loop.
#[derive(Debug)]
pub(crate) struct PollLoopHandle {
    shutdown: ShutdownSignal,
    buffer: Arc<IngestionBuffer>,
    worker: Option<JoinHandle<()>>,
}

impl PollLoopHandle {
    /// Signal the loop, release it if it is blocked on a full buffer, and join it.
    ///
    /// Returns after at most one poll timeout plus scheduling delay.
    pub(crate) fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        self.shutdown.trigger();
        self.buffer.close();
        if worker.join().is_err() {
            log::error!("poll worker panicked");
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.worker.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for PollLoopHandle {
    fn drop(&mut self) {
        self.stop()
    }
}
