//! Counters for the ingestion pipeline.
//!
//! Counters are plain relaxed atomics, written by the poll loop and read by whoever
//! asks for a snapshot. A snapshot is not transactional: counts taken while the loop
//! runs may be a message apart from each other.

use std::sync::atomic::{AtomicU64, Ordering};

const ORDERING: Ordering = Ordering::Relaxed;

#[derive(Debug, Default)]
pub(crate) struct PollCounters {
    messages: AtomicU64,
    parse_errors: AtomicU64,
    broker_errors: AtomicU64,
    empty_payloads: AtomicU64,
}

impl PollCounters {
    pub(crate) fn message(&self) {
        self.messages.fetch_add(1, ORDERING);
    }

    pub(crate) fn parse_error(&self) {
        self.parse_errors.fetch_add(1, ORDERING);
    }

    pub(crate) fn broker_error(&self) {
        self.broker_errors.fetch_add(1, ORDERING);
    }

    pub(crate) fn empty_payload(&self) {
        self.empty_payloads.fetch_add(1, ORDERING);
    }
}

#[derive(Debug, Default)]
pub(crate) struct BufferCounters {
    appended: AtomicU64,
    dropped: AtomicU64,
    drained: AtomicU64,
}

impl BufferCounters {
    pub(crate) fn appended(&self) {
        self.appended.fetch_add(1, ORDERING);
    }

    pub(crate) fn dropped(&self) {
        self.dropped.fetch_add(1, ORDERING);
    }

    pub(crate) fn drained(&self, count: usize) {
        self.drained.fetch_add(count as u64, ORDERING);
    }
}

/// Batch totals for an [`crate::IngestionBuffer`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BufferStats {
    /// Batches accepted into the buffer
    pub appended: u64,
    /// Batches evicted by the overflow policy or refused after close
    pub dropped: u64,
    /// Batches handed out by drain
    pub drained: u64,
    /// Batches waiting right now
    pub depth: usize,
}

impl BufferCounters {
    pub(crate) fn snapshot(&self, depth: usize) -> BufferStats {
        BufferStats {
            appended: self.appended.load(ORDERING),
            dropped: self.dropped.load(ORDERING),
            drained: self.drained.load(ORDERING),
            depth,
        }
    }
}

/// A point-in-time view of the whole ingestion pipeline
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IngestionStats {
    /// Messages the broker client delivered
    pub messages_received: u64,
    /// Messages the parser rejected
    pub parse_errors: u64,
    /// Error events the broker client reported
    pub broker_errors: u64,
    /// Messages that parsed into zero records
    pub empty_payloads: u64,
    pub buffer: BufferStats,
    /// Records forwarded to accumulators
    pub records_delivered: u64,
}

impl IngestionStats {
    pub(crate) fn new(poll: &PollCounters, buffer: BufferStats, records_delivered: u64) -> Self {
        Self {
            messages_received: poll.messages.load(ORDERING),
            parse_errors: poll.parse_errors.load(ORDERING),
            broker_errors: poll.broker_errors.load(ORDERING),
            empty_payloads: poll.empty_payloads.load(ORDERING),
            buffer,
            records_delivered,
        }
    }
}
