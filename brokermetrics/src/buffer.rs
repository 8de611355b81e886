//! The hand-off between the poll loop and the collector.

use std::{
    collections::VecDeque,
    num::NonZeroUsize,
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
};

use serde::Deserialize;

use crate::{
    stats::{BufferCounters, BufferStats},
    types::Batch,
};

/// What to do with a new batch when a bounded buffer is full
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest queued batch to make room
    #[default]
    DropOldest,
    /// Make the appender wait until a drain makes room
    Block,
}

/// How many batches the buffer may hold between drains
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BufferLimit {
    /// No limit. A paused collector lets memory grow without bound.
    #[default]
    Unbounded,
    /// At most `max_batches`, with `overflow` deciding what happens past that
    Bounded {
        max_batches: NonZeroUsize,
        overflow: OverflowPolicy,
    },
}

/// The result of an [`IngestionBuffer::append`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The batch is queued
    Appended,
    /// The batch is queued, and the oldest queued batch was dropped for it
    EvictedOldest,
    /// The batch had no records and was not queued
    Empty,
    /// The buffer is closed; the batch was dropped
    Closed,
}

#[derive(Debug, Default)]
struct BufferState {
    batches: VecDeque<Batch>,
    closed: bool,
}

/// A queue of record batches shared by one appender and one drainer.
///
/// Every operation holds the lock only long enough to touch the queue, so a
/// [`drain`](IngestionBuffer::drain) never waits on broker or parser work. A batch is
/// returned by exactly one drain, and drains return batches in append order.
#[derive(Debug, Default)]
pub struct IngestionBuffer {
    state: Mutex<BufferState>,
    space_available: Condvar,
    limit: BufferLimit,
    counters: BufferCounters,
}

impl IngestionBuffer {
    pub fn new(limit: BufferLimit) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }

    /// Add a batch at the tail.
    ///
    /// Only blocks with [`OverflowPolicy::Block`] on a full buffer, until a drain
    /// makes room or the buffer is closed.
    pub fn append(&self, batch: Batch) -> AppendOutcome {
        if batch.is_empty() {
            return AppendOutcome::Empty;
        }

        let mut state = self.lock();
        let mut outcome = AppendOutcome::Appended;
        if let BufferLimit::Bounded {
            max_batches,
            overflow,
        } = self.limit
        {
            match overflow {
                OverflowPolicy::DropOldest => {
                    if !state.closed && max_batches.get() <= state.batches.len() {
                        if let Some(evicted) = state.batches.pop_front() {
                            log::warn!(
                                "ingestion buffer full at {max_batches} batches - dropped {} records from {}",
                                evicted.len(),
                                evicted.origin()
                            );
                            self.counters.dropped();
                            outcome = AppendOutcome::EvictedOldest;
                        }
                    }
                }
                OverflowPolicy::Block => {
                    state = self
                        .space_available
                        .wait_while(state, |state| {
                            !state.closed && max_batches.get() <= state.batches.len()
                        })
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }

        if state.closed {
            log::debug!("ingestion buffer closed - dropped batch from {}", batch.origin());
            self.counters.dropped();
            return AppendOutcome::Closed;
        }
        state.batches.push_back(batch);
        self.counters.appended();
        outcome
    }

    /// Take every queued batch, oldest first. Empty when nothing is queued.
    pub fn drain(&self) -> Vec<Batch> {
        let batches = std::mem::take(&mut self.lock().batches);
        if !batches.is_empty() {
            self.space_available.notify_all();
            self.counters.drained(batches.len());
        }
        Vec::from(batches)
    }

    /// Refuse further appends and release any appender blocked on a full buffer.
    /// Queued batches stay available to [`drain`](IngestionBuffer::drain).
    pub fn close(&self) {
        self.lock().closed = true;
        self.space_available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of batches waiting for a drain
    pub fn len(&self) -> usize {
        self.lock().batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().batches.is_empty()
    }

    pub fn limit(&self) -> BufferLimit {
        self.limit
    }

    pub fn stats(&self) -> BufferStats {
        self.counters.snapshot(self.len())
    }

    // The queue is valid after any panic that could poison this lock: every
    // mutation is a single push, pop or take.
    fn lock(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod test {
    use std::{
        num::NonZeroUsize,
        sync::Arc,
        thread,
        time::{Duration, SystemTime},
    };

    use crate::{broker::MessageOrigin, types::Batch, MetricRecord};

    use super::{AppendOutcome, BufferLimit, IngestionBuffer, OverflowPolicy};

    fn batch(offset: i64) -> Batch {
        Batch::new(
            MessageOrigin::new("test", 0, offset),
            vec![MetricRecord::new(
                "m",
                [("offset", offset.to_string())],
                [("value", offset)],
                SystemTime::UNIX_EPOCH,
            )],
        )
    }

    fn offsets(batches: &[Batch]) -> Vec<i64> {
        batches.iter().map(|batch| batch.origin().offset).collect()
    }

    fn bounded(max_batches: usize, overflow: OverflowPolicy) -> BufferLimit {
        BufferLimit::Bounded {
            max_batches: NonZeroUsize::new(max_batches).expect("nonzero"),
            overflow,
        }
    }

    #[test_log::test]
    fn drain_returns_append_order() {
        let buffer = IngestionBuffer::default();
        for offset in 0..100 {
            assert_eq!(AppendOutcome::Appended, buffer.append(batch(offset)));
        }
        assert_eq!((0..100).collect::<Vec<_>>(), offsets(&buffer.drain()));
        assert!(buffer.is_empty());
    }

    #[test_log::test]
    fn drain_of_nothing_is_empty() {
        let buffer = IngestionBuffer::default();
        assert!(buffer.drain().is_empty());
        buffer.append(batch(1));
        assert_eq!(1, buffer.drain().len());
        assert!(buffer.drain().is_empty());
        assert_eq!(1, buffer.stats().drained);
    }

    #[test_log::test]
    fn empty_batches_are_not_queued() {
        let buffer = IngestionBuffer::default();
        let outcome = buffer.append(Batch::new(MessageOrigin::new("test", 0, 0), vec![]));
        assert_eq!(AppendOutcome::Empty, outcome);
        assert!(buffer.is_empty());
        assert_eq!(0, buffer.stats().appended);
    }

    #[test_log::test]
    fn drop_oldest_evicts_from_the_front() {
        let buffer = IngestionBuffer::new(bounded(3, OverflowPolicy::DropOldest));
        for offset in 0..3 {
            assert_eq!(AppendOutcome::Appended, buffer.append(batch(offset)));
        }
        assert_eq!(AppendOutcome::EvictedOldest, buffer.append(batch(3)));
        assert_eq!(AppendOutcome::EvictedOldest, buffer.append(batch(4)));

        assert_eq!(vec![2, 3, 4], offsets(&buffer.drain()));
        let stats = buffer.stats();
        assert_eq!(5, stats.appended);
        assert_eq!(2, stats.dropped);
        assert_eq!(3, stats.drained);
        assert_eq!(0, stats.depth);
    }

    #[test_log::test]
    fn block_waits_for_a_drain() {
        let buffer = Arc::new(IngestionBuffer::new(bounded(1, OverflowPolicy::Block)));
        buffer.append(batch(0));

        let appender = {
            let buffer = buffer.clone();
            thread::spawn(move || buffer.append(batch(1)))
        };
        thread::sleep(Duration::from_millis(50));
        assert!(!appender.is_finished(), "append should wait for room");
        assert_eq!(1, buffer.len());

        assert_eq!(vec![0], offsets(&buffer.drain()));
        assert_eq!(
            AppendOutcome::Appended,
            appender.join().expect("appender should not panic")
        );
        assert_eq!(vec![1], offsets(&buffer.drain()));
    }

    #[test_log::test]
    fn close_releases_a_blocked_appender() {
        let buffer = Arc::new(IngestionBuffer::new(bounded(1, OverflowPolicy::Block)));
        buffer.append(batch(0));

        let appender = {
            let buffer = buffer.clone();
            thread::spawn(move || buffer.append(batch(1)))
        };
        thread::sleep(Duration::from_millis(20));
        buffer.close();

        assert_eq!(
            AppendOutcome::Closed,
            appender.join().expect("appender should not panic")
        );
        assert_eq!(AppendOutcome::Closed, buffer.append(batch(2)));
        // What was queued before close is still collectable
        assert_eq!(vec![0], offsets(&buffer.drain()));
        assert_eq!(2, buffer.stats().dropped);
    }

    #[test_log::test]
    fn concurrent_append_and_drain_lose_nothing() {
        const BATCHES: i64 = 20_000;
        let buffer = Arc::new(IngestionBuffer::default());

        let producer = {
            let buffer = buffer.clone();
            thread::spawn(move || {
                for offset in 0..BATCHES {
                    buffer.append(batch(offset));
                    if offset % 1000 == 0 {
                        thread::yield_now();
                    }
                }
            })
        };

        let mut seen = Vec::with_capacity(BATCHES as usize);
        let mut drains = 0;
        while (seen.len() as i64) < BATCHES {
            seen.extend(offsets(&buffer.drain()));
            drains += 1;
        }
        producer.join().expect("producer should not panic");

        assert!(buffer.drain().is_empty());
        assert_eq!((0..BATCHES).collect::<Vec<_>>(), seen, "every batch exactly once, in order");
        log::info!("observed {BATCHES} batches over {drains} drains");
    }
}
