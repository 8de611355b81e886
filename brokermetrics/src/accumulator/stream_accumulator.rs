use std::{sync::mpsc, time::SystemTime};

use crate::types::{FieldSet, MetricRecord, Name, TagSet};

use super::Accumulator;

/// An accumulator that queues records in an mpsc for a downstream consumer.
///
/// The queue is bounded. When the consumer falls behind, records are dropped and
/// logged rather than stalling the collection cycle.
#[derive(Debug, Clone)]
pub struct StreamAccumulator {
    queue: mpsc::SyncSender<MetricRecord>,
}

impl StreamAccumulator {
    /// Create a new stream accumulator with room for 1024 records.
    pub fn new() -> (Self, mpsc::Receiver<MetricRecord>) {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> (Self, mpsc::Receiver<MetricRecord>) {
        let (sender, receiver) = mpsc::sync_channel(capacity);

        (Self { queue: sender }, receiver)
    }
}

impl Accumulator for StreamAccumulator {
    fn add_fields(&mut self, name: Name, fields: FieldSet, tags: TagSet, timestamp: SystemTime) {
        let record = MetricRecord::from_parts(name, fields, tags, timestamp);
        match self.queue.try_send(record) {
            Ok(_) => (),
            Err(mpsc::TrySendError::Full(record)) => {
                log::warn!("stream accumulator full - dropped {record}");
            }
            Err(mpsc::TrySendError::Disconnected(_)) => {
                log::debug!("stream accumulator receiver is gone");
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::SystemTime;

    use crate::{accumulator::Accumulator, MetricRecord};

    use super::StreamAccumulator;

    #[test_log::test]
    fn full_queue_drops_instead_of_blocking() {
        let (mut accumulator, receiver) = StreamAccumulator::with_capacity(1);
        for value in 0..3_i64 {
            let (name, fields, tags, timestamp) =
                MetricRecord::new("m", [("k", "v")], [("value", value)], SystemTime::UNIX_EPOCH)
                    .into_parts();
            accumulator.add_fields(name, fields, tags, timestamp);
        }

        let received: Vec<MetricRecord> = receiver.try_iter().collect();
        assert_eq!(1, received.len());
        assert_eq!(
            Some(&crate::FieldValue::I64(0)),
            received[0].fields().get("value")
        );
    }
}
