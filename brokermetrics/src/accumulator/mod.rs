//! Destinations for collected records

use std::time::SystemTime;

use crate::types::{FieldSet, MetricRecord, Name, TagSet};

mod logging_accumulator;
mod stream_accumulator;

pub use logging_accumulator::LoggingAccumulator;
pub use stream_accumulator::StreamAccumulator;

/// The host-side consumer of collected records.
///
/// Only ever called from [`crate::Collector::collect`], one record at a time and in
/// arrival order.
pub trait Accumulator {
    /// Take ownership of one record's parts
    fn add_fields(&mut self, name: Name, fields: FieldSet, tags: TagSet, timestamp: SystemTime);
}

impl<T> Accumulator for &mut T
where
    T: Accumulator + ?Sized,
{
    fn add_fields(&mut self, name: Name, fields: FieldSet, tags: TagSet, timestamp: SystemTime) {
        (**self).add_fields(name, fields, tags, timestamp)
    }
}

/// Collects records in memory, mostly useful for tests and one-shot tools.
impl Accumulator for Vec<MetricRecord> {
    fn add_fields(&mut self, name: Name, fields: FieldSet, tags: TagSet, timestamp: SystemTime) {
        self.push(MetricRecord::from_parts(name, fields, tags, timestamp))
    }
}
