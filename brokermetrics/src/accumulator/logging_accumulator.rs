use std::time::SystemTime;

use crate::types::{FieldSet, MetricRecord, Name, TagSet};

use super::Accumulator;

/// An accumulator that just logs records and drops them
pub struct LoggingAccumulator {
    log_level: log::Level,
}

impl LoggingAccumulator {
    pub fn new(log_level: log::Level) -> Self {
        Self { log_level }
    }
}

impl Default for LoggingAccumulator {
    fn default() -> Self {
        Self {
            log_level: log::Level::Info,
        }
    }
}

impl Accumulator for LoggingAccumulator {
    fn add_fields(&mut self, name: Name, fields: FieldSet, tags: TagSet, timestamp: SystemTime) {
        if log::log_enabled!(self.log_level) {
            let record = MetricRecord::from_parts(name, fields, tags, timestamp);
            log::log!(self.log_level, "collected: {record}")
        }
    }
}
