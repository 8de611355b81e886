//! The capability interface to a metric payload parser.

use crate::{types::MetricRecord, ParseError};

/// Turns one message payload into records.
///
/// Any `Fn(&[u8]) -> Result<Vec<MetricRecord>, ParseError>` that can move to the
/// poll thread is a parser, so hosts can hand over whatever decoder they already have.
pub trait RecordParser: Send + 'static {
    /// Records in payload order. An empty vec is a valid result.
    fn parse(&self, payload: &[u8]) -> Result<Vec<MetricRecord>, ParseError>;
}

impl<F> RecordParser for F
where
    F: Fn(&[u8]) -> Result<Vec<MetricRecord>, ParseError> + Send + 'static,
{
    fn parse(&self, payload: &[u8]) -> Result<Vec<MetricRecord>, ParseError> {
        self(payload)
    }
}
