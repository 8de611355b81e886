use std::{
    collections::HashMap,
    fmt::Display,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

#[cfg(not(feature = "ahash-hasher"))]
use std::collections::hash_map::RandomState;

#[cfg(feature = "ahash-hasher")]
use ahash::RandomState;

use crate::broker::MessageOrigin;

/// Alias for the default hasher, selected by the ahash-hasher crate feature
pub type Hasher = RandomState;

/// Tag key to tag value. Keys are unique, order is not meaningful.
pub type TagSet = HashMap<String, String, Hasher>;

/// Field key to field value. Keys are unique, order is not meaningful.
pub type FieldSet = HashMap<String, FieldValue, Hasher>;

/// An identifier for a metric.
#[derive(Debug, Eq, Hash, PartialEq, PartialOrd, Ord, Clone)]
pub enum Name {
    /// A static string Name.
    Str(&'static str),
    /// A String name, usually what a parser produces.
    String(String),
    /// A name shared between many records of the same measurement.
    Shared(Arc<String>),
}

impl Name {
    /// an &str view of the name
    pub fn as_str(&self) -> &str {
        match self {
            Name::Str(s) => s,
            Name::String(s) => s,
            Name::Shared(s) => s,
        }
    }
}

impl From<Name> for String {
    fn from(name: Name) -> Self {
        match name {
            Name::Str(s) => s.to_owned(),
            Name::String(s) => s,
            Name::Shared(s) => Arc::<String>::try_unwrap(s).unwrap_or_else(|this| this.to_string()),
        }
    }
}

impl Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&'static str> for Name {
    #[inline]
    fn from(s: &'static str) -> Self {
        Self::Str(s)
    }
}

impl From<String> for Name {
    #[inline]
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Arc<String>> for Name {
    #[inline]
    fn from(s: Arc<String>) -> Self {
        Self::Shared(s)
    }
}

/// The value of one field of a metric record
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// a signed integer value
    I64(i64),
    /// an unsigned integer value
    U64(u64),
    /// a floating point value
    F64(f64),
    /// a boolean value
    Bool(bool),
    /// a string value
    String(String),
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::I64(n) => write!(f, "{n}i"),
            FieldValue::U64(n) => write!(f, "{n}u"),
            FieldValue::F64(n) => write!(f, "{n}"),
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::String(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<i64> for FieldValue {
    #[inline]
    fn from(n: i64) -> Self {
        FieldValue::I64(n)
    }
}

impl From<i32> for FieldValue {
    #[inline]
    fn from(n: i32) -> Self {
        FieldValue::I64(n.into())
    }
}

impl From<u64> for FieldValue {
    #[inline]
    fn from(n: u64) -> Self {
        FieldValue::U64(n)
    }
}

impl From<u32> for FieldValue {
    #[inline]
    fn from(n: u32) -> Self {
        FieldValue::U64(n.into())
    }
}

impl From<f64> for FieldValue {
    #[inline]
    fn from(n: f64) -> Self {
        FieldValue::F64(n)
    }
}

impl From<f32> for FieldValue {
    #[inline]
    fn from(n: f32) -> Self {
        FieldValue::F64(n.into())
    }
}

impl From<bool> for FieldValue {
    #[inline]
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<String> for FieldValue {
    #[inline]
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<&str> for FieldValue {
    #[inline]
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_owned())
    }
}

/// A provider of unix epoch nanos
pub trait EpochTime {
    /// return nanos since the unix epoch, or 0 for times before it
    fn nanos_since_epoch(&self) -> u64;
}

impl EpochTime for SystemTime {
    fn nanos_since_epoch(&self) -> u64 {
        self.duration_since(UNIX_EPOCH)
            .map(|since_epoch| since_epoch.as_nanos() as u64)
            .unwrap_or_default()
    }
}

/// One structured metric, as produced by a [`crate::parser::RecordParser`].
///
/// Records are immutable once built; the accumulator takes them apart with
/// [`MetricRecord::into_parts`].
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    name: Name,
    tags: TagSet,
    fields: FieldSet,
    timestamp: SystemTime,
}

impl MetricRecord {
    /// Create a new record.
    ///
    /// ```
    /// # use std::time::SystemTime;
    /// # use brokermetrics::MetricRecord;
    /// let record = MetricRecord::new(
    ///     "confluent_cloud",
    ///     [("id", "abc123")],
    ///     [("test", 2.2)],
    ///     SystemTime::UNIX_EPOCH,
    /// );
    /// assert_eq!("confluent_cloud", record.name().as_str());
    /// ```
    pub fn new(
        name: impl Into<Name>,
        tags: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
        fields: impl IntoIterator<Item = (impl Into<String>, impl Into<FieldValue>)>,
        timestamp: SystemTime,
    ) -> Self {
        Self {
            name: name.into(),
            tags: tags
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
            fields: fields
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
            timestamp,
        }
    }

    /// Assemble a record from already-built maps.
    pub fn from_parts(name: Name, fields: FieldSet, tags: TagSet, timestamp: SystemTime) -> Self {
        Self {
            name,
            tags,
            fields,
            timestamp,
        }
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    pub fn fields(&self) -> &FieldSet {
        &self.fields
    }

    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    /// Name, fields, tags and timestamp, in the order an accumulator takes them.
    pub fn into_parts(self) -> (Name, FieldSet, TagSet, SystemTime) {
        (self.name, self.fields, self.tags, self.timestamp)
    }
}

/// Renders roughly as line protocol, with keys sorted. Meant for logs, not for the wire.
impl Display for MetricRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name.as_str())?;
        let mut tags: Vec<_> = self.tags.iter().collect();
        tags.sort_unstable();
        for (key, value) in tags {
            write!(f, ",{key}={value}")?;
        }
        let mut fields: Vec<_> = self.fields.iter().collect();
        fields.sort_unstable_by(|(l, _), (r, _)| l.cmp(r));
        for (i, (key, value)) in fields.into_iter().enumerate() {
            let separator = if i == 0 { ' ' } else { ',' };
            write!(f, "{separator}{key}={value}")?;
        }
        write!(f, " {}", self.timestamp.nanos_since_epoch())
    }
}

/// The records parsed out of a single broker message.
///
/// A batch is appended to the ingestion buffer as a unit, so a collector sees
/// either all of its records or none of them.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    origin: MessageOrigin,
    records: Vec<MetricRecord>,
}

impl Batch {
    pub fn new(origin: MessageOrigin, records: Vec<MetricRecord>) -> Self {
        Self { origin, records }
    }

    /// Where the message these records came from sat in the broker.
    pub fn origin(&self) -> &MessageOrigin {
        &self.origin
    }

    pub fn records(&self) -> &[MetricRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl IntoIterator for Batch {
    type Item = MetricRecord;
    type IntoIter = std::vec::IntoIter<MetricRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}
