use std::sync::Arc;

/// The unit of data flowing along every edge of a topology.
///
/// Immutable once constructed; cheaply shared across a fan-out of
/// downstream consumers via [`RecordRef`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record<K, V> {
    pub key: K,
    pub value: V,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub offset: Option<i64>,
    pub partition: Option<u32>,
}

impl<K, V> Record<K, V> {
    pub fn new(key: K, value: V, timestamp: i64) -> Self {
        Record { key, value, timestamp, offset: None, partition: None }
    }

    pub fn with_source(key: K, value: V, timestamp: i64, partition: u32, offset: i64) -> Self {
        Record { key, value, timestamp, offset: Some(offset), partition: Some(partition) }
    }

    pub fn into_ref(self) -> RecordRef<K, V> {
        Arc::new(self)
    }
}

/// Shared ownership handle for a record fanned out to multiple consumers.
pub type RecordRef<K, V> = Arc<Record<K, V>>;

/// Void/unit marker used in place of a key or value that a record doesn't carry.
pub type Void = ();

/// Partition-list helper: the set of partition numbers `0..count`.
pub fn partition_list(count: u32) -> Vec<u32> {
    (0..count).collect()
}
