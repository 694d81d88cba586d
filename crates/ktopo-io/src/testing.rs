//! In-memory fake broker: a source fed by pushing records directly from
//! test code, and a sink that collects what it receives into a shared
//! `Vec`. Neither touches a real Kafka cluster, which is what makes them
//! usable from this crate's own tests and from `bins/ktopo-cli`'s
//! `--dry-run` demo (behind the `test-util` feature, since normal builds
//! have no business depending on test scaffolding).

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use ktopo_core::metric::{record_type_name, MetricHandle, RecordingMetric};
use ktopo_core::offset::StartOffset;
use ktopo_core::processor::{Downstream, Fanout, NodeHandle, PartitionProcessor, ProcessorId, Sink, UpstreamSet};
use ktopo_core::record::{Record, RecordRef};

/// Partition source backed by an in-memory queue. Test code (or a
/// `--dry-run` demo) calls [`FakeSource::produce`] to enqueue records;
/// `process_one` dequeues and forwards exactly one per call, same as a
/// real source decoding one broker message at a time. `close_input` marks
/// the queue as permanently empty so `eof` can go true once it drains.
pub struct FakeSource<K, V> {
    id: ProcessorId,
    ups: UpstreamSet,
    partition: u32,
    key_type: &'static str,
    value_type: &'static str,
    queue: VecDeque<Record<K, V>>,
    closed: bool,
    downstreams: Vec<NodeHandle<dyn Downstream<K, V>>>,
    metric: Box<dyn MetricHandle>,
}

impl<K, V> FakeSource<K, V> {
    pub fn new(partition: u32, key_type: &'static str, value_type: &'static str) -> Self {
        FakeSource {
            id: ProcessorId::fresh(),
            ups: UpstreamSet::none(),
            partition,
            key_type,
            value_type,
            queue: VecDeque::new(),
            closed: false,
            downstreams: Vec::new(),
            metric: Box::new(RecordingMetric::new("ktopo_fake_source_records")),
        }
    }

    /// Enqueues a record to be delivered by a later `process_one`.
    pub fn produce(&mut self, key: K, value: V, timestamp: i64) {
        let offset = self.queue.len() as i64;
        self.queue.push_back(Record::with_source(key, value, timestamp, self.partition, offset));
    }

    /// No more records will ever be produced; once the queue drains, `eof`
    /// becomes (and stays) true.
    pub fn close_input(&mut self) {
        self.closed = true;
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}

impl<K, V> PartitionProcessor for FakeSource<K, V> {
    fn id(&self) -> ProcessorId {
        self.id
    }

    fn name(&self) -> String {
        format!("fake_source({:?}:{})", self.id, self.partition)
    }

    fn simple_name(&self) -> &'static str {
        "fake_source"
    }

    fn key_type_name(&self) -> &'static str {
        self.key_type
    }

    fn value_type_name(&self) -> &'static str {
        self.value_type
    }

    fn record_type_name(&self) -> String {
        record_type_name(self.key_type_name(), self.value_type_name())
    }

    fn depth(&self) -> usize {
        0
    }

    fn partition(&self) -> Option<u32> {
        Some(self.partition)
    }

    fn upstream_ids(&self) -> &UpstreamSet {
        &self.ups
    }

    fn eof(&self) -> bool {
        self.closed && self.queue.is_empty()
    }

    fn poll(&mut self, _max_ms: u64) {}

    fn process_one(&mut self, _tick_ms: i64) -> usize {
        let Some(record) = self.queue.pop_front() else {
            return 0;
        };
        let record = record.into_ref();
        for d in &self.downstreams {
            d.borrow_mut().push(record.clone());
        }
        1
    }

    fn flush(&mut self) {}

    fn commit(&mut self, _force: bool) {}

    fn garbage_collect(&mut self, _tick_ms: i64) {}

    fn start(&mut self, _offset: Option<StartOffset>) {}

    fn close(&mut self) {}

    fn for_each_metric(&mut self, f: &mut dyn FnMut(&mut dyn MetricHandle)) {
        f(self.metric.as_mut());
    }
}

impl<K, V> Fanout<K, V> for FakeSource<K, V> {
    fn add_downstream(&mut self, downstream: NodeHandle<dyn Downstream<K, V>>) {
        self.downstreams.push(downstream);
    }
}

/// A sink that appends every record it receives to a shared `Vec`, in
/// `push` order. `set_queue_len` lets a test simulate a slow downstream
/// for back-pressure scenarios without actually buffering anything.
pub struct FakeSink<K, V> {
    id: ProcessorId,
    ups: UpstreamSet,
    key_type: &'static str,
    value_type: &'static str,
    received: Rc<RefCell<Vec<RecordRef<K, V>>>>,
    simulated_queue_len: usize,
    closed: bool,
    metric: Box<dyn MetricHandle>,
}

impl<K, V> FakeSink<K, V> {
    pub fn new(key_type: &'static str, value_type: &'static str) -> Self {
        FakeSink {
            id: ProcessorId::fresh(),
            ups: UpstreamSet::none(),
            key_type,
            value_type,
            received: Rc::new(RefCell::new(Vec::new())),
            simulated_queue_len: 0,
            closed: false,
            metric: Box::new(RecordingMetric::new("ktopo_fake_sink_records")),
        }
    }

    pub fn received(&self) -> Rc<RefCell<Vec<RecordRef<K, V>>>> {
        self.received.clone()
    }

    /// Forces `queue_len` to report `len` regardless of what's actually
    /// been received, so a topology-level back-pressure test can push the
    /// aggregate over the threshold without producing tens of thousands
    /// of real records.
    pub fn set_queue_len(&mut self, len: usize) {
        self.simulated_queue_len = len;
    }
}

impl<K, V> PartitionProcessor for FakeSink<K, V> {
    fn id(&self) -> ProcessorId {
        self.id
    }

    fn name(&self) -> String {
        format!("fake_sink({:?})", self.id)
    }

    fn simple_name(&self) -> &'static str {
        "fake_sink"
    }

    fn key_type_name(&self) -> &'static str {
        self.key_type
    }

    fn value_type_name(&self) -> &'static str {
        self.value_type
    }

    fn record_type_name(&self) -> String {
        record_type_name(self.key_type_name(), self.value_type_name())
    }

    fn depth(&self) -> usize {
        0
    }

    fn partition(&self) -> Option<u32> {
        None
    }

    fn upstream_ids(&self) -> &UpstreamSet {
        &self.ups
    }

    fn eof(&self) -> bool {
        true
    }

    fn poll(&mut self, _max_ms: u64) {}

    fn process_one(&mut self, _tick_ms: i64) -> usize {
        0
    }

    fn flush(&mut self) {}

    fn commit(&mut self, _force: bool) {}

    fn garbage_collect(&mut self, _tick_ms: i64) {}

    fn start(&mut self, _offset: Option<StartOffset>) {}

    fn close(&mut self) {
        self.closed = true;
    }

    fn for_each_metric(&mut self, f: &mut dyn FnMut(&mut dyn MetricHandle)) {
        f(self.metric.as_mut());
    }
}

impl<K, V> Downstream<K, V> for FakeSink<K, V> {
    fn push(&mut self, record: RecordRef<K, V>) {
        if self.closed {
            return;
        }
        self.received.borrow_mut().push(record);
    }
}

impl<K, V> Sink for FakeSink<K, V> {
    fn queue_len(&self) -> usize {
        if self.simulated_queue_len > 0 {
            self.simulated_queue_len
        } else {
            self.received.borrow().len()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_delivers_one_record_per_process_one_call_in_order() {
        let source = Rc::new(RefCell::new(FakeSource::<String, ()>::new(0, "string", "void")));
        let sink = Rc::new(RefCell::new(FakeSink::<String, ()>::new("string", "void")));
        source.borrow_mut().add_downstream(sink.clone());

        source.borrow_mut().produce("a".to_string(), (), 0);
        source.borrow_mut().produce("b".to_string(), (), 0);
        source.borrow_mut().close_input();

        assert!(!source.borrow().eof());
        assert_eq!(source.borrow_mut().process_one(0), 1);
        assert_eq!(source.borrow_mut().process_one(0), 1);
        assert_eq!(source.borrow_mut().process_one(0), 0);
        assert!(source.borrow().eof());

        let received = sink.borrow().received();
        let keys: Vec<_> = received.borrow().iter().map(|r| r.key.clone()).collect();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn eof_is_false_until_input_closed_and_drained() {
        let mut source = FakeSource::<String, ()>::new(0, "string", "void");
        assert!(!source.eof());
        source.produce("a".to_string(), (), 0);
        source.close_input();
        assert!(!source.eof());
        source.process_one(0);
        assert!(source.eof());
    }

    #[test]
    fn simulated_queue_len_overrides_actual_received_count() {
        let mut sink = FakeSink::<String, ()>::new("string", "void");
        assert_eq!(sink.queue_len(), 0);
        sink.set_queue_len(60_000);
        assert_eq!(sink.queue_len(), 60_000);
    }
}
