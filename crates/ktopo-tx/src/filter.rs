//! Stateless predicate filter: forwards a record iff `predicate(record)`
//! is true. Never produces new records and preserves order.

use ktopo_core::metric::{record_type_name, MetricHandle, RecordingMetric};
use ktopo_core::offset::StartOffset;
use ktopo_core::processor::{
    Downstream, Fanout, NodeHandle, PartitionProcessor, ProcessorId, UpstreamSet,
};
use ktopo_core::record::RecordRef;

/// One `Filter` per partition of its upstream. Holds a handle to its
/// upstream so `process_one`/`commit`/`start`/`flush` can propagate the
/// call transitively — this node itself never touches a broker.
pub struct Filter<K, V, Up, F> {
    id: ProcessorId,
    ups: UpstreamSet,
    upstream: NodeHandle<Up>,
    predicate: F,
    downstreams: Vec<NodeHandle<dyn Downstream<K, V>>>,
    depth: usize,
    partition: Option<u32>,
    key_type: &'static str,
    value_type: &'static str,
    forwarded_since_call: usize,
    metric: Box<dyn MetricHandle>,
    _marker: std::marker::PhantomData<(K, V)>,
}

impl<K, V, Up, F> Filter<K, V, Up, F>
where
    Up: PartitionProcessor,
    F: FnMut(&RecordRef<K, V>) -> bool,
{
    pub fn new(upstream: &NodeHandle<Up>, predicate: F) -> Self {
        let (depth, partition, key_type, value_type, ups) = {
            let up = upstream.borrow();
            (up.depth() + 1, up.partition(), up.key_type_name(), up.value_type_name(), UpstreamSet::of(&*up))
        };
        Filter {
            id: ProcessorId::fresh(),
            ups,
            upstream: upstream.clone(),
            predicate,
            downstreams: Vec::new(),
            depth,
            partition,
            key_type,
            value_type,
            forwarded_since_call: 0,
            metric: Box::new(RecordingMetric::new("ktopo_filter_records")),
            _marker: std::marker::PhantomData,
        }
    }
}

impl<K, V, Up, F> PartitionProcessor for Filter<K, V, Up, F>
where
    Up: PartitionProcessor,
    F: FnMut(&RecordRef<K, V>) -> bool,
{
    fn id(&self) -> ProcessorId {
        self.id
    }

    fn name(&self) -> String {
        format!("filter({:?})", self.id)
    }

    fn simple_name(&self) -> &'static str {
        "filter"
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
        self.depth
    }

    fn partition(&self) -> Option<u32> {
        self.partition
    }

    fn upstream_ids(&self) -> &UpstreamSet {
        &self.ups
    }

    fn eof(&self) -> bool {
        self.upstream.borrow().eof()
    }

    fn poll(&mut self, _max_ms: u64) {}

    fn process_one(&mut self, tick_ms: i64) -> usize {
        self.upstream.borrow_mut().process_one(tick_ms);
        let count = self.forwarded_since_call;
        self.forwarded_since_call = 0;
        count
    }

    fn flush(&mut self) {
        self.upstream.borrow_mut().flush();
    }

    fn commit(&mut self, force: bool) {
        self.upstream.borrow_mut().commit(force);
    }

    fn garbage_collect(&mut self, _tick_ms: i64) {}

    fn start(&mut self, offset: Option<StartOffset>) {
        self.upstream.borrow_mut().start(offset);
    }

    fn close(&mut self) {}

    fn for_each_metric(&mut self, f: &mut dyn FnMut(&mut dyn MetricHandle)) {
        f(self.metric.as_mut());
    }
}

impl<K, V, Up, F> Downstream<K, V> for Filter<K, V, Up, F>
where
    Up: PartitionProcessor,
    F: FnMut(&RecordRef<K, V>) -> bool,
{
    fn push(&mut self, record: RecordRef<K, V>) {
        if !(self.predicate)(&record) {
            return;
        }
        self.forwarded_since_call += 1;
        for d in &self.downstreams {
            d.borrow_mut().push(record.clone());
        }
    }
}

impl<K, V, Up, F> Fanout<K, V> for Filter<K, V, Up, F>
where
    Up: PartitionProcessor,
    F: FnMut(&RecordRef<K, V>) -> bool,
{
    fn add_downstream(&mut self, downstream: NodeHandle<dyn Downstream<K, V>>) {
        self.downstreams.push(downstream);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ktopo_core::record::Record;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Stub {
        id: ProcessorId,
        ups: UpstreamSet,
        eof: bool,
    }

    impl PartitionProcessor for Stub {
        fn id(&self) -> ProcessorId {
            self.id
        }
        fn name(&self) -> String {
            "stub".into()
        }
        fn simple_name(&self) -> &'static str {
            "stub"
        }
        fn key_type_name(&self) -> &'static str {
            "string"
        }
        fn value_type_name(&self) -> &'static str {
            "void"
        }
        fn depth(&self) -> usize {
            0
        }
        fn partition(&self) -> Option<u32> {
            Some(0)
        }
        fn upstream_ids(&self) -> &UpstreamSet {
            &self.ups
        }
        fn eof(&self) -> bool {
            self.eof
        }
        fn poll(&mut self, _max_ms: u64) {}
        fn process_one(&mut self, _tick_ms: i64) -> usize {
            0
        }
        fn flush(&mut self) {}
        fn commit(&mut self, _force: bool) {}
        fn garbage_collect(&mut self, _tick_ms: i64) {}
        fn start(&mut self, _offset: Option<StartOffset>) {}
        fn close(&mut self) {}
    }

    struct Collector(Rc<RefCell<Vec<String>>>);
    impl Downstream<String, ()> for Collector {
        fn push(&mut self, record: RecordRef<String, ()>) {
            self.0.borrow_mut().push(record.key.clone());
        }
    }

    #[test]
    fn forwards_only_matching_records_in_order() {
        let stub = Rc::new(RefCell::new(Stub { id: ProcessorId::fresh(), ups: UpstreamSet::none(), eof: false }));
        let mut filter = Filter::new(&stub, |r: &RecordRef<String, ()>| r.key != "hello");

        let out = Rc::new(RefCell::new(Vec::new()));
        filter.add_downstream(Rc::new(RefCell::new(Collector(out.clone()))));

        filter.push(Record::new("hello".to_string(), (), 0).into_ref());
        filter.push(Record::new("kafka".to_string(), (), 0).into_ref());
        filter.push(Record::new("streams".to_string(), (), 0).into_ref());

        assert_eq!(*out.borrow(), vec!["kafka".to_string(), "streams".to_string()]);
    }

    #[test]
    fn depth_is_one_more_than_upstream() {
        let stub = Rc::new(RefCell::new(Stub { id: ProcessorId::fresh(), ups: UpstreamSet::none(), eof: false }));
        let filter = Filter::new(&stub, |_: &RecordRef<String, ()>| true);
        assert_eq!(filter.depth(), 1);
    }

    #[test]
    fn eof_mirrors_upstream() {
        let stub = Rc::new(RefCell::new(Stub { id: ProcessorId::fresh(), ups: UpstreamSet::none(), eof: true }));
        let filter = Filter::new(&stub, |_: &RecordRef<String, ()>| true);
        assert!(filter.eof());
    }
}
