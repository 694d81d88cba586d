//! `pipe`: an identity forwarder that additionally exposes an external
//! `produce` entry point for out-of-band injection. Injected records
//! carry the pipe's own partition rather than any upstream offset.

use ktopo_core::metric::{record_type_name, MetricHandle, RecordingMetric};
use ktopo_core::offset::StartOffset;
use ktopo_core::processor::{
    Downstream, Fanout, NodeHandle, PartitionProcessor, ProcessorId, UpstreamSet,
};
use ktopo_core::record::{Record, RecordRef};

/// One `Pipe` per partition of its upstream.
pub struct Pipe<K, V, Up> {
    id: ProcessorId,
    ups: UpstreamSet,
    upstream: NodeHandle<Up>,
    downstreams: Vec<NodeHandle<dyn Downstream<K, V>>>,
    depth: usize,
    partition: Option<u32>,
    key_type: &'static str,
    value_type: &'static str,
    forwarded_since_call: usize,
    metric: Box<dyn MetricHandle>,
}

impl<K, V, Up> Pipe<K, V, Up>
where
    Up: PartitionProcessor,
{
    pub fn new(upstream: &NodeHandle<Up>) -> Self {
        let (depth, partition, key_type, value_type, ups) = {
            let up = upstream.borrow();
            (up.depth() + 1, up.partition(), up.key_type_name(), up.value_type_name(), UpstreamSet::of(&*up))
        };
        Pipe {
            id: ProcessorId::fresh(),
            ups,
            upstream: upstream.clone(),
            downstreams: Vec::new(),
            depth,
            partition,
            key_type,
            value_type,
            forwarded_since_call: 0,
            metric: Box::new(RecordingMetric::new("ktopo_pipe_records")),
        }
    }

    /// Out-of-band injection, independent of the upstream's own progress.
    /// The injected record carries this pipe's partition and the given
    /// timestamp, and is forwarded to every downstream subscriber
    /// immediately, in the order `produce` is called.
    pub fn produce(&mut self, key: K, value: V, timestamp: i64) {
        let mut record = Record::new(key, value, timestamp);
        record.partition = self.partition;
        let record = record.into_ref();
        self.forwarded_since_call += 1;
        for d in &self.downstreams {
            d.borrow_mut().push(record.clone());
        }
    }
}

impl<K, V, Up> PartitionProcessor for Pipe<K, V, Up>
where
    Up: PartitionProcessor,
{
    fn id(&self) -> ProcessorId {
        self.id
    }

    fn name(&self) -> String {
        format!("pipe({:?})", self.id)
    }

    fn simple_name(&self) -> &'static str {
        "pipe"
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

impl<K, V, Up> Downstream<K, V> for Pipe<K, V, Up>
where
    Up: PartitionProcessor,
{
    fn push(&mut self, record: RecordRef<K, V>) {
        self.forwarded_since_call += 1;
        for d in &self.downstreams {
            d.borrow_mut().push(record.clone());
        }
    }
}

impl<K, V, Up> Fanout<K, V> for Pipe<K, V, Up>
where
    Up: PartitionProcessor,
{
    fn add_downstream(&mut self, downstream: NodeHandle<dyn Downstream<K, V>>) {
        self.downstreams.push(downstream);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Stub {
        id: ProcessorId,
        ups: UpstreamSet,
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
            Some(2)
        }
        fn upstream_ids(&self) -> &UpstreamSet {
            &self.ups
        }
        fn eof(&self) -> bool {
            false
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

    struct Collector(Rc<RefCell<Vec<(String, Option<u32>)>>>);
    impl Downstream<String, ()> for Collector {
        fn push(&mut self, record: RecordRef<String, ()>) {
            self.0.borrow_mut().push((record.key.clone(), record.partition));
        }
    }

    #[test]
    fn forwards_upstream_records_and_injects_out_of_band() {
        let stub = Rc::new(RefCell::new(Stub { id: ProcessorId::fresh(), ups: UpstreamSet::none() }));
        let mut pipe = Pipe::new(&stub);

        let out = Rc::new(RefCell::new(Vec::new()));
        pipe.add_downstream(Rc::new(RefCell::new(Collector(out.clone()))));

        pipe.push(Record::new("kafka".to_string(), (), 0).into_ref());
        pipe.push(Record::new("streams".to_string(), (), 0).into_ref());
        pipe.produce("extra message injected".to_string(), (), 0);

        assert_eq!(
            *out.borrow(),
            vec![
                ("kafka".to_string(), None),
                ("streams".to_string(), None),
                ("extra message injected".to_string(), Some(2)),
            ]
        );
    }
}
