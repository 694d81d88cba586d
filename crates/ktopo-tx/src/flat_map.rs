//! `flat_map`: invokes `f(record, emitter)` for every inbound record; `f`
//! pushes zero or more new records (possibly with a different key/value
//! type) to `emitter`, which are forwarded downstream in the order
//! pushed. Preserves the per-partition total order of inputs.

use ktopo_core::metric::{record_type_name, MetricHandle, RecordingMetric};
use ktopo_core::offset::StartOffset;
use ktopo_core::processor::{
    Downstream, Fanout, NodeHandle, PartitionProcessor, ProcessorId, UpstreamSet,
};
use ktopo_core::record::{Record, RecordRef};

/// Accepts emitted (key, value) pairs, timestamped with the triggering
/// record's own timestamp.
pub struct Emitter<'a, KOut, VOut> {
    out: &'a mut Vec<RecordRef<KOut, VOut>>,
    timestamp: i64,
}

impl<'a, KOut, VOut> Emitter<'a, KOut, VOut> {
    pub fn push(&mut self, key: KOut, value: VOut) {
        self.out.push(Record::new(key, value, self.timestamp).into_ref());
    }
}

/// One `FlatMap` per partition of its upstream.
pub struct FlatMap<K, V, KOut, VOut, Up, F> {
    id: ProcessorId,
    ups: UpstreamSet,
    upstream: NodeHandle<Up>,
    f: F,
    downstreams: Vec<NodeHandle<dyn Downstream<KOut, VOut>>>,
    depth: usize,
    partition: Option<u32>,
    key_type: &'static str,
    value_type: &'static str,
    forwarded_since_call: usize,
    metric: Box<dyn MetricHandle>,
    _marker: std::marker::PhantomData<(K, V, KOut, VOut)>,
}

impl<K, V, KOut, VOut, Up, F> FlatMap<K, V, KOut, VOut, Up, F>
where
    Up: PartitionProcessor,
    F: FnMut(&RecordRef<K, V>, &mut Emitter<'_, KOut, VOut>),
{
    pub fn new(upstream: &NodeHandle<Up>, key_type: &'static str, value_type: &'static str, f: F) -> Self {
        let (depth, partition, ups) = {
            let up = upstream.borrow();
            (up.depth() + 1, up.partition(), UpstreamSet::of(&*up))
        };
        FlatMap {
            id: ProcessorId::fresh(),
            ups,
            upstream: upstream.clone(),
            f,
            downstreams: Vec::new(),
            depth,
            partition,
            key_type,
            value_type,
            forwarded_since_call: 0,
            metric: Box::new(RecordingMetric::new("ktopo_flat_map_records")),
            _marker: std::marker::PhantomData,
        }
    }
}

impl<K, V, KOut, VOut, Up, F> PartitionProcessor for FlatMap<K, V, KOut, VOut, Up, F>
where
    Up: PartitionProcessor,
    F: FnMut(&RecordRef<K, V>, &mut Emitter<'_, KOut, VOut>),
{
    fn id(&self) -> ProcessorId {
        self.id
    }

    fn name(&self) -> String {
        format!("flat_map({:?})", self.id)
    }

    fn simple_name(&self) -> &'static str {
        "flat_map"
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

impl<K, V, KOut, VOut, Up, F> Downstream<K, V> for FlatMap<K, V, KOut, VOut, Up, F>
where
    Up: PartitionProcessor,
    F: FnMut(&RecordRef<K, V>, &mut Emitter<'_, KOut, VOut>),
{
    fn push(&mut self, record: RecordRef<K, V>) {
        let mut out = Vec::new();
        {
            let mut emitter = Emitter { out: &mut out, timestamp: record.timestamp };
            (self.f)(&record, &mut emitter);
        }
        self.forwarded_since_call += out.len();
        for emitted in out {
            for d in &self.downstreams {
                d.borrow_mut().push(emitted.clone());
            }
        }
    }
}

impl<K, V, KOut, VOut, Up, F> Fanout<KOut, VOut> for FlatMap<K, V, KOut, VOut, Up, F>
where
    Up: PartitionProcessor,
    F: FnMut(&RecordRef<K, V>, &mut Emitter<'_, KOut, VOut>),
{
    fn add_downstream(&mut self, downstream: NodeHandle<dyn Downstream<KOut, VOut>>) {
        self.downstreams.push(downstream);
    }
}
