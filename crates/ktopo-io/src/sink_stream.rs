//! Stream sink: writes a record's textual rendering to any
//! `std::io::Write`. There is no blanket `Display` bound on `K`/`V` here
//! since `Void = ()` doesn't implement it, so formatting is delegated to
//! a caller-supplied closure instead.

use std::io::Write;

use tracing::warn;

use ktopo_core::metric::{record_type_name, MetricHandle, RecordingMetric};
use ktopo_core::offset::StartOffset;
use ktopo_core::processor::{Downstream, PartitionProcessor, ProcessorId, Sink, UpstreamSet};
use ktopo_core::record::{Record, RecordRef};

/// Writes every record it receives, formatted by `format`, as one line to
/// `sink`. Synchronous and unbuffered beyond what `sink` itself buffers, so
/// `queue_len` is always 0 — there is nothing left in flight once `push`
/// returns.
pub struct StreamSink<K, V, W, F> {
    id: ProcessorId,
    ups: UpstreamSet,
    name: String,
    sink: W,
    format: F,
    key_type: &'static str,
    value_type: &'static str,
    closed: bool,
    metric: Box<dyn MetricHandle>,
    _marker: std::marker::PhantomData<(K, V)>,
}

impl<K, V, W, F> StreamSink<K, V, W, F>
where
    W: Write,
    F: FnMut(&Record<K, V>) -> String,
{
    pub fn new(name: impl Into<String>, sink: W, key_type: &'static str, value_type: &'static str, format: F) -> Self {
        StreamSink {
            id: ProcessorId::fresh(),
            ups: UpstreamSet::none(),
            name: name.into(),
            sink,
            format,
            key_type,
            value_type,
            closed: false,
            metric: Box::new(RecordingMetric::new("ktopo_stream_sink_records")),
            _marker: std::marker::PhantomData,
        }
    }

    fn write_record(&mut self, record: &Record<K, V>) {
        let line = (self.format)(record);
        if let Err(e) = writeln!(self.sink, "{line}") {
            warn!(sink = %self.name, error = %e, "stream sink write failed");
        }
    }
}

impl<K, V, W, F> PartitionProcessor for StreamSink<K, V, W, F>
where
    W: Write,
    F: FnMut(&Record<K, V>) -> String,
{
    fn id(&self) -> ProcessorId {
        self.id
    }

    fn name(&self) -> String {
        format!("stream_sink({})", self.name)
    }

    fn simple_name(&self) -> &'static str {
        "stream_sink"
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

    fn flush(&mut self) {
        let _ = self.sink.flush();
    }

    fn commit(&mut self, _force: bool) {}

    fn garbage_collect(&mut self, _tick_ms: i64) {}

    fn start(&mut self, _offset: Option<StartOffset>) {}

    fn close(&mut self) {
        let _ = self.sink.flush();
        self.closed = true;
    }

    fn for_each_metric(&mut self, f: &mut dyn FnMut(&mut dyn MetricHandle)) {
        f(self.metric.as_mut());
    }
}

impl<K, V, W, F> Downstream<K, V> for StreamSink<K, V, W, F>
where
    W: Write,
    F: FnMut(&Record<K, V>) -> String,
{
    fn push(&mut self, record: RecordRef<K, V>) {
        if self.closed {
            return;
        }
        self.write_record(&record);
    }
}

impl<K, V, W, F> Sink for StreamSink<K, V, W, F>
where
    W: Write,
    F: FnMut(&Record<K, V>) -> String,
{
    fn queue_len(&self) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_formatted_line_per_record() {
        let buf: Vec<u8> = Vec::new();
        let mut sink = StreamSink::new("test", buf, "string", "void", |r: &Record<String, ()>| r.key.clone());
        sink.push(Record::new("hello".to_string(), (), 0).into_ref());
        sink.push(Record::new("world".to_string(), (), 0).into_ref());
        assert_eq!(String::from_utf8(sink.sink.clone()).unwrap(), "hello\nworld\n");
    }

    #[test]
    fn close_rejects_further_produce() {
        let buf: Vec<u8> = Vec::new();
        let mut sink = StreamSink::new("test", buf, "string", "void", |r: &Record<String, ()>| r.key.clone());
        sink.push(Record::new("before".to_string(), (), 0).into_ref());
        sink.close();
        sink.push(Record::new("after".to_string(), (), 0).into_ref());
        assert_eq!(String::from_utf8(sink.sink.clone()).unwrap(), "before\n");
    }
}
