//! Kafka sink : a partition-agnostic producer wrapping
//! `rdkafka`'s low-level `BaseProducer`. Polled synchronously from
//! `process_one`/`poll` so delivery callbacks run on the driver thread
//! alongside everything else — no tokio reactor, same reasoning as
//! `source_kafka`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::producer::{BaseProducer, BaseRecord, DeliveryResult, ProducerContext};
use rdkafka::ClientContext;
use tracing::{error, warn};

use ktopo_core::codec::Codec;
use ktopo_core::metric::{record_type_name, MetricHandle, RecordingMetric};
use ktopo_core::offset::StartOffset;
use ktopo_core::processor::{Downstream, PartitionProcessor, ProcessorId, Sink, UpstreamSet};
use ktopo_core::record::RecordRef;

/// Tracks in-flight delivery count so `Sink::queue_len` reflects records
/// actually unacknowledged by the broker, not just records handed to
/// `BaseProducer::send` (which buffers internally too).
#[derive(Default)]
struct DeliveryTracker {
    in_flight: AtomicUsize,
}

struct TrackingContext {
    tracker: Arc<DeliveryTracker>,
    topic: String,
}

impl ClientContext for TrackingContext {}

impl ProducerContext for TrackingContext {
    type DeliveryOpaque = ();

    fn delivery(&self, result: &DeliveryResult<'_>, _opaque: Self::DeliveryOpaque) {
        self.tracker.in_flight.fetch_sub(1, Ordering::SeqCst);
        if let Err((e, _msg)) = result {
            error!(topic = %self.topic, error = %e, "kafka sink delivery failed");
        }
    }
}

/// Partition-agnostic Kafka sink. `K`/`V` are the record's key/value
/// types; `KC`/`VC` their codecs. Partitioning is delegated to the
/// broker's own key-hash partitioner rather than reimplemented here.
pub struct KafkaSink<K, V, KC, VC> {
    id: ProcessorId,
    ups: UpstreamSet,
    topic: String,
    producer: BaseProducer<TrackingContext>,
    tracker: Arc<DeliveryTracker>,
    key_codec: KC,
    value_codec: VC,
    fail_fast: bool,
    failed: bool,
    closed: bool,
    metric: Box<dyn MetricHandle>,
    _marker: std::marker::PhantomData<(K, V)>,
}

impl<K, V, KC, VC> KafkaSink<K, V, KC, VC>
where
    KC: Codec<K>,
    VC: Codec<V>,
{
    pub fn new(brokers: &str, topic: impl Into<String>, key_codec: KC, value_codec: VC, fail_fast: bool) -> anyhow::Result<Self> {
        let topic = topic.into();
        let tracker = Arc::new(DeliveryTracker::default());
        let context = TrackingContext { tracker: tracker.clone(), topic: topic.clone() };
        let producer: BaseProducer<TrackingContext> = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .create_with_context(context)?;

        Ok(KafkaSink {
            id: ProcessorId::fresh(),
            ups: UpstreamSet::none(),
            topic,
            producer,
            tracker,
            key_codec,
            value_codec,
            fail_fast,
            failed: false,
            closed: false,
            metric: Box::new(RecordingMetric::new("ktopo_sink_records")),
            _marker: std::marker::PhantomData,
        })
    }

    /// External injection point.
    pub fn produce(&mut self, key: &K, value: &V) {
        let key_bytes = match self.key_codec.encode(key) {
            Ok(b) => b,
            Err(e) => return self.fail_encode("key", e),
        };
        let value_bytes = match self.value_codec.encode(value) {
            Ok(b) => b,
            Err(e) => return self.fail_encode("value", e),
        };
        self.enqueue(key_bytes, value_bytes);
    }

    fn fail_encode(&mut self, which: &str, err: anyhow::Error) {
        warn!(topic = %self.topic, which, error = %err, "codec error encoding outbound record, skipping");
        if self.fail_fast {
            self.failed = true;
        }
    }

    fn enqueue(&mut self, key_bytes: Vec<u8>, value_bytes: Vec<u8>) {
        if self.failed || self.closed {
            return;
        }
        let record: BaseRecord<'_, [u8], [u8]> = BaseRecord::to(&self.topic).key(&key_bytes).payload(&value_bytes);
        self.tracker.in_flight.fetch_add(1, Ordering::SeqCst);
        if let Err((e, _record)) = self.producer.send(record) {
            self.tracker.in_flight.fetch_sub(1, Ordering::SeqCst);
            warn!(topic = %self.topic, error = %e, "failed to enqueue record on kafka sink");
            if self.fail_fast {
                self.failed = true;
            }
        }
    }
}

impl<K, V, KC, VC> PartitionProcessor for KafkaSink<K, V, KC, VC>
where
    KC: Codec<K>,
    VC: Codec<V>,
{
    fn id(&self) -> ProcessorId {
        self.id
    }

    fn name(&self) -> String {
        format!("kafka_sink({})", self.topic)
    }

    fn simple_name(&self) -> &'static str {
        "kafka_sink"
    }

    fn key_type_name(&self) -> &'static str {
        self.key_codec.type_name()
    }

    fn value_type_name(&self) -> &'static str {
        self.value_codec.type_name()
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
        self.tracker.in_flight.load(Ordering::SeqCst) == 0
    }

    fn has_failed(&self) -> bool {
        self.failed
    }

    fn poll(&mut self, max_ms: u64) {
        self.producer.poll(Duration::from_millis(max_ms));
    }

    fn process_one(&mut self, _tick_ms: i64) -> usize {
        self.producer.poll(Duration::from_millis(0));
        0
    }

    fn flush(&mut self) {
        if let Err(e) = self.producer.flush(Duration::from_secs(30)) {
            warn!(topic = %self.topic, error = %e, "kafka sink flush did not complete cleanly");
        }
    }

    fn commit(&mut self, _force: bool) {}

    fn garbage_collect(&mut self, _tick_ms: i64) {}

    fn start(&mut self, _offset: Option<StartOffset>) {}

    fn close(&mut self) {
        self.flush();
        self.closed = true;
    }

    fn for_each_metric(&mut self, f: &mut dyn FnMut(&mut dyn MetricHandle)) {
        f(self.metric.as_mut());
    }
}

impl<K, V, KC, VC> Downstream<K, V> for KafkaSink<K, V, KC, VC>
where
    KC: Codec<K>,
    VC: Codec<V>,
{
    fn push(&mut self, record: RecordRef<K, V>) {
        let key_bytes = match self.key_codec.encode(&record.key) {
            Ok(b) => b,
            Err(e) => return self.fail_encode("key", e),
        };
        let value_bytes = match self.value_codec.encode(&record.value) {
            Ok(b) => b,
            Err(e) => return self.fail_encode("value", e),
        };
        self.enqueue(key_bytes, value_bytes);
    }
}

impl<K, V, KC, VC> Sink for KafkaSink<K, V, KC, VC>
where
    KC: Codec<K>,
    VC: Codec<V>,
{
    fn queue_len(&self) -> usize {
        self.tracker.in_flight.load(Ordering::SeqCst)
    }
}
