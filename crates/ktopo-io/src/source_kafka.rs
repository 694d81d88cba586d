//! Partition source: one `KafkaSource` per partition number, wrapping
//! `rdkafka`'s low-level `BaseConsumer` and polling it synchronously
//! from `poll`/`process_one`. An async `StreamConsumer` has no place in
//! a coroutine-free driver, so the low-level, manually-assigned
//! consumer takes its place (see DESIGN.md).

use std::time::{Duration, Instant};

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message as _;
use rdkafka::{Offset, TopicPartitionList};
use tracing::{debug, error, warn};

use ktopo_core::codec::Codec;
use ktopo_core::error::Error;
use ktopo_core::metric::{record_type_name, MetricHandle, RecordingMetric};
use ktopo_core::offset::StartOffset;
use ktopo_core::processor::{Downstream, Fanout, NodeHandle, PartitionProcessor, ProcessorId, UpstreamSet};
use ktopo_core::record::{Record, RecordRef};

fn to_rdkafka_offset(offset: StartOffset) -> Offset {
    match offset {
        StartOffset::Beginning => Offset::Beginning,
        StartOffset::Stored => Offset::Stored,
        StartOffset::At(o) => Offset::Offset(o),
    }
}

/// A fetched-but-not-yet-decoded message: `poll` is the point where the
/// broker is actually touched; `process_one` decodes and forwards it,
/// which is what makes `process_one` the unit of progress the engine
/// counts.
struct Pending {
    key: Vec<u8>,
    value: Vec<u8>,
    offset: i64,
    timestamp: i64,
}

/// Partition source over one Kafka topic-partition. `K`/`V` are the
/// record's key/value types; `KC`/`VC` their codecs.
pub struct KafkaSource<K, V, KC, VC> {
    id: ProcessorId,
    ups: UpstreamSet,
    topic: String,
    partition: u32,
    consumer: BaseConsumer,
    key_codec: KC,
    value_codec: VC,
    downstreams: Vec<NodeHandle<dyn Downstream<K, V>>>,
    pending: Option<Pending>,
    broker_eof: bool,
    commit_cadence: Duration,
    last_commit_at: Instant,
    fail_fast: bool,
    failed: bool,
    metric: Box<dyn MetricHandle>,
}

impl<K, V, KC, VC> KafkaSource<K, V, KC, VC>
where
    KC: Codec<K>,
    VC: Codec<V>,
{
    pub fn new(
        brokers: &str,
        topic: impl Into<String>,
        partition: u32,
        key_codec: KC,
        value_codec: VC,
        commit_cadence: Duration,
        fail_fast: bool,
    ) -> anyhow::Result<Self> {
        let topic = topic.into();
        let consumer: BaseConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", format!("ktopo-{}-{}", topic, partition))
            .set("enable.auto.commit", "false")
            .set("enable.partition.eof", "true")
            .create()?;

        let mut tpl = TopicPartitionList::new();
        tpl.add_partition(&topic, partition as i32);
        consumer.assign(&tpl)?;

        Ok(KafkaSource {
            id: ProcessorId::fresh(),
            ups: UpstreamSet::none(),
            topic,
            partition,
            consumer,
            key_codec,
            value_codec,
            downstreams: Vec::new(),
            pending: None,
            broker_eof: false,
            commit_cadence,
            last_commit_at: Instant::now() - commit_cadence,
            fail_fast,
            failed: false,
            metric: Box::new(RecordingMetric::new("ktopo_source_records")),
        })
    }

    fn push_downstream(&mut self, record: RecordRef<K, V>) {
        for d in &self.downstreams {
            d.borrow_mut().push(record.clone());
        }
    }
}

impl<K, V, KC, VC> PartitionProcessor for KafkaSource<K, V, KC, VC>
where
    KC: Codec<K>,
    VC: Codec<V>,
{
    fn id(&self) -> ProcessorId {
        self.id
    }

    fn name(&self) -> String {
        format!("kafka_source({}:{})", self.topic, self.partition)
    }

    fn simple_name(&self) -> &'static str {
        "kafka_source"
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
        Some(self.partition)
    }

    fn upstream_ids(&self) -> &UpstreamSet {
        &self.ups
    }

    fn eof(&self) -> bool {
        self.pending.is_none() && self.broker_eof
    }

    fn has_failed(&self) -> bool {
        self.failed
    }

    fn poll(&mut self, max_ms: u64) {
        if self.pending.is_some() || self.failed {
            return;
        }
        match self.consumer.poll(Duration::from_millis(max_ms)) {
            None => {}
            Some(Ok(msg)) => {
                self.broker_eof = false;
                self.pending = Some(Pending {
                    key: msg.key().unwrap_or(&[]).to_vec(),
                    value: msg.payload().unwrap_or(&[]).to_vec(),
                    offset: msg.offset(),
                    timestamp: msg.timestamp().to_millis().unwrap_or(0),
                });
            }
            Some(Err(KafkaError::PartitionEOF(_))) => {
                self.broker_eof = true;
            }
            Some(Err(e)) => {
                warn!(topic = %self.topic, partition = self.partition, error = %e, "transient broker error polling source");
                if self.fail_fast {
                    error!(topic = %self.topic, partition = self.partition, "fail_fast: marking source failed");
                    self.failed = true;
                }
            }
        }
    }

    fn process_one(&mut self, _tick_ms: i64) -> usize {
        if self.failed {
            return 0;
        }
        let Some(pending) = self.pending.take() else {
            return 0;
        };

        let key = match self.key_codec.decode(&pending.key) {
            Ok(k) => k,
            Err(source) => {
                let err = Error::Codec { partition: self.partition, offset: pending.offset, source };
                error!(topic = %self.topic, partition = self.partition, offset = pending.offset, error = %err, "codec error decoding key, skipping record");
                if self.fail_fast {
                    self.failed = true;
                }
                return 1;
            }
        };
        let value = match self.value_codec.decode(&pending.value) {
            Ok(v) => v,
            Err(source) => {
                let err = Error::Codec { partition: self.partition, offset: pending.offset, source };
                error!(topic = %self.topic, partition = self.partition, offset = pending.offset, error = %err, "codec error decoding value, skipping record");
                if self.fail_fast {
                    self.failed = true;
                }
                return 1;
            }
        };

        let record = Record::with_source(key, value, pending.timestamp, self.partition, pending.offset).into_ref();
        self.push_downstream(record);
        1
    }

    fn flush(&mut self) {}

    fn commit(&mut self, force: bool) {
        if !force && self.last_commit_at.elapsed() < self.commit_cadence {
            return;
        }
        let mut tpl = TopicPartitionList::new();
        let _ = tpl.add_partition_offset(&self.topic, self.partition as i32, Offset::Stored);
        if let Err(e) = self.consumer.commit(&tpl, rdkafka::consumer::CommitMode::Async) {
            warn!(topic = %self.topic, partition = self.partition, error = %e, "commit failed");
        }
        self.last_commit_at = Instant::now();
    }

    fn garbage_collect(&mut self, _tick_ms: i64) {}

    fn start(&mut self, offset: Option<StartOffset>) {
        let offset = offset.unwrap_or_default();
        debug!(topic = %self.topic, partition = self.partition, ?offset, "starting kafka source");
        let mut tpl = TopicPartitionList::new();
        let _ = tpl.add_partition_offset(&self.topic, self.partition as i32, to_rdkafka_offset(offset));
        if let Err(e) = self.consumer.assign(&tpl) {
            error!(topic = %self.topic, partition = self.partition, error = %e, "failed to assign start offset");
        }
    }

    fn close(&mut self) {
        debug!(topic = %self.topic, partition = self.partition, "closing kafka source");
    }

    fn for_each_metric(&mut self, f: &mut dyn FnMut(&mut dyn MetricHandle)) {
        f(self.metric.as_mut());
    }
}

impl<K, V, KC, VC> Fanout<K, V> for KafkaSource<K, V, KC, VC>
where
    KC: Codec<K>,
    VC: Codec<V>,
{
    fn add_downstream(&mut self, downstream: NodeHandle<dyn Downstream<K, V>>) {
        self.downstreams.push(downstream);
    }
}

/// Partition-list helper applied against a live cluster: fetches topic
/// metadata and returns `0..partition_count`. Dynamic partition growth
/// during a run is undefined — this is only ever called once, at
/// topology-creation time.
pub fn partition_list_for_topic(brokers: &str, topic: &str, timeout: Duration) -> anyhow::Result<Vec<u32>> {
    let consumer: BaseConsumer = ClientConfig::new().set("bootstrap.servers", brokers).create()?;
    let metadata = consumer.fetch_metadata(Some(topic), timeout)?;
    let topic_meta = metadata
        .topics()
        .iter()
        .find(|t| t.name() == topic)
        .ok_or_else(|| anyhow::anyhow!("topic {topic} not found in cluster metadata"))?;
    Ok((0..topic_meta.partitions().len() as u32).collect())
}
