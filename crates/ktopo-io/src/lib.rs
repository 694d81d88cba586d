//! # ktopo-io
//!
//! Concrete sources and sinks for `ktopo` topologies: a Kafka partition
//! source and sink built on `rdkafka`'s low-level, non-async
//! consumer/producer (the engine is coroutine-free — there is no tokio
//! reactor to hand an async client to), a stream sink for writing a
//! record's textual form to any `std::io::Write`, and a `metrics`-crate
//! adapter for the opaque `MetricHandle` interface `ktopo-core` stamps
//! tags onto.
//!
//! `testing` ships an in-memory fake broker so engine-level properties
//! can be exercised in this crate's tests without a live Kafka cluster.

pub mod metrics_prom;
pub mod sink_kafka;
pub mod sink_stream;
pub mod source_kafka;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use metrics_prom::PrometheusMetric;
pub use sink_kafka::KafkaSink;
pub use sink_stream::StreamSink;
pub use source_kafka::{partition_list_for_topic, KafkaSource};
