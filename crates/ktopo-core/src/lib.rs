//! # ktopo-core
//!
//! Core traits and types for building single-threaded stream-processing
//! topologies over a partitioned, log-structured message broker
//! (Kafka-family). This crate defines the processor contract, the
//! topology run loop, and the configuration/error/metrics plumbing that
//! every concrete source, transform, and sink in `ktopo-io` and
//! `ktopo-tx` builds on.
//!
//! ## Key components
//!
//! - [`record`]: the typed `Record<K, V>` carried along every edge.
//! - [`processor`]: the object-safe `PartitionProcessor` contract, plus
//!   the `Downstream`/`Fanout` traits that give edges static typing.
//! - [`topology`]: DAG assembly, the top-set computation, and the
//!   `process_one`/`flush`/`start`/`commit`/`close` run loop.
//! - [`config`]: `ClusterConfig`, `AppIdentity`, and `TopologyBuilder`.
//! - [`codec`]: the minimal codec interface consumed by sources/sinks.
//! - [`metric`]: tag-string construction for the opaque metric interface.
//! - [`error`]: the engine's typed error enum.
//!
//! ## Example
//!
//! ```no_run
//! use ktopo_core::config::ClusterConfig;
//! use ktopo_core::offset::StartOffset;
//! use ktopo_core::topology::TopologyBuilder;
//!
//! let config = ClusterConfig::from_env();
//! config.validate().expect("invalid cluster configuration");
//! let builder = TopologyBuilder::new("my-app", "worker-0", config).unwrap();
//! let mut topology = builder.create_topology("t1");
//! topology.start(Some(StartOffset::Beginning));
//! topology.flush();
//! topology.close();
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod metric;
pub mod offset;
pub mod processor;
pub mod record;
pub mod topology;

pub use codec::{Codec, JsonCodec, TextCodec, UnitCodec};
pub use config::{AppIdentity, ClusterConfig, ClusterConfigBuilder, TopologyBuilder};
pub use error::{Error, Result};
pub use metric::{MetricHandle, RecordingMetric};
pub use offset::StartOffset;
pub use processor::{Downstream, Fanout, NodeHandle, PartitionProcessor, ProcessorId, Sink, UpstreamSet};
pub use record::{partition_list, Record, RecordRef, Void};
pub use topology::{Topology, BACK_PRESSURE_THRESHOLD, GC_INTERVAL_MS};
