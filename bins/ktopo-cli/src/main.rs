//! Demo topology runner: reproduces a produce/consume round trip against
//! a Kafka-family broker.
//!
//! Builds two topologies in sequence:
//!
//! 1. A standalone-sink topology with no upstream wiring — a single
//!    record is pushed directly onto the sink, then the topology is
//!    dropped, exercising teardown with only a sink in play.
//! 2. A full word-splitting pipeline: a partition source feeds a
//!    `flat_map` that splits each line on whitespace, a `filter` that
//!    drops the word `"hello"`, a `pipe` that additionally injects one
//!    out-of-band message, and a stream sink that writes everything that
//!    survives to stdout. The topology is started at the beginning of
//!    the log and driven to `eof`, then flushed.
//!
//! `--dry-run` runs both topologies against the in-memory fake broker
//! instead of a live cluster, so the demo works with no Kafka running.

use std::io;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ktopo_core::codec::{TextCodec, UnitCodec};
use ktopo_core::config::ClusterConfig;
use ktopo_core::offset::StartOffset;
use ktopo_core::processor::{Downstream, Fanout};
use ktopo_core::record::{Record, RecordRef};
use ktopo_core::topology::{now_ms, TopologyBuilder};
use ktopo_io::testing::{FakeSink, FakeSource};
use ktopo_io::{partition_list_for_topic, KafkaSink, KafkaSource, StreamSink};
use ktopo_tx::{Emitter, Filter, FlatMap, Pipe};

#[derive(Parser, Debug)]
#[command(name = "ktopo-cli")]
#[command(about = "Runs a small demo topology end to end against a Kafka-family broker")]
struct Args {
    /// Run entirely against the in-memory fake broker instead of a live cluster.
    #[arg(long)]
    dry_run: bool,

    /// Comma-separated list of bootstrap brokers.
    #[arg(long, default_value = "localhost:9092")]
    brokers: String,

    /// Topic the demo produces to and consumes from.
    #[arg(long, default_value = "ktopo-demo")]
    topic: String,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = ClusterConfig::from_env();
    config.brokers = args.brokers.clone();
    config.validate().context("invalid cluster configuration")?;
    info!(config = %config.log_summary(), "resolved cluster configuration");

    let builder = TopologyBuilder::new("ktopo-examples", "demo-worker", config)?;

    if args.dry_run {
        run_dry_run(&builder)
    } else {
        run_live(&builder, &args.brokers, &args.topic)
    }
}

fn run_dry_run(builder: &TopologyBuilder) -> Result<()> {
    {
        let mut topology = builder.create_topology("standalone-sink-demo");
        let sink = topology.create_sink(FakeSink::<String, ()>::new("string", "void"));
        sink.borrow_mut().push(Record::new("standalone produce".to_string(), (), now_ms()).into_ref());
        topology.flush();
        topology.close();
        info!("standalone sink demo produced one record");
    }

    let mut topology = builder.create_topology("word-pipeline");

    let sources = topology.create_sources(&[0], |partition| FakeSource::<String, ()>::new(partition, "string", "void"));
    let source = sources[0].clone();
    source.borrow_mut().produce("hello kafka streams".to_string(), (), now_ms());
    source.borrow_mut().close_input();

    let flat_maps = topology.create_processors(&sources, |up| {
        FlatMap::new(up, "string", "void", |r: &RecordRef<String, ()>, emit: &mut Emitter<'_, String, ()>| {
            for word in r.key.split_whitespace() {
                emit.push(word.to_string(), ());
            }
        })
    });
    let filters =
        topology.create_processors(&flat_maps, |up| Filter::new(up, |r: &RecordRef<String, ()>| r.key != "hello"));
    let pipes = topology.create_processors(&filters, |up| Pipe::new(up));
    let pipe = pipes[0].clone();

    let sink = topology.create_sink(FakeSink::<String, ()>::new("string", "void"));
    pipe.borrow_mut().add_downstream(sink.clone());
    let received = sink.borrow().received();

    topology.start(Some(StartOffset::Beginning));
    while !topology.eof() {
        topology.process_one();
    }
    pipe.borrow_mut().produce("extra message injected".to_string(), (), now_ms());
    topology.flush();
    topology.close();

    for record in received.borrow().iter() {
        println!("{}", record.key);
    }

    Ok(())
}

fn run_live(builder: &TopologyBuilder, brokers: &str, topic: &str) -> Result<()> {
    let fail_fast = builder.config().fail_fast;
    {
        let mut topology = builder.create_topology("standalone-sink-demo");
        let sink = topology.create_sink(KafkaSink::new(brokers, topic, TextCodec, UnitCodec, fail_fast)?);
        sink.borrow_mut().push(Record::new("standalone produce".to_string(), (), now_ms()).into_ref());
        topology.flush();
        topology.close();
        info!(topic, "standalone sink demo produced one record");
    }

    let mut topology = builder.create_topology("word-pipeline");

    let partitions = partition_list_for_topic(brokers, topic, Duration::from_secs(5))
        .context("failed to fetch partition metadata")?;

    let sources = topology.create_sources(&partitions, |partition| {
        KafkaSource::new(brokers, topic, partition, TextCodec, UnitCodec, Duration::from_secs(5), fail_fast)
            .expect("failed to create kafka source")
    });

    let flat_maps = topology.create_processors(&sources, |up| {
        FlatMap::new(up, "string", "void", |r: &RecordRef<String, ()>, emit: &mut Emitter<'_, String, ()>| {
            for word in r.key.split_whitespace() {
                emit.push(word.to_string(), ());
            }
        })
    });
    let filters =
        topology.create_processors(&flat_maps, |up| Filter::new(up, |r: &RecordRef<String, ()>| r.key != "hello"));
    let pipes = topology.create_processors(&filters, |up| Pipe::new(up));
    let pipe = pipes[0].clone();

    let sink = topology.create_sink(StreamSink::new(
        "stdout",
        io::stdout(),
        "string",
        "void",
        |r: &Record<String, ()>| r.key.clone(),
    ));
    pipe.borrow_mut().add_downstream(sink.clone());

    topology.start(Some(StartOffset::Beginning));
    while !topology.eof() {
        topology.process_one();
        std::thread::sleep(Duration::from_millis(10));
    }
    pipe.borrow_mut().produce("extra message injected".to_string(), (), now_ms());
    topology.flush();
    topology.close();

    Ok(())
}
