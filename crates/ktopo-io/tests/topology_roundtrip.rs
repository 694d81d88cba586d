//! Exercises a full DAG — fake source, `flat_map`, `filter`, `pipe`, fake
//! sink — end to end through the run loop, driven the same way a real
//! application would drive it: `start`, repeated `process_one` until
//! `eof`, then `flush`.

use ktopo_core::config::ClusterConfig;
use ktopo_core::processor::{Downstream, Fanout};
use ktopo_core::record::RecordRef;
use ktopo_core::topology::TopologyBuilder;
use ktopo_io::testing::{FakeSink, FakeSource};
use ktopo_tx::{Emitter, Filter, FlatMap, Pipe};

#[test]
fn splits_filters_and_injects_in_order() {
    let builder = TopologyBuilder::new("ktopo-examples", "worker-1", ClusterConfig::default()).unwrap();
    let mut topology = builder.create_topology("word-pipeline");

    let sources =
        topology.create_sources(&[0], |partition| FakeSource::<String, ()>::new(partition, "string", "void"));
    let source = sources[0].clone();

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

    source.borrow_mut().produce("hello kafka streams".to_string(), (), 0);
    source.borrow_mut().close_input();

    topology.start(None);
    while !topology.eof() {
        topology.process_one();
    }
    pipe.borrow_mut().produce("extra message injected".to_string(), (), 0);
    topology.flush();

    let keys: Vec<_> = received.borrow().iter().map(|r| r.key.clone()).collect();
    assert_eq!(
        keys,
        vec!["kafka".to_string(), "streams".to_string(), "extra message injected".to_string()]
    );
}

#[test]
fn back_pressure_pauses_source_advancement_until_sink_drains() {
    let builder = TopologyBuilder::new("ktopo-examples", "worker-1", ClusterConfig::default()).unwrap();
    let mut topology = builder.create_topology("back-pressure");

    let sources = topology.create_sources(&[0], |partition| FakeSource::<String, ()>::new(partition, "string", "void"));
    let source = sources[0].clone();

    let sink = topology.create_sink(FakeSink::<String, ()>::new("string", "void"));
    source.borrow_mut().add_downstream(sink.clone());

    source.borrow_mut().produce("a".to_string(), (), 0);
    sink.borrow_mut().set_queue_len(60_000);

    topology.start(None);
    assert_eq!(topology.process_one(), 0);
    assert_eq!(source.borrow().queued(), 1);

    sink.borrow_mut().set_queue_len(0);
    assert_eq!(topology.process_one(), 1);
}

#[test]
fn two_filters_on_the_same_fanout_observe_the_same_order() {
    let builder = TopologyBuilder::new("ktopo-examples", "worker-1", ClusterConfig::default()).unwrap();
    let mut topology = builder.create_topology("fanout-ordering");

    let sources =
        topology.create_sources(&[0], |partition| FakeSource::<String, ()>::new(partition, "string", "void"));
    let source = sources[0].clone();

    let flat_maps = topology.create_processors(&sources, |up| {
        FlatMap::new(up, "string", "void", |r: &RecordRef<String, ()>, emit: &mut Emitter<'_, String, ()>| {
            for word in r.key.split_whitespace() {
                emit.push(word.to_string(), ());
            }
        })
    });

    // Two independent filter processors subscribed to the same flat_map
    // fanout, each created in its own `create_processors` call so the
    // flat_map's `add_downstream` is invoked twice, once per subscriber.
    let filters_a =
        topology.create_processors(&flat_maps, |up| Filter::new(up, |r: &RecordRef<String, ()>| r.key != "hello"));
    let filters_b =
        topology.create_processors(&flat_maps, |up| Filter::new(up, |r: &RecordRef<String, ()>| r.key != "hello"));

    let sink_a = topology.create_sink(FakeSink::<String, ()>::new("string", "void"));
    filters_a[0].borrow_mut().add_downstream(sink_a.clone());
    let received_a = sink_a.borrow().received();

    let sink_b = topology.create_sink(FakeSink::<String, ()>::new("string", "void"));
    filters_b[0].borrow_mut().add_downstream(sink_b.clone());
    let received_b = sink_b.borrow().received();

    source.borrow_mut().produce("hello kafka streams now".to_string(), (), 0);
    source.borrow_mut().close_input();

    topology.start(None);
    while !topology.eof() {
        topology.process_one();
    }
    topology.flush();

    let keys_a: Vec<_> = received_a.borrow().iter().map(|r| r.key.clone()).collect();
    let keys_b: Vec<_> = received_b.borrow().iter().map(|r| r.key.clone()).collect();
    let expected = vec!["kafka".to_string(), "streams".to_string(), "now".to_string()];
    assert_eq!(keys_a, expected);
    assert_eq!(keys_b, expected);
}

#[test]
fn close_after_flush_rejects_further_produce_on_any_sink() {
    let builder = TopologyBuilder::new("ktopo-examples", "worker-1", ClusterConfig::default()).unwrap();
    let mut topology = builder.create_topology("close-after-flush");

    let sink = topology.create_sink(FakeSink::<String, ()>::new("string", "void"));
    let received = sink.borrow().received();

    sink.borrow_mut().push(ktopo_core::record::Record::new("before-close".to_string(), (), 0).into_ref());
    topology.flush();
    topology.close();
    sink.borrow_mut().push(ktopo_core::record::Record::new("after-close".to_string(), (), 0).into_ref());

    let keys: Vec<_> = received.borrow().iter().map(|r| r.key.clone()).collect();
    assert_eq!(keys, vec!["before-close".to_string()]);
}
