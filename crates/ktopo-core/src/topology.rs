//! Topology assembly and the run loop: DAG wiring, top-set computation,
//! and the `init`/`process_one`/`flush` drive cycle.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use crate::config::{AppIdentity, ClusterConfig};
use crate::error::{Error, Result};
use crate::metric::MetricHandle;
use crate::offset::StartOffset;
use crate::processor::{Downstream, Fanout, NodeHandle, PartitionProcessor, Sink};

/// Aggregate unflushed-record threshold above which the run loop pauses
/// source advancement for one pass.
pub const BACK_PRESSURE_THRESHOLD: usize = 50_000;

/// Minimum interval between `garbage_collect` sweeps.
pub const GC_INTERVAL_MS: i64 = 10_000;

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Replaces characters forbidden in path segments on common filesystems
/// with `_`, so a topology's storage directory is always constructible
/// regardless of what an application names itself.
pub fn sanitize_filename(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0' => '_',
            c => c,
        })
        .collect()
}

type DynProcessor = Rc<RefCell<dyn PartitionProcessor>>;
type DynSink = Rc<RefCell<dyn Sink>>;

/// An application-declared DAG of processors bound to one application
/// identity. Owns its processors and sinks exclusively and must only
/// ever be driven from its single owning thread.
pub struct Topology {
    app: Arc<AppIdentity>,
    config: Arc<ClusterConfig>,
    topology_id: String,
    processors: Vec<DynProcessor>,
    sinks: Vec<DynSink>,
    top_set: Vec<usize>,
    initialized: bool,
    next_gc_ts: i64,
    /// Latched true once any processor or sink reports `has_failed()`
    /// (§7: fatal broker error, or a `fail_fast` transient/codec/delivery
    /// error promoted to fatal). Checked at the top of every subsequent
    /// `process_one`/`drain_until_quiescent` pass so the driver stops
    /// advancing a failed topology instead of spinning.
    failed: bool,
}

impl Topology {
    pub(crate) fn new(app: Arc<AppIdentity>, config: Arc<ClusterConfig>, topology_id: impl Into<String>) -> Self {
        let topology_id = topology_id.into();
        let topology = Topology {
            app,
            config,
            topology_id,
            processors: Vec::new(),
            sinks: Vec::new(),
            top_set: Vec::new(),
            initialized: false,
            next_gc_ts: 0,
            failed: false,
        };
        info!(topology = %topology.name(), "topology created");
        topology
    }

    /// `[<app_identity>]<topology_id>`, used in every log line the
    /// topology emits.
    pub fn name(&self) -> String {
        format!("[{}]{}", self.app.identity(), self.topology_id)
    }

    pub fn topology_id(&self) -> &str {
        &self.topology_id
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn has_failed(&self) -> bool {
        self.failed
    }

    /// Creates a standalone sink with no upstream wiring (records reach it
    /// only via its own `produce` entry point — e.g. a broker sink fed
    /// directly by application code rather than by upstream transforms).
    pub fn create_sink<S: Sink + 'static>(&mut self, sink: S) -> NodeHandle<S> {
        let handle = Rc::new(RefCell::new(sink));
        self.sinks.push(handle.clone() as DynSink);
        self.initialized = false;
        handle
    }

    /// Creates one `P` per upstream, wiring each new instance into its
    /// upstream's fan-out list and appending it to the partition-processor
    /// set. The caller receives the created instances so they can be
    /// passed as upstreams to the next stage.
    pub fn create_processors<K, V, Up, P>(
        &mut self,
        upstreams: &[NodeHandle<Up>],
        mut make: impl FnMut(&NodeHandle<Up>) -> P,
    ) -> Vec<NodeHandle<P>>
    where
        Up: Fanout<K, V> + 'static,
        P: Downstream<K, V> + PartitionProcessor + 'static,
    {
        let mut out = Vec::with_capacity(upstreams.len());
        for up in upstreams {
            let node = make(up);
            let handle: NodeHandle<P> = Rc::new(RefCell::new(node));
            up.borrow_mut().add_downstream(handle.clone());
            self.processors.push(handle.clone() as DynProcessor);
            out.push(handle);
        }
        self.initialized = false;
        out
    }

    /// Creates one source `P` per partition number supplied by the
    /// caller, one instance per partition.
    pub fn create_sources<P>(
        &mut self,
        partitions: &[u32],
        mut make: impl FnMut(u32) -> P,
    ) -> Vec<NodeHandle<P>>
    where
        P: PartitionProcessor + 'static,
    {
        let mut out = Vec::with_capacity(partitions.len());
        for &partition in partitions {
            let node = make(partition);
            let handle: NodeHandle<P> = Rc::new(RefCell::new(node));
            self.processors.push(handle.clone() as DynProcessor);
            out.push(handle);
        }
        self.initialized = false;
        out
    }

    /// Computes the top set: partition processors with no downstream
    /// partition-processor consumer. Idempotent and cheap to re-run; safe
    /// to call repeatedly from `start`/`commit`/`flush`.
    pub fn init(&mut self) {
        let mut top_set = Vec::new();
        for (i, candidate) in self.processors.iter().enumerate() {
            let candidate_id = candidate.borrow().id();
            let consumed_by_something = self.processors.iter().enumerate().any(|(j, other)| {
                j != i && other.borrow().is_upstream(candidate_id)
            });
            if consumed_by_something {
                debug!(topology = %self.name(), processor = %candidate.borrow().name(), "skipping poll of non-top processor");
            } else {
                top_set.push(i);
            }
        }
        self.top_set = top_set;
        self.initialized = true;
        self.stamp_metric_tags();
    }

    fn ensure_init(&mut self) {
        if !self.initialized {
            self.init();
        }
    }

    fn stamp_metric_tags(&mut self) {
        let topology_id = self.topology_id.clone();
        for p in &self.processors {
            let mut p = p.borrow_mut();
            let depth = p.depth();
            let partition = p.partition().unwrap_or(0);
            let key_type = p.key_type_name();
            let value_type = p.value_type_name();
            let simple_name = p.simple_name();
            let record_type = p.record_type_name();
            let tags = crate::metric::processor_tags(
                depth, key_type, partition, simple_name, &record_type, &topology_id, value_type,
            );
            p.for_each_metric(&mut |m: &mut dyn MetricHandle| m.set_tags(&tags));
        }
        for s in &self.sinks {
            let mut s = s.borrow_mut();
            let key_type = s.key_type_name();
            let value_type = s.value_type_name();
            let simple_name = s.simple_name();
            let record_type = s.record_type_name();
            let tags = crate::metric::sink_tags(key_type, simple_name, &record_type, &topology_id, value_type);
            s.for_each_metric(&mut |m: &mut dyn MetricHandle| m.set_tags(&tags));
        }
    }

    /// Invokes `f` once per metric owned by any processor or sink in this
    /// topology.
    pub fn for_each_metric(&mut self, mut f: impl FnMut(&mut dyn MetricHandle)) {
        for p in &self.processors {
            p.borrow_mut().for_each_metric(&mut f);
        }
        for s in &self.sinks {
            s.borrow_mut().for_each_metric(&mut f);
        }
    }

    /// `eof` of the topology iff every top-set member reports `eof`.
    pub fn eof(&mut self) -> bool {
        self.ensure_init();
        self.top_set.iter().all(|&i| self.processors[i].borrow().eof())
    }

    /// Starts the topology, optionally forcing an explicit start offset.
    /// Only top-set nodes receive `start`; internal nodes are started
    /// transitively through their upstream wiring.
    pub fn start(&mut self, offset: Option<StartOffset>) {
        self.ensure_init();
        info!(topology = %self.name(), ?offset, "starting topology");
        for &idx in &self.top_set {
            self.processors[idx].borrow_mut().start(offset);
        }
    }

    /// Forwarded only to top-set nodes; they propagate upstream if
    /// needed. `force = false` is cooperative (honours commit cadence).
    pub fn commit(&mut self, force: bool) {
        self.ensure_init();
        for &idx in &self.top_set {
            self.processors[idx].borrow_mut().commit(force);
        }
    }

    /// A single pass of the run loop: poll sinks, poll all
    /// processors, check back-pressure, drive the top set and the sinks,
    /// and occasionally sweep garbage. Returns the number of records
    /// advanced, or 0 on a back-pressure pause.
    pub fn process_one(&mut self) -> usize {
        self.ensure_init();
        if self.failed {
            return 0;
        }

        for s in &self.sinks {
            s.borrow_mut().poll(0);
        }
        for p in &self.processors {
            p.borrow_mut().poll(0);
        }

        let sink_queue_len: usize = self.sinks.iter().map(|s| s.borrow().queue_len()).sum();
        if sink_queue_len > BACK_PRESSURE_THRESHOLD {
            warn!(topology = %self.name(), sink_queue_len, "back-pressure: pausing source advancement");
            return 0;
        }

        let tick = now_ms();
        let mut advanced = 0usize;
        for &idx in &self.top_set {
            advanced += self.processors[idx].borrow_mut().process_one(tick);
        }
        for s in &self.sinks {
            advanced += s.borrow_mut().process_one(tick);
        }

        if self.processors.iter().any(|p| p.borrow().has_failed()) || self.sinks.iter().any(|s| s.borrow().has_failed()) {
            warn!(topology = %self.name(), "a processor or sink has failed; marking topology failed");
            self.failed = true;
        }

        if tick > self.next_gc_ts {
            for p in &self.processors {
                p.borrow_mut().garbage_collect(tick);
            }
            for s in &self.sinks {
                s.borrow_mut().garbage_collect(tick);
            }
            self.next_gc_ts = tick + GC_INTERVAL_MS;
        }

        advanced
    }

    /// Bounded drain: alternates sink flushing with `process_one` until a
    /// pass returns 0 and the topology is `eof`, flushes the top set, and
    /// repeats once more, since flushing a sink can release records that a
    /// downstream source (connected through a broker round trip) then has
    /// to drain in turn. Not sufficient for deep sink->source->sink
    /// chains — callers of such topologies must call `flush` repeatedly
    /// until `eof`.
    pub fn flush(&mut self) {
        self.ensure_init();
        self.drain_until_quiescent();

        for &idx in &self.top_set {
            self.processors[idx].borrow_mut().flush();
        }

        self.drain_until_quiescent();
    }

    fn drain_until_quiescent(&mut self) {
        loop {
            if self.failed {
                warn!(topology = %self.name(), "aborting drain: topology has failed");
                break;
            }
            for s in &self.sinks {
                s.borrow_mut().flush();
            }
            let advanced = self.process_one();
            if self.failed {
                warn!(topology = %self.name(), "aborting drain: topology has failed");
                break;
            }
            if advanced > 0 {
                continue;
            }
            if !self.eof() {
                std::thread::sleep(Duration::from_millis(10));
            } else {
                break;
            }
        }
    }

    /// All partition processors then all sinks receive `close`.
    pub fn close(&mut self) {
        info!(topology = %self.name(), "closing topology");
        for p in &self.processors {
            p.borrow_mut().close();
        }
        for s in &self.sinks {
            s.borrow_mut().close();
        }
    }

    /// Creates `<storage_root>/<sanitized app_identity>/<sanitized
    /// topology_id>` and returns it. Failure to create or verify the
    /// directory is a real error rather than a logged-and-ignored
    /// condition.
    pub fn storage_path(&self) -> Result<PathBuf> {
        let mut path = PathBuf::from(&self.config.storage_root);
        path.push(sanitize_filename(&self.app.identity()));
        path.push(sanitize_filename(&self.topology_id));
        std::fs::create_dir_all(&path)
            .map_err(|e| Error::Config(format!("failed to create storage path {:?}: {}", path, e)))?;
        if !path.exists() {
            return Err(Error::Config(format!("storage path {:?} does not exist after creation", path)));
        }
        Ok(path)
    }
}

/// Tears down sinks before processors, both in reverse declaration order.
impl Drop for Topology {
    fn drop(&mut self) {
        debug!(topology = %self.name(), "topology terminating");
        while self.sinks.pop().is_some() {}
        while self.processors.pop().is_some() {}
        debug!(topology = %self.name(), "topology terminated");
    }
}

/// Binds an application identity and a cluster configuration, and mints
/// fresh topologies on demand.
pub struct TopologyBuilder {
    app: Arc<AppIdentity>,
    config: Arc<ClusterConfig>,
}

impl TopologyBuilder {
    pub fn new(namespace: impl Into<String>, instance_id: impl Into<String>, config: ClusterConfig) -> Result<Self> {
        config.validate()?;
        Ok(TopologyBuilder {
            app: Arc::new(AppIdentity::new(namespace, instance_id)),
            config: Arc::new(config),
        })
    }

    pub fn create_topology(&self, topology_id: impl Into<String>) -> Topology {
        Topology::new(self.app.clone(), self.config.clone(), topology_id)
    }

    pub fn app_identity(&self) -> &AppIdentity {
        &self.app
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_filename_replaces_forbidden_chars() {
        assert_eq!(sanitize_filename("a/b:c*d"), "a_b_c_d");
        assert_eq!(sanitize_filename("plain"), "plain");
    }

    #[test]
    fn builder_rejects_invalid_config() {
        let mut cfg = ClusterConfig::default();
        cfg.brokers = String::new();
        assert!(TopologyBuilder::new("ns", "id", cfg).is_err());
    }

    #[test]
    fn topology_name_matches_bracket_form() {
        let builder = TopologyBuilder::new("ktopo-examples", "worker-1", ClusterConfig::default()).unwrap();
        let topology = builder.create_topology("t1");
        assert_eq!(topology.name(), "[ktopo-examples-worker-1]t1");
    }

    #[test]
    fn empty_topology_is_trivially_eof() {
        let builder = TopologyBuilder::new("ns", "id", ClusterConfig::default()).unwrap();
        let mut topology = builder.create_topology("t1");
        assert!(topology.eof());
        assert_eq!(topology.process_one(), 0);
    }

    struct GcStub {
        id: crate::processor::ProcessorId,
        ups: crate::processor::UpstreamSet,
        calls: Rc<RefCell<usize>>,
    }

    impl PartitionProcessor for GcStub {
        fn id(&self) -> crate::processor::ProcessorId {
            self.id
        }
        fn name(&self) -> String {
            "gc-stub".into()
        }
        fn simple_name(&self) -> &'static str {
            "gc_stub"
        }
        fn key_type_name(&self) -> &'static str {
            "void"
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
        fn upstream_ids(&self) -> &crate::processor::UpstreamSet {
            &self.ups
        }
        fn eof(&self) -> bool {
            true
        }
        fn poll(&mut self, _max_ms: u64) {}
        fn process_one(&mut self, _tick_ms: i64) -> usize {
            0
        }
        fn flush(&mut self) {}
        fn commit(&mut self, _force: bool) {}
        fn garbage_collect(&mut self, _tick_ms: i64) {
            *self.calls.borrow_mut() += 1;
        }
        fn start(&mut self, _offset: Option<StartOffset>) {}
        fn close(&mut self) {}
    }

    #[test]
    fn garbage_collect_runs_on_first_pass_then_waits_for_the_cadence() {
        let builder = TopologyBuilder::new("ns", "id", ClusterConfig::default()).unwrap();
        let mut topology = builder.create_topology("gc-test");

        let gc_calls = Rc::new(RefCell::new(0usize));
        let calls = gc_calls.clone();
        topology.create_sources(&[0], move |_partition| GcStub {
            id: crate::processor::ProcessorId::fresh(),
            ups: crate::processor::UpstreamSet::none(),
            calls: calls.clone(),
        });

        topology.process_one();
        assert_eq!(*gc_calls.borrow(), 1, "first pass always sweeps (next_gc_ts starts at 0)");

        topology.process_one();
        assert_eq!(*gc_calls.borrow(), 1, "a second pass within the 10s cadence must not sweep again");
    }

    struct FailStub {
        id: crate::processor::ProcessorId,
        ups: crate::processor::UpstreamSet,
    }

    impl PartitionProcessor for FailStub {
        fn id(&self) -> crate::processor::ProcessorId {
            self.id
        }
        fn name(&self) -> String {
            "fail-stub".into()
        }
        fn simple_name(&self) -> &'static str {
            "fail_stub"
        }
        fn key_type_name(&self) -> &'static str {
            "void"
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
        fn upstream_ids(&self) -> &crate::processor::UpstreamSet {
            &self.ups
        }
        fn eof(&self) -> bool {
            // Never reports eof on its own: the only way `drain_until_quiescent`
            // can terminate here is via the `failed` latch.
            false
        }
        fn has_failed(&self) -> bool {
            true
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

    #[test]
    fn fatal_processor_failure_marks_topology_failed_and_unsticks_drain() {
        let builder = TopologyBuilder::new("ns", "id", ClusterConfig::default()).unwrap();
        let mut topology = builder.create_topology("fatal-failure");
        topology.create_sources(&[0], |_partition| FailStub {
            id: crate::processor::ProcessorId::fresh(),
            ups: crate::processor::UpstreamSet::none(),
        });

        assert!(!topology.has_failed());
        topology.process_one();
        assert!(topology.has_failed(), "a processor reporting has_failed() must latch the topology");

        // Would spin forever waiting for an eof that never comes, absent the
        // `self.failed` escape hatch in `drain_until_quiescent`.
        topology.flush();
    }

    #[test]
    fn flush_is_idempotent_once_eof() {
        let builder = TopologyBuilder::new("ns", "id", ClusterConfig::default()).unwrap();
        let mut topology = builder.create_topology("flush-idempotent");
        topology.flush();
        assert!(topology.eof());
        topology.flush();
        assert!(topology.eof());
    }
}
