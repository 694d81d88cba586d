//! The processor base contract and the push-based wiring that lets
//! records propagate synchronously through a chain of transforms.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::metric::MetricHandle;
use crate::offset::StartOffset;
use crate::record::RecordRef;

/// Process-wide unique identity for a processor, used to compute
/// transitive upstream closures and the topology's top set. Allocation is
/// monotonic and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessorId(u64);

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

impl ProcessorId {
    pub fn fresh() -> Self {
        ProcessorId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Shared ownership handle for a node in the DAG: the same allocation is
/// held by the topology (as a trait object, for driving) and by its
/// upstream (as a typed `Downstream`, for pushing).
pub type NodeHandle<P> = Rc<RefCell<P>>;

/// The transitive closure of a processor's upstream ids, computed once at
/// construction time (cheap, and structurally cycle-proof: you cannot name
/// a processor that doesn't exist yet).
#[derive(Debug, Clone, Default)]
pub struct UpstreamSet(HashSet<ProcessorId>);

impl UpstreamSet {
    pub fn none() -> Self {
        UpstreamSet(HashSet::new())
    }

    /// The upstream set of a node with exactly one direct input.
    pub fn of(upstream: &dyn PartitionProcessor) -> Self {
        let mut set = upstream.upstream_ids().clone();
        set.insert(upstream.id());
        UpstreamSet(set)
    }

    /// The upstream set of a node with several direct inputs (unused by
    /// the stateless transforms in this crate, which are strictly 1:1, but
    /// kept for processors outside this crate that fan multiple same-
    /// partition inputs into one node).
    pub fn of_many(upstreams: &[&dyn PartitionProcessor]) -> Self {
        let mut set = HashSet::new();
        for u in upstreams {
            set.extend(u.upstream_ids().iter().copied());
            set.insert(u.id());
        }
        UpstreamSet(set)
    }

    pub fn contains(&self, id: ProcessorId) -> bool {
        self.0.contains(&id)
    }
}

/// The common, object-safe contract every node in a topology satisfies.
/// Strong typing on edges lives one level up, in the `Downstream`/
/// `Fanout` traits implemented by concrete generic processor types.
pub trait PartitionProcessor {
    fn id(&self) -> ProcessorId;
    fn name(&self) -> String;
    fn simple_name(&self) -> &'static str;
    fn key_type_name(&self) -> &'static str;
    fn value_type_name(&self) -> &'static str;

    fn record_type_name(&self) -> String {
        crate::metric::record_type_name(self.key_type_name(), self.value_type_name())
    }

    /// 0 for sources; one more than the deepest input for everything else.
    fn depth(&self) -> usize;

    /// `None` for partition-agnostic sinks; `Some(p)` otherwise.
    fn partition(&self) -> Option<u32>;

    fn upstream_ids(&self) -> &UpstreamSet;

    /// True iff `id` is a (possibly transitive) input of this node.
    fn is_upstream(&self, id: ProcessorId) -> bool {
        self.upstream_ids().contains(id)
    }

    /// No further records will ever be produced and internal buffers are
    /// drained. May later become false again (new records can arrive).
    fn eof(&self) -> bool;

    /// True once this processor has hit a fatal error (§7) — under
    /// `fail_fast`, a codec/broker error latches here rather than
    /// propagating as a panic. `Topology::process_one` polls this on every
    /// processor and sink and promotes a single failed node to
    /// `Topology::has_failed`. The default implementation never fails,
    /// matching every processor in this crate that has no failure mode of
    /// its own (stateless transforms, the in-memory test doubles).
    fn has_failed(&self) -> bool {
        false
    }

    /// Do already-queued work; `max_ms == 0` means don't block.
    fn poll(&mut self, max_ms: u64);

    /// Advance at most one unit of progress; returns the number of records
    /// advanced past this node during the call.
    fn process_one(&mut self, tick_ms: i64) -> usize;

    fn flush(&mut self);

    fn commit(&mut self, force: bool);

    fn garbage_collect(&mut self, tick_ms: i64);

    /// `None` applies the source's own default offset policy; `Some(o)`
    /// forces an explicit start offset.
    fn start(&mut self, offset: Option<StartOffset>);

    fn close(&mut self);

    /// Invokes `f` once per metric this processor owns. The default
    /// implementation owns no metrics. Used both to stamp tags at
    /// initialization time and to implement `Topology::for_each_metric`.
    fn for_each_metric(&mut self, f: &mut dyn FnMut(&mut dyn MetricHandle)) {
        let _ = f;
    }
}

/// Typed push interface: the way a record crosses from one node to the
/// next. Implemented by every node that *consumes* `Record<K, V>` —
/// transforms (receiving from their upstream) and sinks (receiving via
/// `produce`).
pub trait Downstream<K, V> {
    fn push(&mut self, record: RecordRef<K, V>);
}

/// Implemented by every node that *produces* `Record<K, V>`, letting the
/// topology wire a freshly created consumer into its fan-out list.
pub trait Fanout<K, V>: PartitionProcessor {
    fn add_downstream(&mut self, downstream: NodeHandle<dyn Downstream<K, V>>);
}

/// A processor whose output leaves the topology. Sinks created
/// via `Topology::create_sink` are driven unconditionally every pass
/// (independent of top-set membership) and contribute to the aggregate
/// back-pressure threshold through `queue_len`.
pub trait Sink: PartitionProcessor {
    /// Number of unflushed records; monotone in `produce`, decreases on
    /// delivery.
    fn queue_len(&self) -> usize;
}
