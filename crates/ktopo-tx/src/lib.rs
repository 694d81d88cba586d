//! Stateless, per-record transforms for `ktopo` topologies.
//!
//! Each transform here is a pure function over its upstream's output: it
//! owns no state beyond its wiring and a running record count, decodes
//! nothing itself, and never touches a broker. A transform holds a
//! [`ktopo_core::processor::NodeHandle`] to its single upstream and
//! delegates `process_one`/`flush`/`commit`/`start` to it; only the source
//! at the bottom of the chain performs real I/O, and pushing a record
//! forward happens synchronously, in the same call, all the way to the
//! sink.
//!
//! - [`filter`]: drops records that don't satisfy a predicate.
//! - [`flat_map`]: maps one inbound record to zero or more outbound
//!   records, possibly of a different key/value type.
//! - [`pipe`]: forwards records unchanged and additionally exposes an
//!   external `produce` entry point for out-of-band injection.

pub mod filter;
pub mod flat_map;
pub mod pipe;

pub use filter::Filter;
pub use flat_map::{Emitter, FlatMap};
pub use pipe::Pipe;
