//! `MetricHandle` adapter backed by the `metrics` facade, so whatever
//! recorder the binary installs — `metrics-exporter-prometheus` in
//! `ktopo-cli` — receives the tag string `ktopo-core` stamps on this
//! handle as a gauge's labels.

use std::collections::HashMap;

use metrics::{gauge, Gauge};

use ktopo_core::metric::{parse_tags, MetricHandle};

/// One gauge, re-labeled every time `Topology::stamp_metric_tags` runs.
/// `metrics` gauges are identified by name + label set, so changing the
/// tag string (e.g. after a processor's depth changes) registers what is
/// effectively a new time series, rather than renaming a counter in place.
pub struct PrometheusMetric {
    name: &'static str,
    handle: Gauge,
}

impl PrometheusMetric {
    pub fn new(name: &'static str) -> Self {
        let handle = gauge!(name);
        PrometheusMetric { name, handle }
    }

    /// Records a sample against the currently-tagged series. Processors
    /// that count records (sources, sinks) call this from `process_one`.
    pub fn record(&self, value: f64) {
        self.handle.set(value);
    }

    pub fn increment(&self, value: f64) {
        self.handle.increment(value);
    }
}

impl MetricHandle for PrometheusMetric {
    /// `gauge!` needs its label keys fixed at compile time, while the
    /// engine's tag string carries a variable set of keys (sinks omit
    /// `depth`/`partition`). Rather than reimplement the macro's dynamic
    /// dispatch, every label `ktopo-core` can produce is declared here and
    /// defaulted to an empty string when the tag string doesn't carry it.
    fn set_tags(&mut self, tags: &str) {
        let fields: HashMap<String, String> = parse_tags(tags).into_iter().collect();
        let get = |key: &str| fields.get(key).cloned().unwrap_or_default();
        self.handle = gauge!(
            self.name,
            "depth" => get("depth"),
            "key_type" => get("key_type"),
            "partition" => get("partition"),
            "processor_type" => get("processor_type"),
            "record_type" => get("record_type"),
            "topology" => get("topology"),
            "value_type" => get("value_type"),
        );
    }

    fn name(&self) -> &str {
        self.name
    }
}
