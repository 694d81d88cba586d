//! Metrics tagging.
//!
//! The engine never ships metrics itself — it only stamps a tag string onto
//! an opaque [`MetricHandle`] the backend owns. Tag construction and
//! escaping live here so both `Topology` (partition processors) and sinks
//! produce identical tag strings.

/// An opaque metric exposing only the ability to receive its tag string.
/// The actual value is sampled by whatever backend implements this trait
/// (see `ktopo-io::metrics_prom` for a `metrics`-crate-backed adapter).
pub trait MetricHandle: Send {
    fn set_tags(&mut self, tags: &str);
    fn name(&self) -> &str;
}

/// An in-memory `MetricHandle` used by tests and by processors that have
/// not been wired to a real backend.
#[derive(Debug, Default, Clone)]
pub struct RecordingMetric {
    pub name: String,
    pub tags: String,
}

impl RecordingMetric {
    pub fn new(name: impl Into<String>) -> Self {
        RecordingMetric { name: name.into(), tags: String::new() }
    }
}

impl MetricHandle for RecordingMetric {
    fn set_tags(&mut self, tags: &str) {
        self.tags = tags.to_string();
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Escape spaces, commas, and `=` with a backslash (the Influx line-protocol
/// escaping convention).
pub fn escape_tag_value(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == ' ' || c == ',' || c == '=' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// The inverse of [`escape_tag_value`]: splits a tag string built by
/// [`processor_tags`]/[`sink_tags`] back into `(key, value)` pairs,
/// respecting backslash-escaped commas and equals signs inside a value so a
/// `topology_id` or type name containing either doesn't corrupt the split.
pub fn parse_tags(tags: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut field = String::new();
    let mut chars = tags.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    field.push(escaped);
                }
            }
            ',' => {
                if let Some(pair) = split_unescaped_field(&field) {
                    pairs.push(pair);
                }
                field.clear();
            }
            other => field.push(other),
        }
    }
    if let Some(pair) = split_unescaped_field(&field) {
        pairs.push(pair);
    }
    pairs
}

/// Splits one already-unescaped `key=value` field on its first `=`.
fn split_unescaped_field(field: &str) -> Option<(String, String)> {
    field.split_once('=').map(|(k, v)| (k.to_string(), v.to_string()))
}

/// Builds the lexicographically-ordered tag string for a partition processor:
/// `depth=<d>,key_type=<k>,partition=<p>,processor_type=<t>,record_type=<r>,topology=<id>,value_type=<v>`
pub fn processor_tags(
    depth: usize,
    key_type: &str,
    partition: u32,
    processor_type: &str,
    record_type: &str,
    topology_id: &str,
    value_type: &str,
) -> String {
    format!(
        "depth={},key_type={},partition={},processor_type={},record_type={},topology={},value_type={}",
        depth,
        escape_tag_value(key_type),
        partition,
        escape_tag_value(processor_type),
        escape_tag_value(record_type),
        escape_tag_value(topology_id),
        escape_tag_value(value_type),
    )
}

/// Builds the tag string for a sink, which omits `depth` and `partition`:
/// `key_type=<k>,processor_type=<t>,record_type=<r>,topology=<id>,value_type=<v>`
pub fn sink_tags(
    key_type: &str,
    processor_type: &str,
    record_type: &str,
    topology_id: &str,
    value_type: &str,
) -> String {
    format!(
        "key_type={},processor_type={},record_type={},topology={},value_type={}",
        escape_tag_value(key_type),
        escape_tag_value(processor_type),
        escape_tag_value(record_type),
        escape_tag_value(topology_id),
        escape_tag_value(value_type),
    )
}

/// Derives `record_type_name` from `key_type`/`value_type`: when the value
/// type is `void`, the record type collapses to the key type (so a
/// `string`/`void` record is tagged `record_type=string`); otherwise the
/// two are joined with an underscore.
pub fn record_type_name(key_type: &str, value_type: &str) -> String {
    if value_type == "void" {
        key_type.to_string()
    } else if key_type == "void" {
        value_type.to_string()
    } else {
        format!("{}_{}", key_type, value_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_space_comma_equals() {
        assert_eq!(escape_tag_value("a b"), "a\\ b");
        assert_eq!(escape_tag_value("a,b"), "a\\,b");
        assert_eq!(escape_tag_value("a=b"), "a\\=b");
        assert_eq!(escape_tag_value("a=b,c d"), "a\\=b\\,c\\ d");
    }

    #[test]
    fn filter_metric_tag_is_lexicographically_ordered() {
        let tags = processor_tags(2, "string", 3, "filter", "string", "my-topology", "void");
        assert_eq!(
            tags,
            "depth=2,key_type=string,partition=3,processor_type=filter,record_type=string,topology=my-topology,value_type=void"
        );
    }

    #[test]
    fn record_type_collapses_on_void_value() {
        assert_eq!(record_type_name("string", "void"), "string");
        assert_eq!(record_type_name("void", "string"), "string");
        assert_eq!(record_type_name("string", "json"), "string_json");
    }
}
