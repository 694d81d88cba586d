//! The codec interface consumed by sources and sinks.
//!
//! A codec is a pair of (encode, decode) functions plus a `type_name` used
//! verbatim in metric tags (`key_type`/`value_type`). Serialization itself
//! is out of scope for this crate; concrete codecs live here only because
//! the engine needs *some* implementation to exercise the contract in
//! tests and in the example binary.

use crate::record::Void;

pub trait Codec<T>: Send + Sync + 'static {
    fn encode(&self, value: &T) -> anyhow::Result<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> anyhow::Result<T>;
    fn type_name(&self) -> &'static str;
}

/// Codec for the void/unit type. Never touches the wire: `encode` always
/// produces an empty payload, `decode` ignores its input.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnitCodec;

impl Codec<Void> for UnitCodec {
    fn encode(&self, _value: &Void) -> anyhow::Result<Vec<u8>> {
        Ok(Vec::new())
    }

    fn decode(&self, _bytes: &[u8]) -> anyhow::Result<Void> {
        Ok(())
    }

    fn type_name(&self) -> &'static str {
        "void"
    }
}

/// Plain-text codec: `String` encoded/decoded as UTF-8 bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCodec;

impl Codec<String> for TextCodec {
    fn encode(&self, value: &String) -> anyhow::Result<Vec<u8>> {
        Ok(value.clone().into_bytes())
    }

    fn decode(&self, bytes: &[u8]) -> anyhow::Result<String> {
        Ok(String::from_utf8(bytes.to_vec())?)
    }

    fn type_name(&self) -> &'static str {
        "string"
    }
}

/// JSON codec backed by `serde_json`, for any `Serialize + DeserializeOwned` type.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec<T> {
    _marker: std::marker::PhantomData<T>,
}

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        JsonCodec { _marker: std::marker::PhantomData }
    }
}

impl<T> Codec<T> for JsonCodec<T>
where
    T: serde::Serialize + serde::de::DeserializeOwned + Send + Sync + 'static,
{
    fn encode(&self, value: &T) -> anyhow::Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode(&self, bytes: &[u8]) -> anyhow::Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn type_name(&self) -> &'static str {
        "json"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_codec_roundtrips() {
        let c = UnitCodec;
        let bytes = c.encode(&()).unwrap();
        assert!(bytes.is_empty());
        assert_eq!(c.decode(&bytes).unwrap(), ());
    }

    #[test]
    fn text_codec_roundtrips() {
        let c = TextCodec;
        let bytes = c.encode(&"hello".to_string()).unwrap();
        assert_eq!(c.decode(&bytes).unwrap(), "hello");
    }

    #[test]
    fn json_codec_roundtrips() {
        let c: JsonCodec<Vec<i32>> = JsonCodec::new();
        let bytes = c.encode(&vec![1, 2, 3]).unwrap();
        assert_eq!(c.decode(&bytes).unwrap(), vec![1, 2, 3]);
    }
}
