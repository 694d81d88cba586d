/// The six error kinds of the engine's failure model.
///
/// `Transient`, `Codec`, and `SinkDelivery` are counted and swallowed unless
/// the owning cluster configuration has `fail_fast` set, in which case they
/// are promoted to a fatal failure of the processor (and, transitively, the
/// topology). `Config` and `Assembly` always abort before a topology starts.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("assembly error: {0}")]
    Assembly(String),

    #[error("transient broker error: {0}")]
    Transient(String),

    #[error("fatal broker error: {0}")]
    Fatal(String),

    #[error("codec error at partition {partition}, offset {offset}: {source}")]
    Codec {
        partition: u32,
        offset: i64,
        #[source]
        source: anyhow::Error,
    },

    #[error("sink delivery failure after retries: {0}")]
    SinkDelivery(String),
}

pub type Result<T> = std::result::Result<T, Error>;
