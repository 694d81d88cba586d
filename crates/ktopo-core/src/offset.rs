/// Where a source should position its consumer when started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOffset {
    /// Start replaying from the first record retained by the broker.
    Beginning,
    /// Resume from whatever offset was last committed for this group.
    Stored,
    /// Start from an explicit, caller-supplied offset.
    At(i64),
}

impl Default for StartOffset {
    fn default() -> Self {
        StartOffset::Stored
    }
}
