//! Policy configuration errors

/// Errors raised while building a rule set
///
/// Evaluation itself never fails: anything the engine cannot decide is a deny.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    /// A configured rule value is unusable
    #[error("invalid {kind}: {value:?}")]
    InvalidRule { kind: &'static str, value: String },
}

impl PolicyError {
    /// Configuration errors are always fatal before a run starts
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        true
    }
}
