use thiserror::Error;

/// Raised when a strategy selector cannot be mapped to a known strategy.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SelectorError {
    #[error("Unknown {role} strategy '{value}' (expected one of: {expected})")]
    Unknown {
        role: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("The {0} strategy must be specified")]
    Undefined(&'static str),
}
