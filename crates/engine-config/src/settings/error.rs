use thiserror::Error;

/// Errors raised while loading run settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The destination connection string is missing or blank.
    #[error("Missing required setting {0}")]
    Missing(&'static str),

    /// A numeric setting could not be parsed or was zero.
    #[error("Invalid value '{value}' for {key}: expected a positive integer")]
    InvalidNumber { key: &'static str, value: String },

    #[error("Invalid URL '{value}' for {key}: {reason}")]
    InvalidUrl {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("Failed to read env file {path}: {reason}")]
    EnvFile { path: String, reason: String },

    #[error("Invalid env file: malformed line {0} (expected KEY=VALUE)")]
    MalformedEnvLine(usize),

    #[error("Invalid env file: empty key at line {0}")]
    EmptyEnvKey(usize),
}
