use thiserror::Error;

/// Why a single record in a `result` batch was refused.
///
/// Rejections are per-record: the rest of the batch is still merged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordRejection {
    #[error("record is not a JSON object")]
    NotAnObject,

    #[error("record has no signal_id")]
    MissingSignalId,

    #[error("record signal_id is not a non-empty string: {0}")]
    InvalidSignalId(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{key} must be a positive integer, got {value:?}")]
    InvalidNumber { key: &'static str, value: String },

    #[error("{key} must not be empty")]
    Empty { key: &'static str },
}
