//! Recoverable kernel errors.
//!
//! Invariant violations and on-disk corruption met during normal engine
//! operation are not represented here: they abort with a panic.

use thiserror::Error;

/// Failure to decode a persisted record or snapshot payload.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed {kind} record: {source}")]
    Malformed {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Rejected engine parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamsError {
    #[error("best_n must be positive")]
    ZeroBestN,
    #[error("user_max_n must be positive")]
    ZeroUserMaxN,
    #[error("round_duration_seconds must be positive, got {0}")]
    RoundDuration(i64),
    #[error("sample_window_size must be positive, got {0}")]
    SampleWindow(i64),
    #[error("decay_factor must not be negative, got {0}")]
    DecayFactor(i64),
    #[error("initial_reputation must not be negative, got {0}")]
    InitialReputation(i64),
}
