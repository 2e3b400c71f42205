//! Error taxonomy of the backtesting platform.
//!
//! Conditions that compromise data or state integrity surface as
//! [`EngineError`] and halt the current simulation run. Component-local
//! conditions that leave trade invariants intact (a margin rejection, a
//! skipped signal) are logged and absorbed instead of raised.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::constant::Granularity;

/// Errors surfaced by the engine and its collaborators.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The requested range yielded no bars, or a gap exceeding the
    /// configured tolerance was detected. Not retried internally.
    #[error("historical data unavailable for {instrument} {granularity}: {reason}")]
    DataUnavailable {
        instrument: String,
        granularity: Granularity,
        reason: String,
    },

    /// Transport-level failure while fetching a chunk of history.
    #[error("datafeed request failed: {0}")]
    Fetch(String),

    /// No direct, inverse or triangulated rate resolves the conversion.
    /// Callers must reject the trade rather than default the value.
    #[error("no conversion path from {from} to {to}")]
    UnknownConversionPath { from: String, to: String },

    /// A bar violated ask >= bid or timestamp monotonicity. Fatal for the
    /// simulation run that observed it.
    #[error("invalid bar for {instrument} at {datetime}: {reason}")]
    InvalidBar {
        instrument: String,
        datetime: DateTime<Utc>,
        reason: String,
    },

    /// Malformed optimizer or engine input (empty grid, zero windows, ...).
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

impl EngineError {
    /// Shorthand for a [`EngineError::DataUnavailable`]
    pub fn data_unavailable(
        instrument: &str,
        granularity: Granularity,
        reason: impl Into<String>,
    ) -> Self {
        EngineError::DataUnavailable {
            instrument: instrument.to_string(),
            granularity,
            reason: reason.into(),
        }
    }

    /// Shorthand for an [`EngineError::InvalidBar`]
    pub fn invalid_bar(
        instrument: &str,
        datetime: DateTime<Utc>,
        reason: impl Into<String>,
    ) -> Self {
        EngineError::InvalidBar {
            instrument: instrument.to_string(),
            datetime,
            reason: reason.into(),
        }
    }
}
