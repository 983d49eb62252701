//! Error Handling
//!
//! This module provides the error type returned by the layout engine.
//! All variants use `thiserror` for zero-cost, detailed error messages.
//! Per the error-handling design, the core never writes diagnostics to a
//! global channel: every fatal condition is returned as a `PropellerError`
//! and every discard-and-count condition is folded into `Stats` instead.

use thiserror::Error;

/// Layout engine error types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PropellerError {
    /// The basic-block address map could not be parsed.
    #[error("address map parse error: {0}")]
    AddressMapParse(String),

    /// A named function is missing or malformed in the address map.
    #[error("missing or malformed function in address map: {0}")]
    MissingFunction(String),

    /// The branch-sample profile could not be parsed.
    #[error("profile parse error: {0}")]
    ProfileParse(String),

    /// A profile file was tagged with a format this core cannot decode.
    #[error("unsupported profile format: {0:?} (only a text LBR format is implemented)")]
    UnsupportedProfileFormat(ProfileFormat),

    /// An internal algorithmic invariant was violated. Always indicates a
    /// logic bug in the layout engine, never a malformed input.
    #[error("internal invariant violated: {0}")]
    InvariantViolation(String),

    /// I/O failure while reading an input file or writing an output file.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for PropellerError {
    #[cold]
    fn from(err: std::io::Error) -> Self {
        PropellerError::Io(err.to_string())
    }
}

/// Profile type tags accepted on the CLI surface (see `spec.md` §6.3).
/// Only `PerfLbr` is actually decodable by this core; the others are
/// recognized so the CLI can report a precise unsupported-format error
/// rather than a generic parse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ProfileFormat {
    PerfLbr,
    PerfSpe,
    FrequenciesProto,
}

pub type Result<T> = std::result::Result<T, PropellerError>;
