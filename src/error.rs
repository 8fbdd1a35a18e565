//! The crate's single error type.
//!
//! The core treats four kinds of failure as distinct (spec §7): a malformed
//! decode input, a broken structural invariant caught by a `check_*`
//! routine, an out-of-range value handed to the codec, and a walker that
//! meets an AST shape it doesn't recognize. All four are programmer- or
//! input-facing terminal conditions: nothing here is retried.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the encoder/decoder core.
#[derive(Debug, Error)]
pub enum Error {
    /// The decoder encountered a byte stream that cannot be a valid
    /// encoding: a short read, an unrecognized tag, a string index out of
    /// range, or a decoded tree that fails its own invariants.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// A structural invariant was violated: rank mismatch, broken sibling
    /// linkage, a cyclic digram list, a non-linear (cyclic) grammar, or
    /// stats computed before a mutation that invalidated them. These are
    /// programmer errors caught by the `check_*` routines.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// A value passed to the codec fell outside the range it can encode,
    /// e.g. a negative value passed where an unsigned integer is required.
    #[error("value out of range: {0}")]
    RangeError(String),

    /// The AST walker saw a node kind it doesn't know, or the same kind
    /// with an inconsistent field set across two occurrences.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
}

impl Error {
    pub fn invariant(reason: impl Into<String>) -> Self {
        Error::InvariantViolation(reason.into())
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        Error::MalformedInput(reason.into())
    }

    pub fn range(reason: impl Into<String>) -> Self {
        Error::RangeError(reason.into())
    }

    pub fn schema(reason: impl Into<String>) -> Self {
        Error::SchemaMismatch(reason.into())
    }
}
