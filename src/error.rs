//! Crate-wide error type.
//!
//! Every subsystem boundary converts its local error enum into [`HalError`]
//! via `#[from]`, so callers only ever match one caller-facing type.

use thiserror::Error;

use crate::storage::dna::DnaError;
use crate::storage::StorageError;

/// Errors surfaced by the HAL core across all subsystems.
///
/// The six kinds below are the ones spec'd as abstract error kinds: they are
/// always reported, never silently dropped, and the core never retries I/O.
#[derive(Debug, Error)]
pub enum HalError {
    /// An index, offset, or position fell outside its array, sequence, or
    /// genome.
    #[error("out of range: {0}")]
    OutOfRange(String),

    /// Malformed input: a non-nucleotide base, a length mismatch in
    /// `set_string`, an offset-sliced segment passed to a gapped iterator,
    /// or an N-threshold outside `[0, 1]`.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A named genome or sequence does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// An on-disk/in-memory invariant was violated (sequence lengths do not
    /// sum to the genome's DNA length, sequence directory lookup failed).
    #[error("inconsistent state: {0}")]
    Inconsistent(String),

    /// The operation is not available on this iterator flavour (e.g.
    /// `mapped_segments` on a gapped iterator).
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// A DNA access buffer was dropped while still dirty.
    #[error("dirty buffer dropped without flush: {0}")]
    Dirty(String),

    /// Propagated from the storage subsystem.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<DnaError> for HalError {
    fn from(err: DnaError) -> Self {
        match err {
            DnaError::UnsupportedBase(..) | DnaError::LengthMismatch { .. } => {
                HalError::InvalidArgument(err.to_string())
            }
            DnaError::Storage(e) => HalError::Storage(e),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type HalResult<T> = Result<T, HalError>;
