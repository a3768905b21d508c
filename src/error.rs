//! Error type shared by every layer of the crate.

use thiserror::Error;

/// Errors reported by the arena, the key codec and the containers.
///
/// Lookups that simply miss (`find`, `erase`) never produce an error; they
/// return an end cursor instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The key did not split into exactly `expected` tokens.
    #[error("expected {expected} tokens in key, found {found}")]
    WrongArity {
        /// Configured depth.
        expected: usize,
        /// Tokens found in the key.
        found: usize,
    },

    /// A token is not part of its level's vocabulary.
    #[error("token at level {level} is not in the vocabulary")]
    UnknownToken {
        /// Zero-based level of the offending token.
        level: usize,
    },

    /// A per-level index has no token attached to it.
    #[error("index {index} has no token at level {level}")]
    UnknownIndex {
        /// Zero-based level.
        level: usize,
        /// The dangling index.
        index: usize,
    },

    /// Memory for an arena block, node or slot array could not be obtained.
    #[error("failed to allocate {requested} bytes")]
    AllocationFailure {
        /// Size of the request that failed, in bytes.
        requested: usize,
    },

    /// The cursor is at the end or points at an empty slot.
    #[error("no value at cursor")]
    MissingValue,

    /// Arena alignment must be one of 1, 4, 8, 16, 32, 64 or 128 bytes.
    #[error("unsupported arena alignment of {0} bytes")]
    UnsupportedAlignment(usize),

    /// Arena sizes or growth factor are out of range.
    #[error("invalid arena configuration: {0}")]
    InvalidArenaConfig(&'static str),

    /// Depth must be within `MIN_DEPTH..=MAX_DEPTH`.
    #[error("unsupported key depth {0}")]
    UnsupportedDepth(usize),

    /// A dense map needs every level's vocabulary fixed up front.
    #[error("dense map requires a fixed vocabulary")]
    GrowableVocabulary,
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn alloc<T>(count: usize) -> Self {
        Error::AllocationFailure {
            requested: count.saturating_mul(std::mem::size_of::<T>()),
        }
    }
}
