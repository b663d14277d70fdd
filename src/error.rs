//! Allocator error types.

use core::fmt;

/// Errors that can occur while initialising or growing the arena.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AllocError {
    /// The memory source could not extend the arena.
    OutOfMemory {
        /// Number of bytes requested from the source.
        requested: usize,
    },
    /// The memory source returned memory that does not continue the arena.
    Discontiguous {
        /// Address the new region had to start at.
        expected: usize,
        /// Address the source actually returned.
        found: usize,
    },
    /// The first region handed out by the source is not 8-byte aligned.
    Misaligned {
        /// Address returned by the source.
        addr: usize,
    },
    /// Growing would push the arena past what 32-bit offsets can address.
    ArenaLimit {
        /// Arena size the growth would have produced.
        requested: usize,
        /// Largest supported arena size.
        limit: usize,
    },
    /// A configuration value was rejected.
    InvalidConfig(&'static str),
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory { requested } => {
                write!(f, "memory source exhausted: requested {requested} bytes")
            }
            Self::Discontiguous { expected, found } => {
                write!(
                    f,
                    "memory source returned {found:#x}, expected contiguous growth at {expected:#x}"
                )
            }
            Self::Misaligned { addr } => {
                write!(f, "arena base {addr:#x} is not 8-byte aligned")
            }
            Self::ArenaLimit { requested, limit } => {
                write!(
                    f,
                    "arena limit exceeded: {requested} bytes requested, limit {limit} bytes"
                )
            }
            Self::InvalidConfig(reason) => write!(f, "invalid allocator config: {reason}"),
        }
    }
}

impl core::error::Error for AllocError {}
