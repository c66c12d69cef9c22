//! Error kinds surfaced by the engine.
//!
//! Operator failures bubble up to the caller as [`Error`] values; staging
//! areas (selection output, crossover buffers, migration ports) are cleared
//! before an error is returned so population invariants survive a failed
//! operation.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The requested operation is not valid in the current state, e.g.
    /// initializing an already initialized population or restoring a
    /// shuffle without a backup.
    #[error("invalid operation: {0}")]
    InvalidOperation(&'static str),

    /// A numeric argument is outside its permitted range.
    #[error("argument `{argument}` out of range: {reason}")]
    ArgumentOutOfRange {
        argument: &'static str,
        reason: &'static str,
    },

    /// A required operator, buffer or prototype is absent.
    #[error("missing required argument: {0}")]
    NullArgument(&'static str),

    /// A tag was accessed with a type other than its declared one.
    #[error("tag at slot {slot} does not hold a `{requested}`")]
    InvalidTagType {
        slot: usize,
        requested: &'static str,
    },

    /// No tag is registered under the given id, or the slot index is
    /// outside the buffer.
    #[error("tag not found: {0}")]
    TagNotFound(u32),

    /// The storage pool cannot hand out another object. Recoverable by
    /// growing the pool.
    #[error("storage pool exhausted at {capacity} objects")]
    PoolExhausted { capacity: usize },

    /// Individual evaluation was requested from a fitness operation that
    /// only supports whole-population sweeps. Callers fall back to the
    /// population-level path.
    #[error("fitness operation does not support individual evaluation")]
    FitnessEvaluationUnsupported,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats_carry_context() {
        let error = Error::ArgumentOutOfRange {
            argument: "crowding_size",
            reason: "must be lower than the population size",
        };
        assert!(error.to_string().contains("crowding_size"));

        let error = Error::InvalidTagType {
            slot: 3,
            requested: "f32",
        };
        assert!(error.to_string().contains("f32"));
    }
}
