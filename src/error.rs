//! Error types for locator and interception failures.
//!
//! The taxonomy is deliberately small. Everything that can go wrong while
//! working against a host-controlled object graph collapses into one of
//! three cases:
//!
//! - [`Error::NotFound`]: no instance within the traversal bound satisfied
//!   the contract. Recoverable: the host may simply not have mounted the
//!   component yet, so callers retry later or degrade the feature.
//! - [`Error::ContractMismatch`]: a previously matched handle no longer
//!   satisfies its contract (host unmounted the instance, or a host update
//!   changed its shape). Callers should disable the dependent feature
//!   rather than crash.
//! - [`Error::PatchConflict`]: a patch targeted a method that is not
//!   present on the instance. Treated by callers like a contract mismatch.
//!
//! Faults inside user-supplied handlers, providers, and hooks are *not*
//! errors at this level: they are isolated and logged where they occur and
//! never propagate to siblings or to the host's own method execution.

use crate::locator::Direction;

/// Errors produced by the locator and interception layer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No instance matching the contract was found within the traversal bound.
    #[error("no instance matching contract `{contract}` within {max_depth} levels ({direction})")]
    NotFound {
        /// Name of the contract that failed to match.
        contract: String,
        /// Traversal direction that was searched.
        direction: Direction,
        /// Depth ceiling that bounded the search.
        max_depth: usize,
    },

    /// An instance no longer satisfies the contract it was matched against.
    #[error("instance no longer satisfies contract `{contract}`: {reason}")]
    ContractMismatch {
        /// Name of the violated contract.
        contract: String,
        /// First unmet requirement, or the lifecycle event that invalidated the handle.
        reason: String,
    },

    /// A patch targeted a method that is not present on the instance.
    #[error("cannot patch `{method}`: method not present on instance")]
    PatchConflict {
        /// Name of the missing method.
        method: String,
    },
}

/// Convenience result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
