//! Error type for the directory partition handoff manager.
//!
//! Mirrors the teacher crate's habit of giving the operation queue a
//! concrete, matchable error type (see `service/operation.rs`'s
//! `OperationError`) rather than a boxed `dyn Error`, since the queue's
//! retry policy needs to distinguish transient failures from terminal
//! ones.
//!
//! `spec.md` §7's policy is "no exception escapes the operation executor":
//! every synchronous entry point on [`crate::manager::DirectoryPartitionManager`]
//! returns `()`, logging and skipping rather than erroring on an
//! unexpected-but-recoverable condition (a delta handoff with no prior
//! copy, a peer no longer active, an idempotent removal that finds nothing
//! to remove). The only failure this crate needs to *signal* is a remote
//! call that failed and is worth retrying — everything else is a `warn!`
//! and a clean early return.

use directory_core::SiloAddress;
use thiserror::Error;

/// Failures a queued directory operation can report to the operation
/// queue's retry policy.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The remote call to a peer silo timed out or the transport failed.
    /// Retryable (subject to `MAX_DEQUEUE`).
    #[error("transient RPC failure contacting {silo}: {reason}")]
    TransientRpcFailure { silo: SiloAddress, reason: String },
}

impl DirectoryError {
    /// Whether the operation queue's executor should requeue this failure
    /// for another attempt (subject to `MAX_DEQUEUE`) rather than drop it
    /// immediately.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, DirectoryError::TransientRpcFailure { .. })
    }
}
