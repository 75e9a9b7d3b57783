//! Tunables for the directory partition handoff manager.
//!
//! Centralized the way the teacher centralizes `ClusterConfig`
//! (`cluster/types.rs`) rather than scattering bare constants across the
//! modules that use them.

use std::time::Duration;

/// Configuration for a [`crate::manager::DirectoryPartitionManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryManagerConfig {
    /// Delay before retrying a failed queued operation.
    pub retry_delay: Duration,
    /// Maximum number of dequeue attempts for one operation before it is
    /// dropped, per `spec.md` §4.7's retry-counter state machine.
    pub max_dequeue: u32,
}

impl Default for DirectoryManagerConfig {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_millis(250),
            max_dequeue: 2,
        }
    }
}
