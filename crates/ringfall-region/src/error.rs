//! Error types for region dispatch.

use crate::RegionKey;

/// Why a dispatched job did not produce a result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The region's queue was full; the job was dropped.
    #[error("region {0} queue is saturated")]
    Saturated(RegionKey),

    /// The dispatcher was shut down.
    #[error("region {0} is closed")]
    Closed(RegionKey),

    /// The job was accepted but never completed (the worker went away
    /// or the job panicked).
    #[error("job for region {0} was dropped before completing")]
    Dropped(RegionKey),
}
