//! Merge job engine
//!
//! [`MergeJob`] lands a single merge request once its gates are satisfied.
//! Behavior is fixed at construction by [`MergeJobOptions`]; every abort path
//! ends in a [`MergeError`] which [`MergeJob::execute`] folds into a
//! [`JobOutcome`].

mod embargo;
mod error;
mod job;
mod options;
mod sync;

pub use embargo::{Embargo, WeeklyInterval};
pub use error::{JobOutcome, JobResult, MergeError};
pub use job::{
    APPROVAL_POLL_INTERVAL, CI_POLL_INTERVAL, MAX_CONSECUTIVE_CI_ERRORS, MERGE_STATUS_ATTEMPTS,
    MERGE_STATUS_POLL_INTERVAL, MergeJob, MergeStatusResolution, SourceProject,
};
pub use options::{
    CloneProtocol, DEFAULT_APPROVAL_TIMEOUT, DEFAULT_CI_TIMEOUT, Fusion, MergeJobOptions,
};
pub use sync::{FusedShas, reviewer_trailers};
