pub mod aggregate;
pub mod coordinator;
pub mod freshness;
pub mod merge;

pub use aggregate::aggregate;
pub use coordinator::{fetch_all, SyncOptions, SyncOutcome, UplinkOutcome};
pub use freshness::should_fetch;
pub use merge::{merge, MergeReport, Merged, VersionConflict};
