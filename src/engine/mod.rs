mod catalog;
mod context;
mod coordinator;
pub mod image;
mod matcher;
mod metadata;
mod prefilter;
mod reader;
mod walker;

pub use catalog::{default_catalog, Catalog};
pub use context::{Claim, ScanContext, ScanCounters};
pub use coordinator::{Engine, RunningScan, ScanRequest, ScanStatus};
pub use image::{CommandRuntime, ContainerRuntime};
pub use matcher::{match_contents, MatchOutcome};
pub use metadata::match_metadata;
pub use walker::{
    scan_roots, stream_roots, walk_roots, WalkSummary, FINDING_PIPELINE_CAPACITY,
};
