//! Director
//!
//! Generates match profiles once, then on every tick fetches proposals for
//! each profile, resolves them to game servers and reports the assignments.

pub mod director;
pub mod profiles;
pub mod reporter;

pub use director::{
    cancelled, Director, DirectorConfig, DirectorStats, PipelineOutcome, SharedDirectorStats, TickSummary,
};
pub use profiles::{ProfileGenerator, StaticProfiles, WorldRegionProfiles, REGIONS, WORLDS};
pub use reporter::{cleanup_unresolved, AssignmentReporter, ReportOutcome};
