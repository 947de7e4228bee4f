/// Probe engine - runs the periodic HTTP probes
///
/// This module is responsible for:
/// - Performing single HTTP probes
/// - Driving one ticker per job
/// - Tracking the set of jobs and their lifecycle
pub mod job;
pub mod prober;
pub mod registry;
pub mod types;

#[cfg(test)]
pub(crate) mod fakes;

pub use job::ProbeJob;
pub use prober::{HttpProber, Prober};
pub use registry::JobRegistry;
pub use types::{JobSnapshot, JobStatus, Observation};
