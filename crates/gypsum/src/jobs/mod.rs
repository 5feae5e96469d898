//! Job records and the concurrent store that holds them.

pub mod model;
pub mod store;

pub use model::{AnalysisJob, AnalysisMetrics, JobStatus};
pub use store::JobStore;
