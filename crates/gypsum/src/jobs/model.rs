//! Analysis job records.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of an analysis job.
///
/// Jobs are created directly in `Processing`; there is no queued state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Final measurements of a completed analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisMetrics {
    pub purity_percentage: f64,
    pub confidence: f64,
    pub gypsum_content_percentage: f64,
    pub impurity_content_percentage: f64,
    pub calcite_content_percentage: f64,
    pub quartz_content_percentage: f64,
    pub other_minerals_percentage: f64,
    pub threshold_value: f64,
    pub particle_count: u32,
    /// Wall-clock time of the external process invocation.
    pub analysis_time_ms: u64,
}

/// A single analysis request tracked from submission to a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisJob {
    /// Unique job identifier.
    pub id: String,
    /// Current status.
    pub status: JobStatus,
    /// When the job was submitted.
    pub created_at: DateTime<Utc>,
    /// When the job reached a terminal state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Error message (if failed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Filename supplied by the uploader.
    pub original_filename: String,
    /// MIME type guessed from the original filename.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Declared size of the artifact in bytes.
    pub artifact_size: u64,
    /// Scratch location of the persisted artifact.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<PathBuf>,
    /// Measurements (set on completion).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<AnalysisMetrics>,
}

impl AnalysisJob {
    /// Creates a new job in the `Processing` state with a fresh identifier.
    pub fn new(original_filename: &str, artifact_size: u64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            status: JobStatus::Processing,
            created_at: Utc::now(),
            completed_at: None,
            error: None,
            original_filename: original_filename.to_string(),
            mime_type: mime_guess::from_path(original_filename)
                .first()
                .map(|m| m.to_string()),
            artifact_size,
            artifact_path: None,
            metrics: None,
        }
    }

    /// Marks the job completed with the given measurements.
    pub fn complete(&mut self, metrics: AnalysisMetrics) {
        self.status = JobStatus::Completed;
        self.metrics = Some(metrics);
        self.error = None;
        self.completed_at = Some(Utc::now());
    }

    /// Marks the job failed with the given error message.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.metrics = None;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
    }

    /// Returns true if this job is finished (completed or failed).
    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    /// Lowercased extension of the original filename including the dot, or "".
    pub fn extension(&self) -> String {
        std::path::Path::new(&self.original_filename)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
            .unwrap_or_default()
    }
}
