use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, info_span, Instrument};

use crate::config::AnalysisSettings;
use crate::error::{AnalysisError, StoreError};
use crate::jobs::{AnalysisJob, AnalysisMetrics, JobStore};

use super::artifact::Artifact;
use super::fallback::{fill_gaps, ArtifactAttributes};
use super::parser::parse_output;
use super::process::Invocation;
use super::script::ScriptFile;

/// What the runner needs to know to launch an analysis.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub executable: PathBuf,
    /// Arguments placed before the macro path.
    pub executable_args: Vec<String>,
    pub scratch_dir: PathBuf,
    pub timeout: Duration,
}

impl RunnerSettings {
    pub fn from_settings(settings: &AnalysisSettings) -> Self {
        Self {
            executable: settings.executable_path.clone(),
            executable_args: settings.executable_args.clone(),
            scratch_dir: settings.scratch_dir.clone(),
            timeout: Duration::from_secs(settings.timeout_secs),
        }
    }

    fn artifact_path(&self, job_id: &str, original_filename: &str) -> PathBuf {
        let ext = Path::new(original_filename)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        self.scratch_dir.join(format!("{}{}", job_id, ext))
    }

    fn script_path(&self, job_id: &str) -> PathBuf {
        self.scratch_dir.join(format!("{}_macro.ijm", job_id))
    }
}

/// Drives a single job from `Processing` to a terminal state.
///
/// The runner is the only writer for the jobs it is given; readers go
/// through the shared [`JobStore`].
pub struct AnalysisRunner {
    settings: Arc<RunnerSettings>,
    store: Arc<JobStore>,
}

impl AnalysisRunner {
    pub fn new(settings: Arc<RunnerSettings>, store: Arc<JobStore>) -> Self {
        Self { settings, store }
    }

    pub fn settings(&self) -> &RunnerSettings {
        &self.settings
    }

    /// Runs the analysis for `job_id` and records the outcome.
    ///
    /// Returns the terminal job record. Only a store failure is returned as an
    /// error; analysis failures end up in the record itself.
    pub async fn run(
        &self,
        job_id: &str,
        artifact: Artifact,
        shutdown: watch::Receiver<bool>,
    ) -> Result<AnalysisJob, StoreError> {
        let span = info_span!("analysis",
            job_id = %job_id,
            filename = %artifact.filename,
            size = artifact.declared_size,
        );

        async move {
            let outcome = self.execute(job_id, artifact, shutdown).await;
            self.finalize(job_id, outcome)
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        job_id: &str,
        artifact: Artifact,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<AnalysisMetrics, AnalysisError> {
        let artifact_size = artifact.declared_size;

        // Step 1: Persist artifact
        let image_path = self.settings.artifact_path(job_id, &artifact.filename);
        let written = artifact
            .persist_to(&image_path)
            .instrument(info_span!("persist_artifact"))
            .await?;
        debug!(path = %image_path.display(), bytes = written, "Artifact saved");

        if let Err(e) = self.store.update(job_id, |job| {
            job.artifact_path = Some(image_path.clone());
        }) {
            // Reported again, and fatally, when the job is finalized.
            error!("Failed to record artifact path: {}", e);
        }

        // Step 2: Run the analysis executable
        let script = ScriptFile::write(self.settings.script_path(job_id), &image_path).await?;
        let output = {
            let invocation = Invocation::new(&self.settings.executable, self.settings.timeout)
                .args(&self.settings.executable_args)
                .arg(script.path());
            invocation
                .run(&mut shutdown)
                .instrument(info_span!("run_analysis"))
                .await
        };
        drop(script);
        let output = output?;

        // Step 3+4: Parse output and fill in the gaps
        let parsed = parse_output(&output.combined);
        if parsed.is_empty() {
            info!("No result block in analysis output, using estimated metrics");
        }

        let attributes = ArtifactAttributes {
            size: artifact_size,
            path: &image_path,
        };
        Ok(fill_gaps(&parsed, attributes, output.elapsed))
    }

    fn finalize(
        &self,
        job_id: &str,
        outcome: Result<AnalysisMetrics, AnalysisError>,
    ) -> Result<AnalysisJob, StoreError> {
        match outcome {
            Ok(metrics) => {
                let job = self.store.update(job_id, |job| job.complete(metrics))?;
                info!(
                    purity = job.metrics.as_ref().map(|m| m.purity_percentage),
                    "Analysis completed successfully"
                );
                Ok(job)
            }
            Err(e) => {
                let message = e.to_string();
                error!(error = %message, "Analysis failed");
                self.store.update(job_id, |job| job.fail(message))
            }
        }
    }
}
