use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::analysis::{AnalysisRunner, Artifact, RunnerSettings};
use crate::config::AnalysisSettings;
use crate::error::{StoreError, SubmitError};
use crate::jobs::{AnalysisJob, JobStore};

/// Accepts artifacts, runs each analysis in the background, and answers
/// status queries.
///
/// `submit` must be called from within a Tokio runtime.
pub struct AnalysisService {
    settings: AnalysisSettings,
    store: Arc<JobStore>,
    runner: Arc<AnalysisRunner>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<JoinSet<()>>,
}

impl AnalysisService {
    pub fn new(settings: AnalysisSettings) -> Self {
        Self::with_store(settings, Arc::new(JobStore::new()))
    }

    pub fn with_store(settings: AnalysisSettings, store: Arc<JobStore>) -> Self {
        let runner = AnalysisRunner::new(
            Arc::new(RunnerSettings::from_settings(&settings)),
            Arc::clone(&store),
        );
        let (shutdown, _) = watch::channel(false);

        Self {
            settings,
            store,
            runner: Arc::new(runner),
            shutdown,
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    /// Validates `artifact`, records a new `Processing` job and starts its
    /// analysis. Returns the job id without waiting for the outcome.
    ///
    /// A rejected submission leaves no job record behind.
    pub fn submit(&self, artifact: Artifact) -> Result<String, SubmitError> {
        let mut tasks = self.lock_tasks();

        if *self.shutdown.borrow() {
            return Err(SubmitError::ShuttingDown);
        }
        let job = AnalysisJob::new(&artifact.filename, artifact.declared_size);
        self.validate(&artifact, &job)?;

        let job_id = job.id.clone();
        self.store.put(job)?;

        while let Some(finished) = tasks.try_join_next() {
            if let Err(e) = finished {
                error!("Analysis task panicked: {}", e);
            }
        }

        let runner = Arc::clone(&self.runner);
        let shutdown = self.shutdown.subscribe();
        let task_job_id = job_id.clone();
        tasks.spawn(async move {
            if let Err(e) = runner.run(&task_job_id, artifact, shutdown).await {
                error!(job_id = %task_job_id, "Failed to record analysis outcome: {}", e);
            }
        });

        info!(job_id = %job_id, "Analysis submitted");
        Ok(job_id)
    }

    fn validate(&self, artifact: &Artifact, job: &AnalysisJob) -> Result<(), SubmitError> {
        if artifact.declared_size > self.settings.max_artifact_size {
            return Err(SubmitError::TooLarge {
                size: artifact.declared_size,
                limit: self.settings.max_artifact_size,
            });
        }

        let extension = job.extension();
        if !self.settings.allows_extension(&extension) {
            debug!(filename = %artifact.filename, "Rejected unsupported artifact");
            return Err(SubmitError::UnsupportedFormat(extension));
        }

        Ok(())
    }

    /// Snapshot of the job record.
    pub fn status(&self, job_id: &str) -> Result<AnalysisJob, StoreError> {
        self.store.get(job_id)
    }

    /// Returns (processing, completed, failed) counts.
    pub fn counts(&self) -> (usize, usize, usize) {
        self.store.counts()
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Cancels every in-flight analysis and waits for the runners to record
    /// their outcomes. Later submissions are rejected.
    pub async fn shutdown(&self) {
        info!("Shutting down analysis service...");
        self.shutdown.send_replace(true);

        let mut tasks = std::mem::take(&mut *self.lock_tasks());
        while let Some(finished) = tasks.join_next().await {
            if let Err(e) = finished {
                error!("Analysis task panicked: {}", e);
            }
        }

        info!("All analysis tasks have stopped");
    }

    fn lock_tasks(&self) -> MutexGuard<'_, JoinSet<()>> {
        match self.tasks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Analysis task set lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}
