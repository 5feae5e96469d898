//! In-memory job store.

use std::collections::hash_map::{DefaultHasher, Entry};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::StoreError;
use crate::jobs::model::{AnalysisJob, JobStatus};

const DEFAULT_SHARDS: usize = 16;

type Shard = RwLock<HashMap<String, AnalysisJob>>;

/// Concurrent registry of analysis jobs keyed by job id.
///
/// Jobs are spread over a fixed set of `std::sync::RwLock` shards so that
/// writers for unrelated ids do not serialize on one lock. Updates replace the
/// whole record under the shard's write lock, so readers only ever see a
/// complete snapshot. Records are kept until the store is dropped.
pub struct JobStore {
    shards: Vec<Shard>,
}

impl JobStore {
    /// Creates a new job store with the default shard count.
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    /// Creates a new job store with `shards` lock shards (at least one).
    pub fn with_shards(shards: usize) -> Self {
        Self {
            shards: (0..shards.max(1))
                .map(|_| RwLock::new(HashMap::new()))
                .collect(),
        }
    }

    fn shard(&self, job_id: &str) -> &Shard {
        let mut hasher = DefaultHasher::new();
        job_id.hash(&mut hasher);
        let index = (hasher.finish() % self.shards.len() as u64) as usize;
        &self.shards[index]
    }

    fn read(shard: &Shard) -> RwLockReadGuard<'_, HashMap<String, AnalysisJob>> {
        match shard.read() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Job store shard lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(shard: &Shard) -> RwLockWriteGuard<'_, HashMap<String, AnalysisJob>> {
        match shard.write() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Job store shard lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Inserts a new job. Identifiers are never reused.
    pub fn put(&self, job: AnalysisJob) -> Result<(), StoreError> {
        let mut shard = Self::write(self.shard(&job.id));
        match shard.entry(job.id.clone()) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists(job.id)),
            Entry::Vacant(slot) => {
                slot.insert(job);
                Ok(())
            }
        }
    }

    /// Returns a snapshot of the job.
    pub fn get(&self, job_id: &str) -> Result<AnalysisJob, StoreError> {
        Self::read(self.shard(job_id))
            .get(job_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))
    }

    /// Applies `mutator` to a copy of the job and publishes the result.
    ///
    /// Finished jobs are immutable, the id cannot change, and a job can never
    /// return to `Processing`. A terminal status without `completed_at` gets
    /// stamped here. `error` is present exactly on failed jobs and `metrics`
    /// exactly on completed ones. Returns the published record.
    pub fn update<F>(&self, job_id: &str, mutator: F) -> Result<AnalysisJob, StoreError>
    where
        F: FnOnce(&mut AnalysisJob),
    {
        let mut shard = Self::write(self.shard(job_id));
        let current = shard
            .get(job_id)
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;

        if current.is_finished() {
            return Err(StoreError::AlreadyTerminal(job_id.to_string()));
        }

        let mut next = current.clone();
        mutator(&mut next);

        if next.id != job_id {
            return Err(StoreError::InvalidTransition {
                id: job_id.to_string(),
                reason: format!("id cannot change to '{}'", next.id),
            });
        }

        if next.status.is_terminal() {
            if next.completed_at.is_none() {
                next.completed_at = Some(chrono::Utc::now());
            }
        } else if next.completed_at.is_some() {
            return Err(StoreError::InvalidTransition {
                id: job_id.to_string(),
                reason: "completed_at set on an unfinished job".to_string(),
            });
        }

        let outcome_problem = match next.status {
            JobStatus::Completed if next.metrics.is_none() => Some("completed job without metrics"),
            JobStatus::Completed if next.error.is_some() => Some("completed job with an error"),
            JobStatus::Failed if next.error.is_none() => Some("failed job without an error"),
            JobStatus::Failed if next.metrics.is_some() => Some("failed job with metrics"),
            JobStatus::Processing if next.error.is_some() || next.metrics.is_some() => {
                Some("outcome set on an unfinished job")
            }
            _ => None,
        };
        if let Some(reason) = outcome_problem {
            return Err(StoreError::InvalidTransition {
                id: job_id.to_string(),
                reason: reason.to_string(),
            });
        }

        shard.insert(job_id.to_string(), next.clone());
        Ok(next)
    }

    /// Returns (processing, completed, failed) counts.
    pub fn counts(&self) -> (usize, usize, usize) {
        let mut counts = (0, 0, 0);
        for shard in &self.shards {
            for job in Self::read(shard).values() {
                match job.status {
                    JobStatus::Processing => counts.0 += 1,
                    JobStatus::Completed => counts.1 += 1,
                    JobStatus::Failed => counts.2 += 1,
                }
            }
        }
        counts
    }

    /// Total number of jobs held.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| Self::read(s).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}
