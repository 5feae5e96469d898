//! Test harness for isolated analysis runs.
//!
//! The `TestHarness` owns a temporary directory holding the scratch directory
//! and a set of fake analysis tools. A fake tool is a shell script run as
//! `/bin/sh <tool> <macro path>`, so it sees the macro path as `$1`.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tempfile::TempDir;

use gypsum::{AnalysisJob, AnalysisService, AnalysisSettings};

/// Result block printed by a working analysis tool, surrounded by noise.
pub const WELL_FORMED_OUTPUT: &str = "\
ImageJ 1.54f; Java 1.8.0_345 [64-bit]; headless
ANALYSIS_RESULTS_START
purity_percentage:85.5
particle_count:45
total_area:125000
image_area:150000
threshold_value:128.5
ANALYSIS_RESULTS_END
Done.";

pub struct TestHarness {
    temp_dir: TempDir,
    /// Scratch directory handed to the service.
    pub scratch_dir: PathBuf,
    /// Where fake tools are written.
    pub tools_dir: PathBuf,
    /// Per-job deadline in seconds.
    pub timeout_secs: u64,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let scratch_dir = temp_dir.path().join("scratch");
        let tools_dir = temp_dir.path().join("tools");
        std::fs::create_dir_all(&scratch_dir).expect("Failed to create scratch dir");
        std::fs::create_dir_all(&tools_dir).expect("Failed to create tools dir");

        Self {
            temp_dir,
            scratch_dir,
            tools_dir,
            timeout_secs: 10,
        }
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes a fake analysis tool with the given shell body.
    pub fn fake_tool(&self, name: &str, body: &str) -> PathBuf {
        let path = self.tools_dir.join(name);
        std::fs::write(&path, format!("{}\n", body)).expect("Failed to write fake tool");
        path
    }

    /// A tool that prints `output` verbatim and exits successfully.
    pub fn reporting_tool(&self, output: &str) -> PathBuf {
        self.fake_tool(
            "report.sh",
            &format!("cat <<'GYPSUM_EOF'\n{}\nGYPSUM_EOF", output),
        )
    }

    pub fn settings(&self, tool: &Path) -> AnalysisSettings {
        AnalysisSettings {
            executable_path: PathBuf::from("/bin/sh"),
            executable_args: vec![tool.to_string_lossy().to_string()],
            scratch_dir: self.scratch_dir.clone(),
            timeout_secs: self.timeout_secs,
            ..AnalysisSettings::default()
        }
    }

    pub fn service(&self, tool: &Path) -> AnalysisService {
        AnalysisService::new(self.settings(tool))
    }

    /// Sorted file names currently in the scratch directory.
    pub fn scratch_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(&self.scratch_dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().to_string())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Polls the service until the job is terminal.
pub async fn wait_for_terminal(service: &AnalysisService, job_id: &str) -> AnalysisJob {
    let deadline = Instant::now() + Duration::from_secs(30);
    loop {
        let job = service.status(job_id).expect("job should exist");
        if job.is_finished() {
            return job;
        }
        assert!(
            Instant::now() < deadline,
            "job {} did not finish in time",
            job_id
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
