//! Job state tracking
//!
//! Maps each source file to the job already submitted for it, using the
//! ownership label as the correlation key. Any file present in the map is
//! claimed and never resubmitted, whatever the job's state.

use std::collections::BTreeMap;

use k8s_openapi::api::batch::v1::Job;
use kube::ResourceExt;
use tracing::{debug, warn};

/// Observed state of a submitted job
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum JobState {
    /// Created but no pod active yet
    Pending,
    /// At least one pod active
    Running,
    /// Completed successfully
    Succeeded,
    /// Failed permanently (never resubmitted)
    Failed,
}

impl JobState {
    /// Derive the state from a job's status
    pub fn of(job: &Job) -> Self {
        let Some(status) = job.status.as_ref() else {
            return JobState::Pending;
        };
        if status.succeeded.unwrap_or(0) > 0 {
            return JobState::Succeeded;
        }
        if status.active.unwrap_or(0) > 0 {
            return JobState::Running;
        }
        let failed_condition = status
            .conditions
            .iter()
            .flatten()
            .any(|c| c.type_ == "Failed" && c.status == "True");
        if failed_condition || status.failed.unwrap_or(0) > 0 {
            return JobState::Failed;
        }
        JobState::Pending
    }

    /// Lowercase name used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source file name → state of the job that claimed it
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClaimedFiles {
    claims: BTreeMap<String, JobState>,
}

impl ClaimedFiles {
    /// Build the claim map from jobs carrying `owner_label`
    ///
    /// Jobs without a non-empty label value are skipped. If several jobs
    /// claim the same file the most advanced state wins.
    pub fn from_jobs(jobs: &[Job], owner_label: &str) -> Self {
        let mut claims = BTreeMap::new();
        for job in jobs {
            let name = job.name_any();
            let Some(file) = job.labels().get(owner_label).filter(|f| !f.is_empty()) else {
                warn!(
                    job = %name,
                    label = %owner_label,
                    "job is missing its ownership label value"
                );
                continue;
            };
            let state = JobState::of(job);
            debug!(job = %name, file = %file, state = %state, "observed job");
            claims
                .entry(file.clone())
                .and_modify(|existing: &mut JobState| *existing = (*existing).max(state))
                .or_insert(state);
        }
        Self { claims }
    }

    /// Whether a job already exists for `file`
    pub fn is_claimed(&self, file: &str) -> bool {
        self.claims.contains_key(file)
    }

    /// State of the job claiming `file`, if any
    pub fn state(&self, file: &str) -> Option<JobState> {
        self.claims.get(file).copied()
    }

    /// Record a claim made during this cycle
    pub fn claim(&mut self, file: impl Into<String>, state: JobState) {
        self.claims.entry(file.into()).or_insert(state);
    }

    /// Claimed file count per state
    pub fn counts(&self) -> BTreeMap<JobState, usize> {
        let mut counts = BTreeMap::new();
        for state in self.claims.values() {
            *counts.entry(*state).or_insert(0) += 1;
        }
        counts
    }
}
