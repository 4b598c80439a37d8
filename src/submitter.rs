//! Job submission
//!
//! One create call per eligible file. The first failure aborts the rest of
//! the pass; files not attempted are picked up again next cycle.

use kube::ResourceExt;
use tracing::{debug, error, info, warn};

use crate::config::ControllerConfig;
use crate::job::{build_job, is_valid_label_value};
use crate::kube_api::JobApi;
use crate::metrics;
use crate::scanner::SourceFile;
use crate::tracker::{ClaimedFiles, JobState};
use crate::Result;

/// Result of submitting one file
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Submission {
    /// The job was created
    Created {
        /// Source file the job processes
        file: String,
        /// Name of the created job
        job: String,
    },
    /// A job with the same name already existed
    AlreadyExists {
        /// Source file the job would have processed
        file: String,
        /// Name of the conflicting job
        job: String,
    },
}

impl Submission {
    /// Whether a new job was created
    pub fn is_created(&self) -> bool {
        matches!(self, Submission::Created { .. })
    }
}

/// Create the job for one source file
///
/// A name conflict is not an error: another controller (or an earlier cycle
/// whose response was lost) got there first.
pub async fn submit(
    api: &dyn JobApi,
    source: &SourceFile,
    config: &ControllerConfig,
) -> Result<Submission> {
    let job = build_job(source, config);
    let job_name = job.name_any();

    match api.create_job(&job).await {
        Ok(created) => {
            info!(job = %created.name_any(), file = %source.name, "launched job to process file");
            metrics::record_submission("created");
            Ok(Submission::Created {
                file: source.name.clone(),
                job: created.name_any(),
            })
        }
        Err(e) if e.is_already_exists() => {
            warn!(
                job = %job_name,
                file = %source.name,
                "job already exists, treating file as claimed"
            );
            metrics::record_submission("already_exists");
            Ok(Submission::AlreadyExists {
                file: source.name.clone(),
                job: job_name,
            })
        }
        Err(e) => {
            error!(job = %job_name, file = %source.name, error = %e, "failed in scheduling job");
            metrics::record_submission("error");
            Err(e)
        }
    }
}

/// Submit every unclaimed candidate, in order, stopping at the first error
///
/// Claims are recorded as jobs are created so a file is never submitted
/// twice within one pass.
pub async fn submit_all(
    api: &dyn JobApi,
    candidates: &[&SourceFile],
    claims: &mut ClaimedFiles,
    config: &ControllerConfig,
) -> Result<Vec<Submission>> {
    let mut submissions = Vec::new();
    for source in candidates {
        if let Some(state) = claims.state(&source.name) {
            debug!(file = %source.name, state = %state, "file already claimed by a job");
            continue;
        }
        if !is_valid_label_value(&source.name) {
            warn!(
                file = %source.name,
                "file name cannot be used as a label value, skipping"
            );
            continue;
        }
        let submission = submit(api, source, config).await?;
        claims.claim(source.name.clone(), JobState::Pending);
        submissions.push(submission);
    }
    Ok(submissions)
}
