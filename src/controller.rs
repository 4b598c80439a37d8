//! Reconciliation driver
//!
//! Each cycle recomputes everything from the directory and the Jobs API:
//! scan → resolve → track → gate → submit. Nothing is carried between cycles
//! except the failure count used to stretch the poll delay.

use std::future::Future;
use std::sync::Arc;
use std::time::SystemTime;

use tracing::{debug, error, info, instrument, warn};

use crate::backoff::{BackoffConfig, PollBackoff};
use crate::config::ControllerConfig;
use crate::gate::AdmissionGate;
use crate::kube_api::JobApi;
use crate::metrics::{self, CycleResult, CycleTimer};
use crate::resolver;
use crate::scanner::{self, DirectoryLister, ExtensionMatcher, SourceFile};
use crate::submitter::{self, Submission};
use crate::tracker::ClaimedFiles;
use crate::Result;

/// Summary of one reconciliation cycle
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CycleOutcome {
    /// Source files found
    pub sources: usize,
    /// Processed markers found
    pub processed: usize,
    /// Source files without a processed counterpart
    pub unprocessed: usize,
    /// Files already claimed by a job
    pub claimed: usize,
    /// Gate state, if the cycle got far enough to evaluate it
    pub gate: Option<AdmissionGate>,
    /// Create calls made this cycle
    pub submissions: Vec<Submission>,
}

impl CycleOutcome {
    /// Number of jobs actually created
    pub fn created(&self) -> usize {
        self.submissions.iter().filter(|s| s.is_created()).count()
    }
}

/// Drives reconciliation cycles against a directory and the Jobs API
pub struct Reconciler {
    config: ControllerConfig,
    lister: Arc<dyn DirectoryLister>,
    api: Arc<dyn JobApi>,
}

impl Reconciler {
    /// Create a reconciler from its configuration and collaborators
    pub fn new(
        config: ControllerConfig,
        lister: Arc<dyn DirectoryLister>,
        api: Arc<dyn JobApi>,
    ) -> Self {
        Self {
            config,
            lister,
            api,
        }
    }

    /// Configuration in use
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Run one cycle using the current wall clock
    pub async fn reconcile_once(&self) -> Result<CycleOutcome> {
        self.reconcile_at(SystemTime::now()).await
    }

    /// Run one cycle as if the clock read `now`
    #[instrument(skip(self, now), fields(directory = %self.config.directory.display()))]
    pub async fn reconcile_at(&self, now: SystemTime) -> Result<CycleOutcome> {
        let scanned = scanner::scan(self.lister.as_ref(), &self.config, now).await?;
        let matcher = ExtensionMatcher::from_config(&self.config);
        let unprocessed = resolver::unprocessed(&scanned.sources, &scanned.processed, &matcher);

        let mut outcome = CycleOutcome {
            sources: scanned.sources.len(),
            processed: scanned.processed.len(),
            unprocessed: unprocessed.len(),
            ..Default::default()
        };
        metrics::set_file_count("source", outcome.sources);
        metrics::set_file_count("processed", outcome.processed);
        metrics::set_file_count("unprocessed", outcome.unprocessed);

        if unprocessed.is_empty() {
            debug!(sources = outcome.sources, "no unprocessed files");
            return Ok(outcome);
        }

        let selector = self.config.label_selector();
        let jobs = self.api.list_jobs(selector).await?;
        let mut claims = ClaimedFiles::from_jobs(&jobs, &self.config.owner_label);
        debug!(jobs = jobs.len(), states = ?claims.counts(), "loaded existing jobs");
        outcome.claimed = unprocessed
            .iter()
            .filter(|s| claims.is_claimed(&s.name))
            .count();
        metrics::set_file_count("claimed", outcome.claimed);

        let candidates: Vec<&SourceFile> = unprocessed
            .into_iter()
            .filter(|s| !claims.is_claimed(&s.name))
            .collect();
        if candidates.is_empty() {
            debug!(claimed = outcome.claimed, "every unprocessed file already has a job");
            return Ok(outcome);
        }

        let pods = self.api.list_pods(selector).await?;
        let gate = AdmissionGate::evaluate(&pods);
        outcome.gate = Some(gate.clone());
        if let AdmissionGate::Closed { pending_pod } = &gate {
            warn!(
                pod = %pending_pod,
                waiting = candidates.len(),
                "pod is pending, most likely resource limit has been reached; will wait before scheduling new jobs"
            );
            metrics::record_gate_closed();
            return Ok(outcome);
        }

        outcome.submissions =
            submitter::submit_all(self.api.as_ref(), &candidates, &mut claims, &self.config)
                .await?;
        Ok(outcome)
    }

    /// Run cycles until `shutdown` resolves
    ///
    /// Cycle errors are logged and retried after the poll delay. Shutdown is
    /// only observed between cycles.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut backoff = PollBackoff::new(BackoffConfig::new(
            self.config.poll_interval,
            self.config.max_backoff,
        ));
        let mut shutdown = std::pin::pin!(shutdown);

        info!(
            directory = %self.config.directory.display(),
            namespace = %self.config.namespace,
            interval_secs = self.config.poll_interval.as_secs(),
            "reconciliation loop started"
        );

        loop {
            let timer = CycleTimer::start();
            match self.reconcile_once().await {
                Ok(outcome) => {
                    timer.finish(CycleResult::Success);
                    backoff.record_success();
                    if !outcome.submissions.is_empty() {
                        info!(
                            created = outcome.created(),
                            unprocessed = outcome.unprocessed,
                            "reconciliation cycle submitted jobs"
                        );
                    } else {
                        debug!(?outcome, "reconciliation cycle completed");
                    }
                }
                Err(e) => {
                    timer.finish(CycleResult::Error);
                    backoff.record_failure();
                    error!(
                        error = %e,
                        consecutive_failures = backoff.consecutive_failures(),
                        "reconciliation cycle failed"
                    );
                }
            }

            let delay = backoff.next_delay();
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = &mut shutdown => {
                    info!("shutdown requested, stopping reconciliation loop");
                    return;
                }
            }
        }
    }
}
