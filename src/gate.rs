//! Admission gate
//!
//! A pending pod is read as a sign the cluster ran out of room. While any
//! managed pod is pending no new job is submitted anywhere.

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tracing::debug;

/// Pod phase signalling the scheduler could not place a pod yet
pub const PENDING_PHASE: &str = "Pending";

/// Cycle-wide submission decision
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AdmissionGate {
    /// New jobs may be submitted
    Open,
    /// Submissions are suppressed for this cycle
    Closed {
        /// First pending pod found
        pending_pod: String,
    },
}

impl AdmissionGate {
    /// Evaluate the gate against the pods this controller owns
    pub fn evaluate(pods: &[Pod]) -> Self {
        for pod in pods {
            let phase = pod.status.as_ref().and_then(|s| s.phase.as_deref());
            debug!(pod = %pod.name_any(), phase = ?phase, "observed pod");
            if phase == Some(PENDING_PHASE) {
                return AdmissionGate::Closed {
                    pending_pod: pod.name_any(),
                };
            }
        }
        AdmissionGate::Open
    }

    /// Whether submissions are allowed
    pub fn is_open(&self) -> bool {
        matches!(self, AdmissionGate::Open)
    }
}
