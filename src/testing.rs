//! Shared fixtures for unit tests

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use k8s_openapi::api::batch::v1::{Job, JobStatus};
use k8s_openapi::api::core::v1::{Pod, PodStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::config::{ControllerConfig, MatchMode, StageConfig};
use crate::scanner::SourceFile;

/// Configuration with distinct, recognizable values for every setting
pub fn config(directory: &str) -> ControllerConfig {
    ControllerConfig {
        directory: PathBuf::from(directory),
        source_extension: "mzML".to_string(),
        processed_extension: "pep.xml".to_string(),
        match_mode: MatchMode::Suffix,
        quiet_period: Some(Duration::from_secs(60)),
        poll_interval: Duration::from_secs(10),
        max_backoff: Duration::from_secs(10),
        namespace: "promec".to_string(),
        owner_label: "promec-file".to_string(),
        comet: StageConfig {
            image: "promec/comet:test".to_string(),
            cpu: "2".to_string(),
            memory: "4Gi".to_string(),
        },
        comet_command: "/bin/comet.sh".to_string(),
        indexer: StageConfig {
            image: "promec/indexer:test".to_string(),
            cpu: "500m".to_string(),
            memory: "512Mi".to_string(),
        },
        index_host: "http://search:9200".to_string(),
        index_name: "proteomics".to_string(),
        pvc_name: "promec-data-claim".to_string(),
        mount_path: PathBuf::from(directory),
        uid: 1000,
        gid: 2000,
    }
}

/// Source file with an explicit base name
pub fn source(name: &str, base: &str) -> SourceFile {
    SourceFile {
        name: name.to_string(),
        base_name: base.to_string(),
    }
}

/// Job owned by `file` with no status yet
pub fn owned_job(name: &str, file: &str) -> Job {
    Job {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(BTreeMap::from([(
                "promec-file".to_string(),
                file.to_string(),
            )])),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Job owned by `file` with the given status counters
pub fn job_with_status(name: &str, file: &str, active: i32, succeeded: i32, failed: i32) -> Job {
    let mut job = owned_job(name, file);
    job.status = Some(JobStatus {
        active: Some(active),
        succeeded: Some(succeeded),
        failed: Some(failed),
        ..Default::default()
    });
    job
}

/// Pod with the given phase
pub fn pod(name: &str, phase: Option<&str>) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        status: phase.map(|p| PodStatus {
            phase: Some(p.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}
