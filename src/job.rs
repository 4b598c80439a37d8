//! Job template builder
//!
//! Turns a source file into a `batch/v1` Job running two containers against
//! the shared data volume:
//! - `comet` searches the raw file and writes `<base>.<processed-ext>`
//! - `indexer` loads that output into the search index

use std::collections::BTreeMap;

use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, PersistentVolumeClaimVolumeSource, PodSpec, PodTemplateSpec,
    ResourceRequirements, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::config::{ControllerConfig, StageConfig};
use crate::scanner::SourceFile;
use crate::JOB_NAME_PREFIX;

/// Name of the data volume inside the pod
pub const DATA_VOLUME: &str = "promec-data";

/// Kubernetes object names and label values are capped at 63 characters
const MAX_NAME_LEN: usize = 63;

/// Derive the job name for a source file's base name
///
/// The result is a DNS subdomain: lowercase, with every character outside
/// `[a-z0-9.-]` mapped to `-` and each dot-separated segment trimmed of
/// dashes. Capped at 63 characters. `sample_001` → `comet-indexer-sample-001`,
/// `a.b` → `comet-indexer-a.b`.
pub fn job_name(base_name: &str) -> String {
    let mapped: String = base_name
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let slug = mapped
        .split('.')
        .map(|segment| segment.trim_matches('-'))
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join(".");

    let mut name = if slug.is_empty() {
        JOB_NAME_PREFIX.to_string()
    } else {
        format!("{JOB_NAME_PREFIX}-{slug}")
    };
    name.truncate(MAX_NAME_LEN);
    name.trim_end_matches(['-', '.']).to_string()
}

/// Whether `value` can be stored as a label value
///
/// The ownership label carries the raw file name, so names with spaces or
/// over 63 characters cannot be tracked and are never submitted.
pub fn is_valid_label_value(value: &str) -> bool {
    value.len() <= MAX_NAME_LEN
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && value.starts_with(|c: char| c.is_ascii_alphanumeric())
        && value.ends_with(|c: char| c.is_ascii_alphanumeric())
}

/// Build the Job for `source`
pub fn build_job(source: &SourceFile, config: &ControllerConfig) -> Job {
    let labels = BTreeMap::from([(config.owner_label.clone(), source.name.clone())]);

    Job {
        metadata: ObjectMeta {
            name: Some(job_name(&source.base_name)),
            namespace: Some(config.namespace.clone()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(JobSpec {
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(pod_spec(source, config)),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn pod_spec(source: &SourceFile, config: &ControllerConfig) -> PodSpec {
    let mount_path = config.mount_path.display().to_string();
    let ids = [
        env("UID", config.uid.to_string()),
        env("GID", config.gid.to_string()),
    ];

    let mut comet_env = vec![
        env(
            "COMET_PARAMS",
            config.container_path(&format!("{}.params", source.base_name)),
        ),
        env("COMET_INPUT_FILE", config.container_path(&source.name)),
        env("INPUT_DIRECTORY", mount_path.clone()),
    ];
    comet_env.extend(ids.iter().cloned());

    let comet = Container {
        name: "comet".to_string(),
        command: Some(vec![config.comet_command.clone()]),
        env: Some(comet_env),
        ..stage_container(&config.comet, &mount_path)
    };

    let processed_output = config.container_path(&format!(
        "{}.{}",
        source.base_name, config.processed_extension
    ));
    let indexer = Container {
        name: "indexer".to_string(),
        args: Some(vec![
            format!("-pepxml={processed_output}"),
            format!("-host={}", config.index_host),
            format!("-index={}", config.index_name),
        ]),
        env: Some(ids.to_vec()),
        ..stage_container(&config.indexer, &mount_path)
    };

    PodSpec {
        restart_policy: Some("OnFailure".to_string()),
        containers: vec![comet, indexer],
        volumes: Some(vec![Volume {
            name: DATA_VOLUME.to_string(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: config.pvc_name.clone(),
                read_only: Some(false),
            }),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

/// Image, requests and data mount shared by both stages
fn stage_container(stage: &StageConfig, mount_path: &str) -> Container {
    Container {
        image: Some(stage.image.clone()),
        image_pull_policy: Some("IfNotPresent".to_string()),
        resources: Some(ResourceRequirements {
            requests: Some(BTreeMap::from([
                ("cpu".to_string(), Quantity(stage.cpu.clone())),
                ("memory".to_string(), Quantity(stage.memory.clone())),
            ])),
            ..Default::default()
        }),
        volume_mounts: Some(vec![VolumeMount {
            name: DATA_VOLUME.to_string(),
            mount_path: mount_path.to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

fn env(name: &str, value: String) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value),
        ..Default::default()
    }
}
