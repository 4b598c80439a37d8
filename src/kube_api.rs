//! Kubernetes access for the controller
//!
//! The reconciler only needs three calls, so they sit behind [`JobApi`] and
//! tests swap in mocks or in-memory fakes.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::{Error, Result};

/// Default connection timeout for the kube client
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for the kube client
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Field manager recorded on created jobs
pub const FIELD_MANAGER: &str = "kube-promec";

/// Trait abstracting the job-execution and pod-observation APIs
#[cfg_attr(test, automock)]
#[async_trait]
pub trait JobApi: Send + Sync {
    /// List jobs matching a label selector
    async fn list_jobs(&self, selector: &str) -> Result<Vec<Job>>;

    /// Create a job, returning the object stored by the API server
    async fn create_job(&self, job: &Job) -> Result<Job>;

    /// List pods matching a label selector
    async fn list_pods(&self, selector: &str) -> Result<Vec<Pod>>;
}

/// [`JobApi`] backed by a namespaced kube client
pub struct KubeJobApi {
    jobs: Api<Job>,
    pods: Api<Pod>,
}

impl KubeJobApi {
    /// Create a client scoped to `namespace`
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            jobs: Api::namespaced(client.clone(), namespace),
            pods: Api::namespaced(client, namespace),
        }
    }
}

#[async_trait]
impl JobApi for KubeJobApi {
    async fn list_jobs(&self, selector: &str) -> Result<Vec<Job>> {
        let list = self.jobs.list(&ListParams::default().labels(selector)).await?;
        debug!(selector = %selector, count = list.items.len(), "listed jobs");
        Ok(list.items)
    }

    async fn create_job(&self, job: &Job) -> Result<Job> {
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        Ok(self.jobs.create(&params, job).await?)
    }

    async fn list_pods(&self, selector: &str) -> Result<Vec<Pod>> {
        let list = self.pods.list(&ListParams::default().labels(selector)).await?;
        debug!(selector = %selector, count = list.items.len(), "listed pods");
        Ok(list.items)
    }
}

/// Create a kube client from an optional kubeconfig path
///
/// Without a path the config is inferred (in-cluster service account, then
/// `$KUBECONFIG`/`~/.kube/config`).
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client> {
    let mut config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                Error::internal_with_context(
                    "create_client",
                    format!("failed to read kubeconfig {}: {}", path.display(), e),
                )
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| {
                    Error::internal_with_context(
                        "create_client",
                        format!("failed to load kubeconfig: {}", e),
                    )
                })?
        }
        None => Config::infer().await.map_err(|e| {
            Error::internal_with_context("create_client", format!("failed to infer config: {}", e))
        })?,
    };
    config.connect_timeout = Some(DEFAULT_CONNECT_TIMEOUT);
    config.read_timeout = Some(DEFAULT_READ_TIMEOUT);

    Client::try_from(config).map_err(|e| {
        Error::internal_with_context("create_client", format!("failed to create client: {}", e))
    })
}
