//! Controller configuration
//!
//! Flags (each with an environment variable) are parsed into
//! [`ControllerArgs`] and validated once at startup into a
//! [`ControllerConfig`], which every component receives by reference.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, ValueEnum};

use crate::{Error, Result};

/// How file names are matched against the source and processed extensions
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum MatchMode {
    /// Extension must be a `.<ext>` suffix; processed and source base names
    /// must be equal
    #[default]
    Suffix,
    /// Extension may appear anywhere in the name; a processed base name that
    /// is a substring of a source name marks it handled
    Substring,
}

/// Container settings for one execution stage
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageConfig {
    /// Container image reference
    pub image: String,
    /// CPU request (Kubernetes quantity, e.g. "500m")
    pub cpu: String,
    /// Memory request (Kubernetes quantity, e.g. "512Mi")
    pub memory: String,
}

/// Validated configuration for the whole controller
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Directory watched for new files
    pub directory: PathBuf,
    /// Extension identifying raw input files (e.g. "mzML")
    pub source_extension: String,
    /// Extension identifying processed output files (e.g. "pep.xml")
    pub processed_extension: String,
    /// Extension matching policy
    pub match_mode: MatchMode,
    /// Files modified more recently than this are skipped; `None` disables
    pub quiet_period: Option<Duration>,
    /// Delay between reconciliation cycles
    pub poll_interval: Duration,
    /// Upper bound on the delay after repeated failed cycles
    pub max_backoff: Duration,
    /// Namespace jobs are created in and pods are observed in
    pub namespace: String,
    /// Label key binding a job (and its pods) to its source file
    pub owner_label: String,
    /// Numeric analysis stage
    pub comet: StageConfig,
    /// Entrypoint of the numeric analysis container
    pub comet_command: String,
    /// Indexing stage
    pub indexer: StageConfig,
    /// Search index endpoint passed to the indexer
    pub index_host: String,
    /// Search index name passed to the indexer
    pub index_name: String,
    /// PersistentVolumeClaim holding the data directory
    pub pvc_name: String,
    /// Where the data volume is mounted inside job containers
    pub mount_path: PathBuf,
    /// User id exported to both stages
    pub uid: u32,
    /// Group id exported to both stages
    pub gid: u32,
}

impl ControllerConfig {
    /// Label selector matching every job and pod this controller owns
    pub fn label_selector(&self) -> &str {
        &self.owner_label
    }

    /// Path of a data file as seen from inside the job containers
    pub fn container_path(&self, file: &str) -> String {
        self.mount_path.join(file).display().to_string()
    }
}

/// Command-line flags for the controller
#[derive(Args, Debug, Clone)]
pub struct ControllerArgs {
    /// Path to a kubeconfig file; in-cluster or default config is used if unset
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,

    /// Directory to watch for new files
    #[arg(long, env = "PROMEC_DIRECTORY", default_value = ".")]
    pub directory: PathBuf,

    /// Seconds to sleep between reconciliation cycles
    #[arg(long, env = "PROMEC_SLEEP_INTERVAL", default_value = "10")]
    pub sleep_interval: u64,

    /// Upper bound in seconds for the delay after repeated failed cycles
    ///
    /// Defaults to the sleep interval, which keeps the delay fixed.
    #[arg(long, env = "PROMEC_MAX_BACKOFF")]
    pub max_backoff: Option<u64>,

    /// Seconds a file must be left unmodified before it is picked up (0 disables)
    #[arg(long, env = "PROMEC_QUIET_PERIOD", default_value = "60")]
    pub quiet_period: u64,

    /// Source file extension which will be used to process files
    #[arg(long, env = "PROMEC_SOURCE_EXTENSION", default_value = "mzML")]
    pub source_extension: String,

    /// Processed file extension which will be used to skip already processed files
    #[arg(long, env = "PROMEC_PROCESSED_EXTENSION", default_value = "pep.xml")]
    pub processed_extension: String,

    /// How extensions are matched against file names
    #[arg(long, env = "PROMEC_MATCH_MODE", value_enum, default_value_t = MatchMode::Suffix)]
    pub match_mode: MatchMode,

    /// Namespace to create jobs in
    #[arg(long, env = "PROMEC_NAMESPACE", default_value = "default")]
    pub namespace: String,

    /// Label key binding jobs to source files
    #[arg(long, env = "PROMEC_OWNER_LABEL", default_value = crate::DEFAULT_OWNER_LABEL)]
    pub owner_label: String,

    /// Image for the numeric analysis stage
    #[arg(long, env = "PROMEC_COMET_IMAGE", default_value = "promec/comet:latest")]
    pub comet_image: String,

    /// Entrypoint of the numeric analysis container
    #[arg(long, env = "PROMEC_COMET_COMMAND", default_value = "/bin/comet.sh")]
    pub comet_command: String,

    /// CPU request for the numeric analysis stage
    #[arg(long, env = "PROMEC_COMET_CPU", default_value = "1")]
    pub comet_cpu: String,

    /// Memory request for the numeric analysis stage
    #[arg(long, env = "PROMEC_COMET_MEMORY", default_value = "2Gi")]
    pub comet_memory: String,

    /// Image for the indexing stage
    #[arg(long, env = "PROMEC_INDEXER_IMAGE", default_value = "promec/indexer:latest")]
    pub indexer_image: String,

    /// CPU request for the indexing stage
    #[arg(long, env = "PROMEC_INDEXER_CPU", default_value = "500m")]
    pub indexer_cpu: String,

    /// Memory request for the indexing stage
    #[arg(long, env = "PROMEC_INDEXER_MEMORY", default_value = "512Mi")]
    pub indexer_memory: String,

    /// Search index endpoint
    #[arg(long, env = "PROMEC_INDEX_HOST", default_value = "http://elasticsearch:9200")]
    pub index_host: String,

    /// Search index name
    #[arg(long, env = "PROMEC_INDEX_NAME", default_value = "promec")]
    pub index_name: String,

    /// PersistentVolumeClaim holding the watched directory
    #[arg(long, env = "PROMEC_PVC_NAME")]
    pub pvc_name: Option<String>,

    /// Mount path of the data volume inside job containers (defaults to --directory)
    #[arg(long, env = "PROMEC_MOUNT_PATH")]
    pub mount_path: Option<PathBuf>,

    /// User id exported to both stages
    #[arg(long, env = "PROMEC_UID", default_value = "1000")]
    pub uid: String,

    /// Group id exported to both stages
    #[arg(long, env = "PROMEC_GID", default_value = "1000")]
    pub gid: String,
}

impl ControllerArgs {
    /// Validate the flags and build the controller configuration
    pub fn into_config(self) -> Result<ControllerConfig> {
        if self.directory.as_os_str().is_empty() {
            return Err(Error::config("directory", "a directory to watch is required"));
        }
        require("source-extension", &self.source_extension)?;
        require("processed-extension", &self.processed_extension)?;
        if self.source_extension == self.processed_extension {
            return Err(Error::config(
                "processed-extension",
                "must differ from the source extension",
            ));
        }
        if self.sleep_interval == 0 {
            return Err(Error::config("sleep-interval", "must be at least 1 second"));
        }
        require("namespace", &self.namespace)?;
        validate_label_key(&self.owner_label)?;

        let pvc_name = self
            .pvc_name
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| Error::config("pvc-name", "a persistent volume claim is required"))?;

        let comet = StageConfig {
            image: self.comet_image,
            cpu: self.comet_cpu,
            memory: self.comet_memory,
        };
        let indexer = StageConfig {
            image: self.indexer_image,
            cpu: self.indexer_cpu,
            memory: self.indexer_memory,
        };
        validate_stage("comet", &comet)?;
        validate_stage("indexer", &indexer)?;

        let poll_interval = Duration::from_secs(self.sleep_interval);
        let max_backoff = self
            .max_backoff
            .map(Duration::from_secs)
            .unwrap_or(poll_interval)
            .max(poll_interval);
        let quiet_period = (self.quiet_period > 0).then(|| Duration::from_secs(self.quiet_period));
        let mount_path = self.mount_path.unwrap_or_else(|| self.directory.clone());

        Ok(ControllerConfig {
            uid: parse_id("uid", &self.uid)?,
            gid: parse_id("gid", &self.gid)?,
            directory: self.directory,
            source_extension: self.source_extension,
            processed_extension: self.processed_extension,
            match_mode: self.match_mode,
            quiet_period,
            poll_interval,
            max_backoff,
            namespace: self.namespace,
            owner_label: self.owner_label,
            comet,
            comet_command: self.comet_command,
            indexer,
            index_host: self.index_host,
            index_name: self.index_name,
            pvc_name,
            mount_path,
        })
    }
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::config(field, "must not be empty"));
    }
    Ok(())
}

fn validate_stage(stage: &str, cfg: &StageConfig) -> Result<()> {
    require(&format!("{stage}-image"), &cfg.image)?;
    require(&format!("{stage}-cpu"), &cfg.cpu)?;
    require(&format!("{stage}-memory"), &cfg.memory)
}

fn parse_id(field: &str, value: &str) -> Result<u32> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::config(field, format!("'{value}' is not a numeric id")))
}

/// Label keys are an optional DNS prefix plus a name of at most 63
/// alphanumeric, '-', '_' or '.' characters starting and ending alphanumeric.
fn validate_label_key(key: &str) -> Result<()> {
    let name = key.rsplit_once('/').map_or(key, |(_, name)| name);
    let valid = !name.is_empty()
        && name.len() <= 63
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && name.starts_with(|c: char| c.is_ascii_alphanumeric())
        && name.ends_with(|c: char| c.is_ascii_alphanumeric());
    if !valid {
        return Err(Error::config(
            "owner-label",
            format!("'{key}' is not a valid label key"),
        ));
    }
    Ok(())
}
