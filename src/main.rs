//! kube-promec - watches a directory and submits a processing Job per new file

use std::sync::Arc;

use clap::Parser;

use kube_promec::kube_api::{create_client, KubeJobApi};
use kube_promec::scanner::FsDirectoryLister;
use kube_promec::telemetry::{init_telemetry, TelemetryConfig};
use kube_promec::{ControllerArgs, Reconciler};

/// kube-promec - converts newly arrived data files into Kubernetes Jobs
#[derive(Parser, Debug)]
#[command(name = "kube-promec", version, about, long_about = None)]
struct Cli {
    /// Run a single reconciliation cycle and exit
    #[arg(long)]
    once: bool,

    #[command(flatten)]
    controller: ControllerArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // kube-rs needs a process-wide rustls crypto provider
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("CRITICAL: failed to install rustls crypto provider: {:?}", e);
        std::process::exit(1);
    }

    let telemetry = init_telemetry(&TelemetryConfig::from_env())
        .map_err(|e| anyhow::anyhow!("failed to initialize telemetry: {}", e))?;

    let cli = Cli::parse();
    let kubeconfig = cli.controller.kubeconfig.clone();

    let config = match cli.controller.into_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            std::process::exit(2);
        }
    };

    let client = create_client(kubeconfig.as_deref())
        .await
        .map_err(|e| anyhow::anyhow!("failed to create kubernetes client: {}", e))?;
    let api = Arc::new(KubeJobApi::new(client, &config.namespace));
    let reconciler = Reconciler::new(config, Arc::new(FsDirectoryLister), api);

    let config = reconciler.config();
    tracing::info!(
        directory = %config.directory.display(),
        namespace = %config.namespace,
        source_extension = %config.source_extension,
        processed_extension = %config.processed_extension,
        match_mode = ?config.match_mode,
        pvc = %config.pvc_name,
        "kube-promec started"
    );

    if cli.once {
        let outcome = reconciler.reconcile_once().await?;
        tracing::info!(
            created = outcome.created(),
            unprocessed = outcome.unprocessed,
            claimed = outcome.claimed,
            "single reconciliation cycle completed"
        );
    } else {
        reconciler.run(shutdown_signal()).await;
        tracing::info!("kube-promec shutting down");
    }

    telemetry.shutdown();
    Ok(())
}

/// Resolves on SIGINT, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
