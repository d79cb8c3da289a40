//! Network filesystem manager - exports replicated volumes over NFS

use std::sync::Arc;

use clap::Parser;
use futures::future::join_all;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config, CustomResourceExt};

use networkfs_common::crd::NetworkFilesystem;
use networkfs_common::leader_election::{LeaderElector, LEADER_LEASE_NAME};
use networkfs_common::telemetry::init_tracing;
use networkfs_common::FIELD_MANAGER;
use networkfs_controller::Context;
use networkfs_operator::controller_runner::build_controllers;
use networkfs_operator::{friendly_version, Cli, OperatorConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&NetworkFilesystem::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    let config = OperatorConfig::try_from(cli)?;
    init_tracing(config.debug, config.log_format)?;
    tracing::info!(
        version = friendly_version(),
        namespace = %config.namespace,
        longhorn_namespace = %config.longhorn_namespace,
        threadiness = config.threadiness,
        "Starting network filesystem manager"
    );

    let client = build_client(&config).await?;

    if config.install_crd {
        ensure_crd_installed(&client).await?;
    }

    run_controllers(client, &config).await
}

/// Build a client from the explicit kubeconfig, or infer one
async fn build_client(config: &OperatorConfig) -> anyhow::Result<Client> {
    let kube_config = match &config.kubeconfig {
        Some(path) => {
            tracing::info!(path = %path.display(), "Using kubeconfig file");
            let kubeconfig = Kubeconfig::read_from(path)
                .map_err(|e| anyhow::anyhow!("Failed to read kubeconfig {}: {}", path.display(), e))?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?
        }
        None => Config::infer().await?,
    };
    Ok(Client::try_from(kube_config)?)
}

/// Ensure the NetworkFilesystem CRD is installed
///
/// Server-side apply keeps the installed schema in step with this binary.
async fn ensure_crd_installed(client: &Client) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::api::{Patch, PatchParams};

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    tracing::info!("Installing NetworkFilesystem CRD...");
    crds.patch(
        "networkfilesystems.harvesterhci.io",
        &params,
        &Patch::Apply(&NetworkFilesystem::crd()),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to install NetworkFilesystem CRD: {}", e))?;

    tracing::info!("NetworkFilesystem CRD installed/updated");
    Ok(())
}

/// Hold the lease and run the reconcilers until shutdown or leadership loss
async fn run_controllers(client: Client, config: &OperatorConfig) -> anyhow::Result<()> {
    let identity = std::env::var("POD_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| format!("networkfs-manager-{}", std::process::id()));

    let elector = Arc::new(LeaderElector::new(
        client.clone(),
        LEADER_LEASE_NAME,
        &config.namespace,
        &identity,
    ));
    let mut guard = elector.acquire().await?;

    let ctx = Arc::new(
        Context::builder(client.clone())
            .namespace(config.namespace.clone())
            .longhorn_namespace(config.longhorn_namespace.clone())
            .build(),
    );

    tracing::info!(identity = guard.identity(), "Starting controllers...");
    let controllers = build_controllers(client, ctx, config);

    tokio::select! {
        _ = join_all(controllers) => {
            tracing::info!("Controllers stopped");
        }
        _ = guard.lost() => {
            tracing::error!("Leadership lost, stopping controllers");
        }
    }

    if let Err(e) = guard.release_leadership().await {
        tracing::warn!(error = %e, "Failed to release lease");
    }

    tracing::info!("Network filesystem manager shutting down");
    Ok(())
}
