//! Controller runner - builds one controller future per reconciler
//!
//! The returned futures run until a shutdown signal. The caller decides how
//! to compose them with leadership loss.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Endpoints;
use kube::runtime::controller::Config as ControllerConfig;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, ResourceExt};

use networkfs_common::crd::{NetworkFilesystem, ShareManager};
use networkfs_common::is_export_endpoint;
use networkfs_controller::{endpoint, error_policy, network_filesystem, share_manager, Context};

use crate::config::OperatorConfig;

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
const WATCH_TIMEOUT_SECS: u32 = 25;

type ControllerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Build the three reconciler futures sharing one context
pub fn build_controllers(
    client: Client,
    ctx: Arc<Context>,
    config: &OperatorConfig,
) -> Vec<ControllerFuture> {
    let controller_config = ControllerConfig::default().concurrency(config.threadiness);
    let watcher = || WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS);

    let network_filesystems: Api<NetworkFilesystem> =
        Api::namespaced(client.clone(), &config.namespace);
    let endpoints: Api<Endpoints> = Api::namespaced(client.clone(), &config.longhorn_namespace);
    let share_managers: Api<ShareManager> =
        Api::namespaced(client, &config.longhorn_namespace);

    tracing::info!("- NetworkFilesystem controller");
    let namespace = config.namespace.clone();
    let lifecycle = Controller::new(network_filesystems.clone(), watcher())
        // Address changes can complete a pending enable
        .watches(endpoints.clone(), watcher(), move |ep| {
            network_filesystem_for(&ep, &namespace)
        })
        .with_config(controller_config.clone())
        .shutdown_on_signal()
        .run(network_filesystem::reconcile, error_policy, ctx.clone())
        .for_each(log_reconcile_result("NetworkFilesystem"));

    tracing::info!("- Endpoints controller");
    let address = Controller::new(endpoints, watcher())
        .with_config(controller_config.clone())
        .shutdown_on_signal()
        .run(endpoint::reconcile, error_policy, ctx.clone())
        .for_each(log_reconcile_result("Endpoints"));

    tracing::info!("- ShareManager controller");
    let longhorn_namespace = config.longhorn_namespace.clone();
    let share_process = Controller::new(share_managers, watcher())
        // A disable that starts after the share manager stopped still completes
        .watches(network_filesystems, watcher(), move |nfs| {
            share_manager_for(&nfs, &longhorn_namespace)
        })
        .with_config(controller_config)
        .shutdown_on_signal()
        .run(share_manager::reconcile, error_policy, ctx)
        .for_each(log_reconcile_result("ShareManager"));

    vec![
        Box::pin(lifecycle),
        Box::pin(address),
        Box::pin(share_process),
    ]
}

/// NetworkFilesystem to requeue when an export Endpoints object changes
fn network_filesystem_for(
    ep: &Endpoints,
    namespace: &str,
) -> Option<ObjectRef<NetworkFilesystem>> {
    let name = ep.name_any();
    is_export_endpoint(&name).then(|| ObjectRef::new(&name).within(namespace))
}

/// ShareManager to requeue when a NetworkFilesystem is waiting on it
fn share_manager_for(
    nfs: &NetworkFilesystem,
    longhorn_namespace: &str,
) -> Option<ObjectRef<ShareManager>> {
    nfs.is_mid_disable()
        .then(|| ObjectRef::new(&nfs.name_any()).within(longhorn_namespace))
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
