//! Export address reconciliation
//!
//! Watches the Endpoints objects the storage subsystem publishes for volume
//! exports. A newly seen export gets an auto-provisioned NetworkFilesystem.
//! For an export that should be serving, address changes are mirrored into
//! status.

use std::sync::Arc;

use k8s_openapi::api::core::v1::Endpoints;
use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::{debug, info, instrument};

use networkfs_common::crd::{EndpointStatus, ExportType, NetworkFSState, NetworkFilesystem};
use networkfs_common::{is_export_endpoint, Error};

use crate::export::{first_address, resolve_export_address};
use crate::status::{
    apply_status, mark_endpoint_changed, mark_not_ready, mark_ready, REASON_ENDPOINT_NOT_READY,
};
use crate::Context;

/// Reconcile an export Endpoints object into its NetworkFilesystem
#[instrument(skip(endpoints, ctx), fields(endpoints = %endpoints.name_any()))]
pub async fn reconcile(endpoints: Arc<Endpoints>, ctx: Arc<Context>) -> Result<Action, Error> {
    let name = endpoints.name_any();
    if endpoints.metadata.deletion_timestamp.is_some() || !is_export_endpoint(&name) {
        return Ok(Action::await_change());
    }

    let Some(nfs) = ctx.kube.get_network_filesystem(&name).await? else {
        provision(&endpoints, &ctx).await?;
        return Ok(Action::await_change());
    };

    if nfs.is_deleting() {
        debug!("network filesystem being deleted, nothing to do");
        return Ok(Action::await_change());
    }
    if nfs.status.is_none() {
        seed_status(&nfs, &endpoints, &ctx).await?;
        return Ok(Action::await_change());
    }
    if nfs.desired_state() != Some(NetworkFSState::Enabled) {
        debug!(desired_state = ?nfs.desired_state(), "export not wanted, ignoring address");
        return Ok(Action::await_change());
    }

    follow_address(&nfs, &endpoints, &ctx).await?;
    Ok(Action::await_change())
}

/// Create the NetworkFilesystem for an export seen for the first time
async fn provision(endpoints: &Endpoints, ctx: &Context) -> Result<(), Error> {
    let name = endpoints.name_any();
    let nfs = NetworkFilesystem::provisioned(&name, &ctx.namespace, first_address(endpoints));
    ctx.kube.create_network_filesystem(&nfs).await?;
    info!(namespace = %ctx.namespace, "network filesystem provisioned");
    Ok(())
}

/// Give a NetworkFilesystem without status the status it is provisioned with
///
/// Covers a create whose follow-up status write failed.
async fn seed_status(
    nfs: &NetworkFilesystem,
    endpoints: &Endpoints,
    ctx: &Context,
) -> Result<(), Error> {
    let provisioned =
        NetworkFilesystem::provisioned(&nfs.name_any(), &ctx.namespace, first_address(endpoints));
    let status = provisioned.status.unwrap_or_default();
    if apply_status(ctx, nfs, status).await? {
        info!("missing status seeded");
    }
    Ok(())
}

/// Mirror the current address into an export that should be serving
async fn follow_address(
    nfs: &NetworkFilesystem,
    endpoints: &Endpoints,
    ctx: &Context,
) -> Result<(), Error> {
    let mut status = nfs.status_or_default();
    status.export_type = ExportType::Nfs;

    match resolve_export_address(endpoints)? {
        None => {
            status.state = NetworkFSState::Enabling;
            status.endpoint_status = EndpointStatus::NotReady;
            status.endpoint.clear();
            mark_not_ready(
                &mut status.conditions,
                REASON_ENDPOINT_NOT_READY,
                "export has no reachable address",
            );
        }
        Some(address) => {
            let previous = std::mem::replace(&mut status.endpoint, address.clone());
            let serving = previous == address
                && status.endpoint_status == EndpointStatus::Ready
                && status.state == NetworkFSState::Enabled;

            status.endpoint_status = EndpointStatus::Ready;
            if !serving {
                status.state = NetworkFSState::Enabling;
            }

            if !previous.is_empty() && previous != address {
                info!(from = %previous, to = %address, "export address changed");
                mark_endpoint_changed(&mut status.conditions, &previous, &address);
            } else {
                mark_ready(&mut status.conditions, &address);
            }
        }
    }

    apply_status(ctx, nfs, status).await?;
    Ok(())
}
