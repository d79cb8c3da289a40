//! NetworkFilesystem lifecycle reconciliation
//!
//! Drives an export toward `spec.desiredState`:
//!
//! ```text
//! Disabled ──enable──> Enabling ──address ready──> Enabled
//!     ^                                               │
//!     └── share process stopped ── Disabling <─disable┘
//! ```
//!
//! Enabling requests attachment of the volume with its frontend on. If the
//! export is already reachable the resource goes straight to Enabled.
//! Disabling releases every attachment ticket and leaves the final step to
//! the share-manager reconciler.

use std::sync::Arc;

use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::{debug, info, instrument, warn};

use networkfs_common::crd::{EndpointStatus, ExportType, NetworkFSState, NetworkFilesystem};
use networkfs_common::Error;

use crate::export::{mount_options, resolve_export_address, with_export_tickets, without_tickets};
use crate::status::{apply_status, mark_not_ready, mark_ready, REASON_ENDPOINT_NOT_READY};
use crate::Context;

/// Reconcile a NetworkFilesystem toward its desired state
#[instrument(skip(nfs, ctx), fields(network_filesystem = %nfs.name_any()))]
pub async fn reconcile(nfs: Arc<NetworkFilesystem>, ctx: Arc<Context>) -> Result<Action, Error> {
    if nfs.is_deleting() {
        debug!("being deleted, nothing to do");
        return Ok(Action::await_change());
    }
    if nfs.at_desired_state() {
        debug!(state = %nfs.state(), "already at desired state");
        return Ok(Action::await_change());
    }

    match nfs.desired_state() {
        Some(NetworkFSState::Enabled) => enable(&nfs, &ctx).await?,
        Some(NetworkFSState::Disabled) => disable(&nfs, &ctx).await?,
        None => debug!("no desired state set, nothing to do"),
        Some(other) => warn!(desired_state = %other, "unsupported desired state, ignoring"),
    }
    Ok(Action::await_change())
}

/// Request attachment and publish the export if it is already reachable
async fn enable(nfs: &NetworkFilesystem, ctx: &Context) -> Result<(), Error> {
    let name = nfs.name_any();

    // Topology is checked before anything is written
    let address = match ctx.kube.get_endpoints(&name).await? {
        Some(endpoints) => resolve_export_address(&endpoints)?,
        None => None,
    };

    request_attachment(nfs, ctx).await?;

    let mut status = nfs.status_or_default();
    status.export_type = ExportType::Nfs;
    match address {
        Some(address) => {
            let pv = ctx.kube.get_persistent_volume(&name).await?;
            status.state = NetworkFSState::Enabled;
            status.endpoint_status = EndpointStatus::Ready;
            status.mount_options = mount_options(pv.as_ref());
            mark_ready(&mut status.conditions, &address);
            status.endpoint = address;
        }
        None => {
            status.state = NetworkFSState::Enabling;
            status.endpoint_status = EndpointStatus::NotReady;
            status.endpoint.clear();
            mark_not_ready(
                &mut status.conditions,
                REASON_ENDPOINT_NOT_READY,
                "waiting for the export to publish an address",
            );
        }
    }

    apply_status(ctx, nfs, status).await?;
    Ok(())
}

/// Release attachment and mark the export as going down
async fn disable(nfs: &NetworkFilesystem, ctx: &Context) -> Result<(), Error> {
    if nfs.state() == NetworkFSState::Disabling {
        debug!("disable already in progress, waiting for the share process to stop");
        return Ok(());
    }

    release_attachment(nfs, ctx).await?;

    let mut status = nfs.status_or_default();
    status.state = NetworkFSState::Disabling;
    apply_status(ctx, nfs, status).await?;
    Ok(())
}

async fn request_attachment(nfs: &NetworkFilesystem, ctx: &Context) -> Result<(), Error> {
    let name = nfs.name_any();
    let mut va = ctx
        .kube
        .get_volume_attachment(&name)
        .await?
        .ok_or_else(|| Error::not_found("VolumeAttachment", &name))?;

    let node = nfs.spec.preferred_node.as_deref().unwrap_or("");
    let desired = with_export_tickets(&va.spec, &name, node);
    if desired == va.spec {
        debug!("attachment tickets already present");
        return Ok(());
    }

    va.spec = desired;
    ctx.kube.replace_volume_attachment(&va).await?;
    info!(node = %node, "attachment requested");
    Ok(())
}

async fn release_attachment(nfs: &NetworkFilesystem, ctx: &Context) -> Result<(), Error> {
    let name = nfs.name_any();
    let Some(mut va) = ctx.kube.get_volume_attachment(&name).await? else {
        debug!("no volume attachment, nothing to release");
        return Ok(());
    };
    if va.spec.attachment_tickets.is_empty() {
        return Ok(());
    }

    va.spec = without_tickets(&va.spec);
    ctx.kube.replace_volume_attachment(&va).await?;
    info!("attachment released");
    Ok(())
}
