//! Share process reconciliation
//!
//! A disable is finished only once the share process serving the export has
//! stopped. This reconciler watches ShareManagers and moves a Disabling
//! NetworkFilesystem to Disabled when that happens.

use std::sync::Arc;

use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::{debug, instrument};

use networkfs_common::crd::{
    EndpointStatus, ExportType, NetworkFSState, ShareManager, ShareManagerState,
};
use networkfs_common::Error;

use crate::status::{apply_status, mark_not_ready, REASON_SHARE_MANAGER_STOPPED};
use crate::Context;

/// Reconcile a ShareManager into its NetworkFilesystem
#[instrument(skip(sm, ctx), fields(share_manager = %sm.name_any()))]
pub async fn reconcile(sm: Arc<ShareManager>, ctx: Arc<Context>) -> Result<Action, Error> {
    if sm.is_deleting() {
        return Ok(Action::await_change());
    }
    if sm.state() != ShareManagerState::Stopped {
        debug!(state = ?sm.state(), "share process not stopped, nothing to do");
        return Ok(Action::await_change());
    }

    let name = sm.name_any();
    let nfs = ctx
        .kube
        .get_network_filesystem(&name)
        .await?
        .ok_or_else(|| Error::not_found("NetworkFilesystem", &name))?;

    if nfs.is_deleting() || nfs.state() == NetworkFSState::Disabled {
        return Ok(Action::await_change());
    }
    if !nfs.is_mid_disable() {
        debug!(
            state = %nfs.state(),
            desired_state = ?nfs.desired_state(),
            "share process stopped outside a disable, ignoring"
        );
        return Ok(Action::await_change());
    }

    let mut status = nfs.status_or_default();
    status.state = NetworkFSState::Disabled;
    status.export_type = ExportType::Nfs;
    status.endpoint_status = EndpointStatus::NotReady;
    status.endpoint.clear();
    status.mount_options.clear();
    mark_not_ready(
        &mut status.conditions,
        REASON_SHARE_MANAGER_STOPPED,
        "share manager stopped, export disabled",
    );

    apply_status(&ctx, &nfs, status).await?;
    Ok(Action::await_change())
}
