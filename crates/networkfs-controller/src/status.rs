//! The single path through which reconcilers write NetworkFilesystem status

use kube::ResourceExt;
use tracing::{debug, info};

use networkfs_common::crd::{
    upsert_condition, Condition, ConditionStatus, NetworkFilesystem, NetworkFilesystemStatus,
    CONDITION_ENDPOINT_CHANGED, CONDITION_NOT_READY, CONDITION_READY,
};
use networkfs_common::Error;

use crate::Context;

/// Reason published when the export address is reachable
pub const REASON_ENDPOINT_READY: &str = "EndpointReady";
/// Reason published when the export has no reachable address
pub const REASON_ENDPOINT_NOT_READY: &str = "EndpointNotReady";
/// Reason published when the export moved to another address
pub const REASON_ENDPOINT_CHANGED: &str = "EndpointChanged";
/// Reason published when the share process stopped at the end of a disable
pub const REASON_SHARE_MANAGER_STOPPED: &str = "ShareManagerStopped";

/// Write `status` for `nfs` if it differs from what was observed
///
/// Refuses state changes outside the transition table. Returns whether a
/// write was issued.
pub(crate) async fn apply_status(
    ctx: &Context,
    nfs: &NetworkFilesystem,
    status: NetworkFilesystemStatus,
) -> Result<bool, Error> {
    let name = nfs.name_any();

    if nfs.status.as_ref() == Some(&status) {
        debug!(network_filesystem = %name, "status unchanged, skipping write");
        return Ok(false);
    }

    let from = nfs.state();
    if !from.can_transition_to(status.state) {
        return Err(Error::InvalidTransition {
            name,
            from: from.to_string(),
            to: status.state.to_string(),
        });
    }

    ctx.kube.update_network_filesystem_status(nfs, &status).await?;
    info!(
        network_filesystem = %name,
        from = %from,
        to = %status.state,
        endpoint = %status.endpoint,
        "status updated"
    );
    Ok(true)
}

/// Record that the export is reachable
///
/// A stale `NotReady` condition is flipped to False so the list never claims
/// both at once.
pub(crate) fn mark_ready(conditions: &mut Vec<Condition>, address: &str) {
    upsert_condition(
        conditions,
        Condition::new(
            CONDITION_READY,
            ConditionStatus::True,
            REASON_ENDPOINT_READY,
            format!("export is reachable at {address}"),
        ),
    );
    clear_if_present(conditions, CONDITION_NOT_READY, REASON_ENDPOINT_READY);
}

/// Record that the export moved from `previous` to `address`
pub(crate) fn mark_endpoint_changed(
    conditions: &mut Vec<Condition>,
    previous: &str,
    address: &str,
) {
    upsert_condition(
        conditions,
        Condition::new(
            CONDITION_ENDPOINT_CHANGED,
            ConditionStatus::True,
            REASON_ENDPOINT_CHANGED,
            format!("endpoint changed from {previous} to {address}"),
        ),
    );
    clear_if_present(conditions, CONDITION_NOT_READY, REASON_ENDPOINT_CHANGED);
}

/// Record that the export has no reachable address
pub(crate) fn mark_not_ready(conditions: &mut Vec<Condition>, reason: &str, message: &str) {
    upsert_condition(
        conditions,
        Condition::new(CONDITION_NOT_READY, ConditionStatus::True, reason, message),
    );
    clear_if_present(conditions, CONDITION_READY, reason);
}

fn clear_if_present(conditions: &mut Vec<Condition>, type_: &str, reason: &str) {
    let Some(existing) = conditions.iter().find(|c| c.type_ == type_) else {
        return;
    };
    let message = existing.message.clone();
    upsert_condition(
        conditions,
        Condition::new(type_, ConditionStatus::False, reason, message),
    );
}
