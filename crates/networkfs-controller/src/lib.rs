//! Reconcilers for the network filesystem manager
//!
//! Three independent reconcilers keep NetworkFilesystem status in line with
//! what the storage subsystem reports:
//!
//! - [`network_filesystem`] drives a NetworkFilesystem toward its desired
//!   state by requesting or releasing volume attachment.
//! - [`endpoint`] follows export addresses and auto-provisions a
//!   NetworkFilesystem for every newly exported volume.
//! - [`share_manager`] completes a disable once the share process stopped.
//!
//! All of them write through one status path that refuses unsanctioned state
//! transitions and skips writes that would change nothing.

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use tracing::{error, warn};

pub mod client;
pub mod context;
pub mod endpoint;
pub mod export;
pub mod network_filesystem;
pub mod share_manager;
mod status;

#[cfg(test)]
mod test_support;
#[cfg(test)]
mod tests;

pub use client::{KubeClient, KubeClientImpl};
pub use context::{Context, ContextBuilder};
pub use networkfs_common::Error;
pub use status::{
    REASON_ENDPOINT_CHANGED, REASON_ENDPOINT_NOT_READY, REASON_ENDPOINT_READY,
    REASON_SHARE_MANAGER_STOPPED,
};

/// Requeue delay after a write lost an optimistic-concurrency race
pub const CONFLICT_REQUEUE: Duration = Duration::from_secs(1);

/// Requeue delay after any other retryable failure
pub const ERROR_REQUEUE: Duration = Duration::from_secs(5);

/// Decide how a failed reconcile is retried
///
/// Conflicts are retried quickly against fresh state. Errors that only a
/// change to the observed objects can fix wait for the next event.
pub fn error_policy<K>(obj: Arc<K>, error: &Error, _ctx: Arc<Context>) -> Action
where
    K: Resource<DynamicType = ()>,
{
    let kind = K::kind(&());
    let name = obj.name_any();

    if error.is_conflict() {
        warn!(%kind, %name, %error, "write conflict, retrying with fresh state");
        return Action::requeue(CONFLICT_REQUEUE);
    }
    if error.is_retryable() {
        error!(%kind, %name, ?error, "reconciliation failed");
        return Action::requeue(ERROR_REQUEUE);
    }
    warn!(%kind, %name, %error, "reconciliation failed, waiting for a change");
    Action::await_change()
}
