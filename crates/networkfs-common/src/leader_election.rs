//! Single active writer admission using Kubernetes Leases
//!
//! The reconcilers assume exactly one manager instance writes at a time.
//! That exclusivity is obtained here, once, and handed to the controller
//! runner as a [`LeaderGuard`]. Nothing in the reconcilers knows about it.
//!
//! # Atomicity
//!
//! Every lease write carries the resourceVersion that was read. If the lease
//! changed in between, the API server answers 409 Conflict and the attempt
//! counts as "not acquired".

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{MicroTime, ObjectMeta};
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::Client;
use serde_json::json;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{Error, FIELD_MANAGER};

/// Lease name shared by all manager replicas
pub const LEADER_LEASE_NAME: &str = "harvester-network-fs-manager";

const LEASE_DURATION: Duration = Duration::from_secs(30);
const RENEW_INTERVAL: Duration = Duration::from_secs(10);
const RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Outcome of one acquire/renew attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Held,
    NotHeld,
}

/// Leader elector backed by a coordination.k8s.io/v1 Lease
pub struct LeaderElector {
    client: Client,
    lease_name: String,
    namespace: String,
    identity: String,
    lease_duration: Duration,
    renew_interval: Duration,
    retry_interval: Duration,
}

impl LeaderElector {
    /// Create an elector with default timing (30s lease, 10s renew, 5s retry)
    pub fn new(client: Client, lease_name: &str, namespace: &str, identity: &str) -> Self {
        Self {
            client,
            lease_name: lease_name.to_string(),
            namespace: namespace.to_string(),
            identity: identity.to_string(),
            lease_duration: LEASE_DURATION,
            renew_interval: RENEW_INTERVAL,
            retry_interval: RETRY_INTERVAL,
        }
    }

    /// Block until the lease is held, then return the guard that keeps it
    pub async fn acquire(self: Arc<Self>) -> Result<LeaderGuard, Error> {
        info!(
            identity = %self.identity,
            lease = %self.lease_name,
            namespace = %self.namespace,
            "Waiting for leadership..."
        );

        loop {
            match self.try_acquire_or_renew().await {
                Ok(Attempt::Held) => {
                    info!(identity = %self.identity, "Leadership acquired");
                    return Ok(self.create_guard());
                }
                Ok(Attempt::NotHeld) => {
                    debug!(
                        identity = %self.identity,
                        retry_secs = self.retry_interval.as_secs(),
                        "Lease held by another, waiting..."
                    );
                }
                Err(e) => {
                    warn!(
                        identity = %self.identity,
                        error = %e,
                        retry_secs = self.retry_interval.as_secs(),
                        "Failed to acquire lease, retrying..."
                    );
                }
            }
            tokio::time::sleep(self.retry_interval).await;
        }
    }

    fn create_guard(self: &Arc<Self>) -> LeaderGuard {
        let (lost_tx, lost_rx) = oneshot::channel();
        let elector = Arc::clone(self);
        let renewal_task = tokio::spawn(async move {
            elector.renewal_loop(lost_tx).await;
        });

        LeaderGuard {
            elector: Arc::clone(self),
            renewal_task,
            lost_rx: Some(lost_rx),
        }
    }

    async fn try_acquire_or_renew(&self) -> Result<Attempt, Error> {
        let api: Api<Lease> = Api::namespaced(self.client.clone(), &self.namespace);
        let now = Utc::now();

        let Some(lease) = api.get_opt(&self.lease_name).await? else {
            return self.create_lease(&api, now).await;
        };

        let spec = lease.spec.as_ref();
        let holder = spec.and_then(|s| s.holder_identity.as_deref());

        if holder == Some(self.identity.as_str()) {
            let mut renewed = lease.clone();
            if let Some(spec) = renewed.spec.as_mut() {
                spec.renew_time = Some(MicroTime(now));
            }
            return self.replace_lease(&api, &renewed, "renewed").await;
        }

        let expired = match (
            spec.and_then(|s| s.renew_time.as_ref()),
            spec.and_then(|s| s.lease_duration_seconds),
        ) {
            (Some(renewed_at), Some(secs)) => {
                now > renewed_at.0 + chrono::Duration::seconds(i64::from(secs))
            }
            _ => true,
        };
        if !expired {
            return Ok(Attempt::NotHeld);
        }

        let transitions = spec.and_then(|s| s.lease_transitions).unwrap_or(0) + 1;
        let mut taken = lease.clone();
        taken.spec = Some(self.lease_spec(now, transitions));
        self.replace_lease(&api, &taken, "took over expired lease")
            .await
    }

    fn lease_spec(&self, now: chrono::DateTime<Utc>, transitions: i32) -> LeaseSpec {
        LeaseSpec {
            holder_identity: Some(self.identity.clone()),
            lease_duration_seconds: Some(self.lease_duration.as_secs() as i32),
            acquire_time: Some(MicroTime(now)),
            renew_time: Some(MicroTime(now)),
            lease_transitions: Some(transitions),
            ..Default::default()
        }
    }

    async fn create_lease(
        &self,
        api: &Api<Lease>,
        now: chrono::DateTime<Utc>,
    ) -> Result<Attempt, Error> {
        let lease = Lease {
            metadata: ObjectMeta {
                name: Some(self.lease_name.clone()),
                namespace: Some(self.namespace.clone()),
                ..Default::default()
            },
            spec: Some(self.lease_spec(now, 0)),
        };

        match api.create(&PostParams::default(), &lease).await {
            Ok(_) => {
                info!(identity = %self.identity, "Created new lease");
                Ok(Attempt::Held)
            }
            Err(kube::Error::Api(e)) if e.code == 409 => {
                debug!(identity = %self.identity, "Lease creation conflict, will retry");
                Ok(Attempt::NotHeld)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the lease, keeping the resourceVersion that was read
    async fn replace_lease(
        &self,
        api: &Api<Lease>,
        lease: &Lease,
        what: &str,
    ) -> Result<Attempt, Error> {
        if lease.metadata.resource_version.is_none() {
            return Err(Error::internal_with_context(
                "leader-election",
                "lease missing resourceVersion",
            ));
        }

        match api
            .replace(&self.lease_name, &PostParams::default(), lease)
            .await
        {
            Ok(_) => {
                debug!(identity = %self.identity, action = what, "Lease written");
                Ok(Attempt::Held)
            }
            Err(kube::Error::Api(e)) if e.code == 409 => {
                debug!(identity = %self.identity, "Lease write conflict");
                Ok(Attempt::NotHeld)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn renewal_loop(&self, lost_tx: oneshot::Sender<()>) {
        loop {
            tokio::time::sleep(self.renew_interval).await;

            match self.try_acquire_or_renew().await {
                Ok(Attempt::Held) => {}
                Ok(Attempt::NotHeld) | Err(_) => {
                    warn!(identity = %self.identity, "Leadership lost");
                    let _ = lost_tx.send(());
                    return;
                }
            }
        }
    }

    /// Clear the holder so a standby can take over without waiting for expiry
    async fn release_lease(&self) -> Result<(), Error> {
        let api: Api<Lease> = Api::namespaced(self.client.clone(), &self.namespace);

        let Some(lease) = api.get_opt(&self.lease_name).await? else {
            debug!(identity = %self.identity, "Lease not found, nothing to release");
            return Ok(());
        };

        let holder = lease.spec.as_ref().and_then(|s| s.holder_identity.as_deref());
        if holder != Some(self.identity.as_str()) {
            debug!(identity = %self.identity, "Not the lease holder, nothing to release");
            return Ok(());
        }

        let past = Utc::now() - chrono::Duration::seconds(60);
        let patch = json!({
            "metadata": { "resourceVersion": lease.metadata.resource_version },
            "spec": {
                "holderIdentity": null,
                "renewTime": past.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
            }
        });

        api.patch(
            &self.lease_name,
            &PatchParams {
                field_manager: Some(FIELD_MANAGER.to_string()),
                ..Default::default()
            },
            &Patch::Merge(&patch),
        )
        .await?;

        info!(identity = %self.identity, "Lease released for fast failover");
        Ok(())
    }
}

/// Exclusive capability to run the reconcilers
///
/// While the guard lives, the lease is renewed in the background. `lost()`
/// resolves when renewal fails. Dropping the guard stops renewal.
pub struct LeaderGuard {
    elector: Arc<LeaderElector>,
    renewal_task: JoinHandle<()>,
    lost_rx: Option<oneshot::Receiver<()>>,
}

impl LeaderGuard {
    /// Identity holding the lease
    pub fn identity(&self) -> &str {
        &self.elector.identity
    }

    /// Wait until leadership is lost
    pub async fn lost(&mut self) {
        if let Some(rx) = self.lost_rx.take() {
            let _ = rx.await;
        }
    }

    /// Give up leadership during graceful shutdown
    pub async fn release_leadership(&self) -> Result<(), Error> {
        self.renewal_task.abort();
        self.elector.release_lease().await
    }
}

impl Drop for LeaderGuard {
    fn drop(&mut self) {
        self.renewal_task.abort();
        info!(identity = %self.elector.identity, "Leadership released");
    }
}
