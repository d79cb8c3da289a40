//! Round trips across all three reconcilers against an in-memory API
//!
//! The fake API enforces resourceVersion preconditions the way the real API
//! server does, so lost updates and conflicting writers show up here.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Endpoints, PersistentVolume};
use kube::ResourceExt;

use networkfs_common::crd::{
    EndpointStatus, NetworkFSState, NetworkFilesystem, NetworkFilesystemStatus,
    ShareManagerState, VolumeAttachment, VolumeAttachmentSpec,
};
use networkfs_common::{Error, DEFAULT_NAMESPACE};

use crate::client::KubeClient;
use crate::export::fixtures::{endpoints, persistent_volume, ready_endpoints};
use crate::test_support::{conflict, share_manager, volume_attachment, VOLUME};
use crate::{endpoint, network_filesystem, Context};

use NetworkFSState::*;

#[derive(Default)]
struct World {
    next_version: u64,
    network_filesystems: BTreeMap<String, NetworkFilesystem>,
    endpoints: BTreeMap<String, Endpoints>,
    volumes: BTreeMap<String, PersistentVolume>,
    attachments: BTreeMap<String, VolumeAttachment>,
    status_writes: usize,
}

impl World {
    fn bump(&mut self) -> Option<String> {
        self.next_version += 1;
        Some(self.next_version.to_string())
    }
}

/// In-memory API with optimistic concurrency on every write
#[derive(Default)]
struct FakeKube {
    world: Mutex<World>,
}

impl FakeKube {
    fn with_volume() -> Arc<Self> {
        let fake = Self::default();
        {
            let mut world = fake.lock();
            world
                .volumes
                .insert(VOLUME.to_string(), persistent_volume(VOLUME, Some("vers=4.1")));
            let mut va = volume_attachment(VolumeAttachmentSpec {
                volume: VOLUME.to_string(),
                ..Default::default()
            });
            va.metadata.resource_version = world.bump();
            world.attachments.insert(VOLUME.to_string(), va);
        }
        Arc::new(fake)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, World> {
        self.world.lock().expect("mutex should not be poisoned")
    }

    fn network_filesystem(&self) -> NetworkFilesystem {
        self.lock()
            .network_filesystems
            .get(VOLUME)
            .cloned()
            .expect("network filesystem exists")
    }

    fn attachment(&self) -> VolumeAttachment {
        self.lock()
            .attachments
            .get(VOLUME)
            .cloned()
            .expect("attachment exists")
    }

    fn status_writes(&self) -> usize {
        self.lock().status_writes
    }

    /// An operator edits spec.desiredState
    fn set_desired(&self, desired: NetworkFSState) {
        let mut world = self.lock();
        let rv = world.bump();
        let nfs = world
            .network_filesystems
            .get_mut(VOLUME)
            .expect("network filesystem exists");
        nfs.spec.desired_state = Some(desired);
        nfs.metadata.resource_version = rv;
    }

    /// The storage subsystem publishes a new Endpoints object
    fn publish(&self, ep: Endpoints) {
        self.lock().endpoints.insert(ep.name_any(), ep);
    }

    fn current_endpoints(&self) -> Endpoints {
        self.lock()
            .endpoints
            .get(VOLUME)
            .cloned()
            .expect("endpoints published")
    }
}

#[async_trait]
impl KubeClient for FakeKube {
    async fn get_network_filesystem(
        &self,
        name: &str,
    ) -> Result<Option<NetworkFilesystem>, Error> {
        Ok(self.lock().network_filesystems.get(name).cloned())
    }

    async fn create_network_filesystem(&self, nfs: &NetworkFilesystem) -> Result<(), Error> {
        let mut world = self.lock();
        let name = nfs.name_any();
        if world.network_filesystems.contains_key(&name) {
            return Err(conflict());
        }
        let mut created = nfs.clone();
        created.metadata.resource_version = world.bump();
        world.network_filesystems.insert(name, created);
        Ok(())
    }

    async fn update_network_filesystem_status(
        &self,
        nfs: &NetworkFilesystem,
        status: &NetworkFilesystemStatus,
    ) -> Result<(), Error> {
        let mut world = self.lock();
        let rv = world.bump();
        let stored = world
            .network_filesystems
            .get_mut(&nfs.name_any())
            .ok_or_else(|| Error::not_found("NetworkFilesystem", nfs.name_any()))?;
        if stored.metadata.resource_version != nfs.metadata.resource_version {
            return Err(conflict());
        }
        stored.status = Some(status.clone());
        stored.metadata.resource_version = rv;
        world.status_writes += 1;
        Ok(())
    }

    async fn get_endpoints(&self, name: &str) -> Result<Option<Endpoints>, Error> {
        Ok(self.lock().endpoints.get(name).cloned())
    }

    async fn get_persistent_volume(&self, name: &str) -> Result<Option<PersistentVolume>, Error> {
        Ok(self.lock().volumes.get(name).cloned())
    }

    async fn get_volume_attachment(&self, name: &str) -> Result<Option<VolumeAttachment>, Error> {
        Ok(self.lock().attachments.get(name).cloned())
    }

    async fn replace_volume_attachment(&self, va: &VolumeAttachment) -> Result<(), Error> {
        let mut world = self.lock();
        let rv = world.bump();
        let stored = world
            .attachments
            .get_mut(&va.name_any())
            .ok_or_else(|| Error::not_found("VolumeAttachment", va.name_any()))?;
        if stored.metadata.resource_version != va.metadata.resource_version {
            return Err(conflict());
        }
        *stored = va.clone();
        stored.metadata.resource_version = rv;
        Ok(())
    }
}

fn context(fake: &Arc<FakeKube>) -> Arc<Context> {
    let kube: Arc<dyn KubeClient> = fake.clone();
    Arc::new(Context::for_testing(kube))
}

async fn lifecycle_pass(fake: &Arc<FakeKube>) -> Result<(), Error> {
    network_filesystem::reconcile(Arc::new(fake.network_filesystem()), context(fake)).await?;
    Ok(())
}

async fn address_pass(fake: &Arc<FakeKube>) -> Result<(), Error> {
    endpoint::reconcile(Arc::new(fake.current_endpoints()), context(fake)).await?;
    Ok(())
}

/// Story: a volume is exported, an operator enables it, the share process
/// comes up, and the export ends Enabled with its address and options.
#[tokio::test]
async fn story_full_enable_round_trip() {
    let fake = FakeKube::with_volume();

    // Export appears without an address: auto-provisioned, Disabled
    fake.publish(endpoints(VOLUME, vec![]));
    address_pass(&fake).await.expect("provision");
    let nfs = fake.network_filesystem();
    assert_eq!(nfs.state(), Disabled);
    assert_eq!(nfs.namespace().as_deref(), Some(DEFAULT_NAMESPACE));

    // Operator enables: tickets requested, Enabling
    fake.set_desired(Enabled);
    lifecycle_pass(&fake).await.expect("enable");
    assert_eq!(fake.network_filesystem().state(), Enabling);
    let tickets = fake.attachment().spec.attachment_tickets;
    assert!(tickets.contains_key("csi-pvc-0b5d3c2a"));
    assert!(tickets.contains_key("share-manager-controller-pvc-0b5d3c2a"));

    // Share process publishes its address
    fake.publish(ready_endpoints(VOLUME, "10.52.0.12"));
    address_pass(&fake).await.expect("address");
    let status = fake.network_filesystem().status_or_default();
    assert_eq!(status.state, Enabling);
    assert_eq!(status.endpoint, "10.52.0.12");

    // Lifecycle completes the enable
    lifecycle_pass(&fake).await.expect("complete enable");
    let status = fake.network_filesystem().status_or_default();
    assert_eq!(status.state, Enabled);
    assert_eq!(status.endpoint_status, EndpointStatus::Ready);
    assert_eq!(status.mount_options, "vers=4.1");

    // Steady state: nothing further is written
    let writes = fake.status_writes();
    lifecycle_pass(&fake).await.expect("steady lifecycle");
    address_pass(&fake).await.expect("steady address");
    assert_eq!(fake.status_writes(), writes);
}

/// Story: an Enabled export is disabled. Attachment is released, the share
/// process stops, and the export ends Disabled with no address.
#[tokio::test]
async fn story_full_disable_round_trip() {
    let fake = FakeKube::with_volume();
    fake.publish(ready_endpoints(VOLUME, "10.52.0.12"));
    address_pass(&fake).await.expect("provision");
    fake.set_desired(Enabled);
    lifecycle_pass(&fake).await.expect("enable");
    assert_eq!(fake.network_filesystem().state(), Enabled);

    fake.set_desired(Disabled);
    lifecycle_pass(&fake).await.expect("disable");
    assert_eq!(fake.network_filesystem().state(), Disabling);
    assert!(fake.attachment().spec.attachment_tickets.is_empty());

    // A share process that is merely stopping changes nothing
    crate::share_manager::reconcile(
        Arc::new(share_manager(ShareManagerState::Stopping)),
        context(&fake),
    )
    .await
    .expect("stopping");
    assert_eq!(fake.network_filesystem().state(), Disabling);

    crate::share_manager::reconcile(
        Arc::new(share_manager(ShareManagerState::Stopped)),
        context(&fake),
    )
    .await
    .expect("stopped");
    let status = fake.network_filesystem().status_or_default();
    assert_eq!(status.state, Disabled);
    assert_eq!(status.endpoint, "");
    assert_eq!(status.endpoint_status, EndpointStatus::NotReady);

    // Re-enabling from Disabled is allowed
    fake.set_desired(Enabled);
    lifecycle_pass(&fake).await.expect("re-enable");
    assert_eq!(fake.network_filesystem().state(), Enabled);
}

/// Story: two reconcilers read the same version. The one that writes second
/// is rejected instead of overwriting the first.
#[tokio::test]
async fn story_stale_writer_loses() {
    let fake = FakeKube::with_volume();
    fake.publish(endpoints(VOLUME, vec![]));
    address_pass(&fake).await.expect("provision");
    fake.set_desired(Enabled);

    let stale = Arc::new(fake.network_filesystem());
    lifecycle_pass(&fake).await.expect("first writer");
    let winner = fake.network_filesystem().status_or_default();

    fake.publish(ready_endpoints(VOLUME, "10.52.0.12"));
    let err = network_filesystem::reconcile(stale, context(&fake))
        .await
        .expect_err("stale snapshot must not win");

    assert!(err.is_conflict());
    assert_eq!(fake.network_filesystem().status_or_default(), winner);

    // A fresh read succeeds
    lifecycle_pass(&fake).await.expect("retry");
    assert_eq!(fake.network_filesystem().state(), Enabled);
}

/// Story: the same export shows up twice before the cache catches up. The
/// second create conflicts and the first resource survives.
#[tokio::test]
async fn story_duplicate_provisioning_conflicts() {
    let fake = FakeKube::with_volume();
    fake.publish(ready_endpoints(VOLUME, "10.0.0.1"));
    address_pass(&fake).await.expect("provision");

    let err = fake
        .create_network_filesystem(&NetworkFilesystem::provisioned(
            VOLUME,
            DEFAULT_NAMESPACE,
            None,
        ))
        .await
        .expect_err("duplicate create");
    assert!(err.is_conflict());
    assert_eq!(fake.network_filesystem().status_or_default().endpoint, "10.0.0.1");
}

/// Story: the share process stops before the disable is recorded. The early
/// stop is ignored, and the same stopped share manager delivered again once
/// the export is Disabling completes the disable.
#[tokio::test]
async fn story_stop_seen_before_disabling_completes_on_redelivery() {
    let fake = FakeKube::with_volume();
    fake.publish(ready_endpoints(VOLUME, "10.52.0.12"));
    address_pass(&fake).await.expect("provision");
    fake.set_desired(Enabled);
    lifecycle_pass(&fake).await.expect("enable");

    fake.set_desired(Disabled);
    let stopped = Arc::new(share_manager(ShareManagerState::Stopped));
    crate::share_manager::reconcile(stopped.clone(), context(&fake))
        .await
        .expect("early stop");
    assert_eq!(fake.network_filesystem().state(), Enabled);

    lifecycle_pass(&fake).await.expect("disable");
    assert_eq!(fake.network_filesystem().state(), Disabling);

    crate::share_manager::reconcile(stopped, context(&fake))
        .await
        .expect("redelivered stop");
    assert_eq!(fake.network_filesystem().state(), Disabled);
}

/// Story: the create of an auto-provisioned export landed without its
/// status. The next address pass seeds Disabled, and a later disable
/// request is a fixed point rather than a wait on the share process.
#[tokio::test]
async fn story_half_provisioned_export_is_repaired() {
    let fake = FakeKube::with_volume();
    let mut bare = NetworkFilesystem::provisioned(VOLUME, DEFAULT_NAMESPACE, None);
    bare.status = None;
    fake.create_network_filesystem(&bare).await.expect("bare create");
    assert_eq!(fake.network_filesystem().state(), Unknown);

    fake.publish(ready_endpoints(VOLUME, "10.52.0.12"));
    address_pass(&fake).await.expect("seed");
    let status = fake.network_filesystem().status_or_default();
    assert_eq!(status.state, Disabled);
    assert_eq!(status.endpoint, "10.52.0.12");

    fake.set_desired(Disabled);
    let writes = fake.status_writes();
    lifecycle_pass(&fake).await.expect("already disabled");
    assert_eq!(fake.network_filesystem().state(), Disabled);
    assert_eq!(fake.status_writes(), writes);
}
