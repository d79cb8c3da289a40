//! Builders and mock helpers shared by the reconciler tests

use std::sync::{Arc, Mutex};

use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

use networkfs_common::crd::{
    EndpointStatus, NetworkFSState, NetworkFilesystem, NetworkFilesystemSpec,
    NetworkFilesystemStatus, ShareManager, ShareManagerSpec, ShareManagerState,
    ShareManagerStatus, VolumeAttachment, VolumeAttachmentSpec,
};
use networkfs_common::{Error, DEFAULT_NAMESPACE, LONGHORN_NAMESPACE};

use crate::client::MockKubeClient;
use crate::Context;

pub const VOLUME: &str = "pvc-0b5d3c2a";

/// A NetworkFilesystem with the given intent and observed state
pub fn nfs(desired: Option<NetworkFSState>, state: Option<NetworkFSState>) -> NetworkFilesystem {
    let mut nfs = NetworkFilesystem::new(
        VOLUME,
        NetworkFilesystemSpec {
            network_fs_name: VOLUME.to_string(),
            desired_state: desired,
            preferred_node: None,
        },
    );
    nfs.metadata.namespace = Some(DEFAULT_NAMESPACE.to_string());
    nfs.metadata.resource_version = Some("1".to_string());
    nfs.status = state.map(|state| NetworkFilesystemStatus {
        state,
        ..Default::default()
    });
    nfs
}

/// An Enabled export serving at `address`
pub fn enabled_nfs(address: &str) -> NetworkFilesystem {
    let mut nfs = nfs(Some(NetworkFSState::Enabled), Some(NetworkFSState::Enabled));
    if let Some(status) = nfs.status.as_mut() {
        status.endpoint = address.to_string();
        status.endpoint_status = EndpointStatus::Ready;
    }
    nfs
}

pub fn deleting<K: kube::Resource>(mut obj: K) -> K {
    obj.meta_mut().deletion_timestamp = Some(Time(Utc::now()));
    obj
}

pub fn share_manager(state: ShareManagerState) -> ShareManager {
    let mut sm = ShareManager::new(VOLUME, ShareManagerSpec::default());
    sm.metadata.namespace = Some(LONGHORN_NAMESPACE.to_string());
    sm.status = Some(ShareManagerStatus {
        state,
        ..Default::default()
    });
    sm
}

pub fn volume_attachment(spec: VolumeAttachmentSpec) -> VolumeAttachment {
    let mut va = VolumeAttachment::new(VOLUME, spec);
    va.metadata.namespace = Some(LONGHORN_NAMESPACE.to_string());
    va.metadata.resource_version = Some("7".to_string());
    va
}

pub fn conflict() -> Error {
    Error::from(kube::Error::Api(kube::error::ErrorResponse {
        status: "Failure".to_string(),
        message: "the object has been modified".to_string(),
        reason: "Conflict".to_string(),
        code: 409,
    }))
}

/// Records every write a reconciler issues
#[derive(Clone, Default)]
pub struct WriteCapture {
    statuses: Arc<Mutex<Vec<NetworkFilesystemStatus>>>,
    attachments: Arc<Mutex<Vec<VolumeAttachmentSpec>>>,
    created: Arc<Mutex<Vec<NetworkFilesystem>>>,
}

impl WriteCapture {
    pub fn statuses(&self) -> Vec<NetworkFilesystemStatus> {
        self.statuses
            .lock()
            .expect("mutex should not be poisoned")
            .clone()
    }

    pub fn last_status(&self) -> Option<NetworkFilesystemStatus> {
        self.statuses().last().cloned()
    }

    pub fn attachments(&self) -> Vec<VolumeAttachmentSpec> {
        self.attachments
            .lock()
            .expect("mutex should not be poisoned")
            .clone()
    }

    pub fn created(&self) -> Vec<NetworkFilesystem> {
        self.created
            .lock()
            .expect("mutex should not be poisoned")
            .clone()
    }

    pub fn nothing_written(&self) -> bool {
        self.statuses().is_empty() && self.attachments().is_empty() && self.created().is_empty()
    }

    /// Wire the write expectations of `mock` into this capture
    pub fn attach(&self, mock: &mut MockKubeClient) {
        let statuses = self.statuses.clone();
        mock.expect_update_network_filesystem_status()
            .returning(move |_, status| {
                statuses
                    .lock()
                    .expect("mutex should not be poisoned")
                    .push(status.clone());
                Ok(())
            });

        let attachments = self.attachments.clone();
        mock.expect_replace_volume_attachment().returning(move |va| {
            attachments
                .lock()
                .expect("mutex should not be poisoned")
                .push(va.spec.clone());
            Ok(())
        });

        let created = self.created.clone();
        mock.expect_create_network_filesystem().returning(move |nfs| {
            created
                .lock()
                .expect("mutex should not be poisoned")
                .push(nfs.clone());
            Ok(())
        });
    }
}

/// Wrap a configured mock into a context, capturing every write
pub fn context_with_capture(mut mock: MockKubeClient) -> (Arc<Context>, WriteCapture) {
    let capture = WriteCapture::default();
    capture.attach(&mut mock);
    (Arc::new(Context::for_testing(Arc::new(mock))), capture)
}
