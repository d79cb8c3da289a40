//! Typed views of the Longhorn resources the reconcilers consume
//!
//! These CRDs are owned by Longhorn. Only the fields this manager reads or
//! writes are modelled; the CRD definitions themselves are never installed
//! from here.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Attacher type for the CSI data path ticket
pub const ATTACHER_TYPE_CSI: &str = "csi-attacher";

/// Attacher type for the share manager ticket
pub const ATTACHER_TYPE_SHARE_MANAGER: &str = "share-manager-controller";

/// Ticket parameter controlling whether the volume frontend is disabled
pub const PARAMETER_DISABLE_FRONTEND: &str = "disableFrontend";

/// ShareManager runs the NFS server for one RWX volume.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "longhorn.io",
    version = "v1beta2",
    kind = "ShareManager",
    namespaced,
    status = "ShareManagerStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ShareManagerSpec {
    /// Share manager image
    #[serde(default)]
    pub image: String,
}

/// Observed share manager state
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShareManagerStatus {
    /// Process state
    #[serde(default)]
    pub state: ShareManagerState,

    /// Node running the share manager
    #[serde(default, rename = "ownerID")]
    pub owner_id: String,

    /// NFS endpoint published by Longhorn
    #[serde(default)]
    pub endpoint: String,
}

/// Share manager process state
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ShareManagerState {
    /// Pod is being created
    Starting,
    /// NFS server is serving
    Running,
    /// Pod is being torn down
    Stopping,
    /// Fully stopped
    Stopped,
    /// Failed
    Error,
    /// Not yet reported, or a state this release does not know
    #[default]
    #[serde(other)]
    Unknown,
}

impl ShareManager {
    /// Current process state, `Unknown` when no status is present
    pub fn state(&self) -> ShareManagerState {
        self.status.as_ref().map(|s| s.state).unwrap_or_default()
    }

    /// True once the owner has asked for deletion
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }
}

/// VolumeAttachment mediates exclusive access to a Longhorn volume.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "longhorn.io",
    version = "v1beta2",
    kind = "VolumeAttachment",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct VolumeAttachmentSpec {
    /// Attachment requests keyed by ticket id
    #[serde(default)]
    pub attachment_tickets: BTreeMap<String, AttachmentTicket>,

    /// Name of the attached volume
    #[serde(default)]
    pub volume: String,
}

/// A single attachment request
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct AttachmentTicket {
    /// Ticket id, equal to its map key
    pub id: String,

    /// Which component requested the attachment
    #[serde(rename = "type")]
    pub attacher_type: String,

    /// Node the volume should attach to, empty to let Longhorn choose
    #[serde(rename = "nodeID", default)]
    pub node_id: String,

    /// Attacher specific parameters
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,

    /// Ticket generation, maintained by Longhorn
    #[serde(default, skip_serializing_if = "is_zero")]
    pub generation: i64,
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}

impl AttachmentTicket {
    /// Build a ticket that attaches the volume with its frontend enabled
    pub fn frontend_enabled(id: &str, attacher_type: &str, node_id: &str) -> Self {
        Self {
            id: id.to_string(),
            attacher_type: attacher_type.to_string(),
            node_id: node_id.to_string(),
            parameters: BTreeMap::from([(
                PARAMETER_DISABLE_FRONTEND.to_string(),
                "false".to_string(),
            )]),
            generation: 0,
        }
    }
}
