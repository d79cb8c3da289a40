//! NetworkFilesystem CRD: one exported volume and its lifecycle state

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::Condition;

/// NetworkFilesystem declares whether a replicated volume should be exported
/// over NFS to consumers outside the cluster.
///
/// Example:
/// ```yaml
/// apiVersion: harvesterhci.io/v1beta1
/// kind: NetworkFilesystem
/// metadata:
///   name: pvc-5e1f6a3c
///   namespace: harvester-system
/// spec:
///   networkFSName: pvc-5e1f6a3c
///   desiredState: Enabled
///   preferredNode: node-1
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "harvesterhci.io",
    version = "v1beta1",
    kind = "NetworkFilesystem",
    namespaced,
    status = "NetworkFilesystemStatus",
    derive = "PartialEq",
    shortname = "netfilesystem",
    shortname = "netfilesystems",
    printcolumn = r#"{"name":"DesiredState","type":"string","jsonPath":".spec.desiredState"}"#,
    printcolumn = r#"{"name":"Endpoint","type":"string","jsonPath":".status.endpoint"}"#,
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Type","type":"string","jsonPath":".status.type"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NetworkFilesystemSpec {
    /// Name of the volume whose export this resource controls
    #[serde(rename = "networkFSName")]
    pub network_fs_name: String,

    /// Operator intent. Unset on auto-provisioned resources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_state: Option<NetworkFSState>,

    /// Node hint passed through to attachment tickets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_node: Option<String>,
}

/// Lifecycle phase of an export
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum NetworkFSState {
    /// Export is reachable
    Enabled,
    /// Attachment requested, waiting for a reachable address
    Enabling,
    /// Attachment released, waiting for the share process to stop
    Disabling,
    /// Export is off
    Disabled,
    /// Initial state
    #[default]
    Unknown,
}

impl NetworkFSState {
    /// Whether a reconciler may move a resource from `self` to `next` in one step
    pub fn can_transition_to(self, next: NetworkFSState) -> bool {
        use NetworkFSState::*;

        if self == next {
            return true;
        }
        match self {
            Unknown => matches!(next, Enabling | Enabled | Disabling | Disabled),
            Disabled => matches!(next, Enabling | Enabled),
            Enabling => matches!(next, Enabled | Disabling),
            Enabled => matches!(next, Enabling | Disabling),
            Disabling => matches!(next, Disabled | Enabling | Enabled),
        }
    }
}

impl std::fmt::Display for NetworkFSState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Enabled => write!(f, "Enabled"),
            Self::Enabling => write!(f, "Enabling"),
            Self::Disabling => write!(f, "Disabling"),
            Self::Disabled => write!(f, "Disabled"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Reachability of the export address
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum EndpointStatus {
    /// The export has a reachable address
    Ready,
    /// No reachable address
    #[default]
    NotReady,
}

/// Export protocol
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ExportType {
    /// NFS, the only protocol supported by this release
    #[default]
    #[serde(rename = "NFS")]
    Nfs,
    /// Unrecognized protocol
    Unknown,
}

/// Observed state of a NetworkFilesystem, owned by the reconcilers
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkFilesystemStatus {
    /// Last known reachable address, empty when not ready
    #[serde(default)]
    pub endpoint: String,

    /// Current lifecycle phase
    #[serde(default = "default_state")]
    pub state: NetworkFSState,

    /// Export protocol
    #[serde(rename = "type", default)]
    pub export_type: ExportType,

    /// Last observed address reachability
    #[serde(rename = "status", default)]
    pub endpoint_status: EndpointStatus,

    /// Export options copied from the backing volume
    #[serde(rename = "mountOpts", default)]
    pub mount_options: String,

    /// Conditions, unique by type
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

fn default_state() -> NetworkFSState {
    NetworkFSState::Disabled
}

impl Default for NetworkFilesystemStatus {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            state: default_state(),
            export_type: ExportType::Nfs,
            endpoint_status: EndpointStatus::NotReady,
            mount_options: String::new(),
            conditions: Vec::new(),
        }
    }
}

impl NetworkFilesystem {
    /// Current lifecycle state, `Unknown` when no status has been written yet
    pub fn state(&self) -> NetworkFSState {
        self.status
            .as_ref()
            .map(|s| s.state)
            .unwrap_or(NetworkFSState::Unknown)
    }

    /// Operator intent
    pub fn desired_state(&self) -> Option<NetworkFSState> {
        self.spec.desired_state
    }

    /// True once the owner has asked for deletion
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// True when the observed state already matches intent
    pub fn at_desired_state(&self) -> bool {
        self.desired_state() == Some(self.state())
    }

    /// True while a disable is in flight
    pub fn is_mid_disable(&self) -> bool {
        self.desired_state() == Some(NetworkFSState::Disabled)
            && self.state() == NetworkFSState::Disabling
    }

    /// Copy of the current status to be modified, or the defaults when none exists
    pub fn status_or_default(&self) -> NetworkFilesystemStatus {
        self.status.clone().unwrap_or_default()
    }

    /// Build the auto-provisioned resource for a newly discovered export
    pub fn provisioned(name: &str, namespace: &str, endpoint: Option<String>) -> Self {
        let mut nfs = NetworkFilesystem::new(
            name,
            NetworkFilesystemSpec {
                network_fs_name: name.to_string(),
                desired_state: None,
                preferred_node: None,
            },
        );
        nfs.metadata.namespace = Some(namespace.to_string());
        nfs.status = Some(NetworkFilesystemStatus {
            endpoint: endpoint.unwrap_or_default(),
            state: NetworkFSState::Disabled,
            ..Default::default()
        });
        nfs
    }
}
