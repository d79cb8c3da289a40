//! Custom Resource Definitions used by the network filesystem manager
//!
//! `NetworkFilesystem` is owned by this manager. The Longhorn kinds are
//! foreign and modelled only as far as the reconcilers read or write them.

mod longhorn;
mod network_filesystem;
mod types;

pub use longhorn::{
    AttachmentTicket, ShareManager, ShareManagerSpec, ShareManagerState, ShareManagerStatus,
    VolumeAttachment, VolumeAttachmentSpec, ATTACHER_TYPE_CSI, ATTACHER_TYPE_SHARE_MANAGER,
    PARAMETER_DISABLE_FRONTEND,
};
pub use network_filesystem::{
    EndpointStatus, ExportType, NetworkFSState, NetworkFilesystem, NetworkFilesystemSpec,
    NetworkFilesystemStatus,
};
pub use types::{
    upsert_condition, Condition, ConditionStatus, CONDITION_ENDPOINT_CHANGED,
    CONDITION_NOT_READY, CONDITION_READY,
};
