//! Common types for the network filesystem manager: CRDs, errors, and utilities

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod leader_election;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Default namespace holding NetworkFilesystem resources and the leader lease
pub const DEFAULT_NAMESPACE: &str = "harvester-system";

/// Namespace of the Longhorn storage subsystem
pub const LONGHORN_NAMESPACE: &str = "longhorn-system";

/// Name prefix marking an Endpoints object as a volume export
pub const EXPORT_ENDPOINT_PREFIX: &str = "pvc-";

/// Port name the export endpoint must publish
pub const NFS_PORT_NAME: &str = "nfs";

/// Volume attribute holding the declared NFS export options
pub const NFS_OPTIONS_ATTRIBUTE: &str = "nfsOptions";

/// Field manager used for all writes made by the reconcilers
pub const FIELD_MANAGER: &str = "networkfs-manager";

/// True when an Endpoints name marks it as a volume export
pub fn is_export_endpoint(name: &str) -> bool {
    name.starts_with(EXPORT_ENDPOINT_PREFIX)
}
