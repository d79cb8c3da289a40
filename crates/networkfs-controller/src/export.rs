//! Reading export addresses and shaping attachment tickets
//!
//! The storage subsystem publishes one Endpoints object per exported volume.
//! A usable export has exactly one subset with one address and one port named
//! `nfs`. Anything with more than one of those is a topology error.

use k8s_openapi::api::core::v1::{Endpoints, PersistentVolume};
use kube::ResourceExt;

use networkfs_common::crd::{
    AttachmentTicket, VolumeAttachmentSpec, ATTACHER_TYPE_CSI, ATTACHER_TYPE_SHARE_MANAGER,
};
use networkfs_common::{Error, NFS_OPTIONS_ATTRIBUTE, NFS_PORT_NAME};

/// Resolve the reachable export address of an Endpoints object
///
/// Returns `Ok(None)` while the export is not ready yet (no subsets, no
/// addresses, or no ports) and an error when the object has more than one
/// subset, address, or port, or its port is not named `nfs`.
pub fn resolve_export_address(endpoints: &Endpoints) -> Result<Option<String>, Error> {
    let name = endpoints.name_any();
    let subsets = endpoints.subsets.as_deref().unwrap_or_default();

    if subsets.len() > 1 {
        return Err(Error::topology(
            &name,
            format!("expected 1 subset, found {}", subsets.len()),
        ));
    }
    let Some(subset) = subsets.first() else {
        return Ok(None);
    };

    let addresses = subset.addresses.as_deref().unwrap_or_default();
    if addresses.len() > 1 {
        return Err(Error::topology(
            &name,
            format!("expected 1 address, found {}", addresses.len()),
        ));
    }

    let ports = subset.ports.as_deref().unwrap_or_default();
    if ports.len() > 1 {
        return Err(Error::topology(
            &name,
            format!("expected 1 port, found {}", ports.len()),
        ));
    }
    if let Some(port) = ports.first() {
        let port_name = port.name.as_deref().unwrap_or_default();
        if port_name != NFS_PORT_NAME {
            return Err(Error::topology(
                &name,
                format!("port is named {port_name:?}, expected {NFS_PORT_NAME:?}"),
            ));
        }
    }

    match (addresses.first(), ports.first()) {
        (Some(address), Some(_)) if !address.ip.is_empty() => Ok(Some(address.ip.clone())),
        _ => Ok(None),
    }
}

/// First address published by an Endpoints object, without validating its shape
pub fn first_address(endpoints: &Endpoints) -> Option<String> {
    endpoints
        .subsets
        .as_deref()?
        .first()?
        .addresses
        .as_deref()?
        .first()
        .map(|a| a.ip.clone())
        .filter(|ip| !ip.is_empty())
}

/// Ticket id the CSI attacher uses for a volume
pub fn csi_ticket_id(volume: &str) -> String {
    format!("csi-{volume}")
}

/// Ticket id the share manager controller uses for a volume
pub fn share_manager_ticket_id(volume: &str) -> String {
    format!("share-manager-controller-{volume}")
}

/// Attachment spec with both export tickets present
///
/// A ticket whose id already exists is left as it is. Tickets owned by other
/// components are never touched.
pub fn with_export_tickets(
    spec: &VolumeAttachmentSpec,
    volume: &str,
    node: &str,
) -> VolumeAttachmentSpec {
    let mut desired = spec.clone();
    for (id, attacher_type) in [
        (csi_ticket_id(volume), ATTACHER_TYPE_CSI),
        (share_manager_ticket_id(volume), ATTACHER_TYPE_SHARE_MANAGER),
    ] {
        desired
            .attachment_tickets
            .entry(id)
            .or_insert_with_key(|id| AttachmentTicket::frontend_enabled(id, attacher_type, node));
    }
    desired
}

/// Attachment spec with every ticket removed
pub fn without_tickets(spec: &VolumeAttachmentSpec) -> VolumeAttachmentSpec {
    VolumeAttachmentSpec {
        attachment_tickets: Default::default(),
        volume: spec.volume.clone(),
    }
}

/// Export options declared on the backing volume, empty when absent
pub fn mount_options(pv: Option<&PersistentVolume>) -> String {
    pv.and_then(|pv| pv.spec.as_ref())
        .and_then(|spec| spec.csi.as_ref())
        .and_then(|csi| csi.volume_attributes.as_ref())
        .and_then(|attrs| attrs.get(NFS_OPTIONS_ATTRIBUTE))
        .cloned()
        .unwrap_or_default()
}
