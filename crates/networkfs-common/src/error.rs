//! Error types for the network filesystem manager
//!
//! Errors carry the name of the resource being reconciled so a failure can be
//! traced back to one export. Classification helpers decide how the
//! controller error policies requeue.

use thiserror::Error;

/// HTTP status returned by the API server when a write carries a stale resourceVersion
const CONFLICT: u16 = 409;

/// HTTP status for a missing resource
const NOT_FOUND: u16 = 404;

/// Main error type for reconciliation
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// A resource the reconciler depends on does not exist
    #[error("{kind} {name} not found")]
    NotFound {
        /// Resource kind (e.g. "NetworkFilesystem", "VolumeAttachment")
        kind: String,
        /// Name of the missing resource
        name: String,
    },

    /// The export endpoint does not have the single subset/address/port shape
    #[error("invalid export topology for {name}: {message}")]
    Topology {
        /// Name of the endpoint object
        name: String,
        /// What was wrong with it
        message: String,
    },

    /// A computed status would move the state along an unsanctioned edge
    #[error("refusing transition of {name} from {from} to {to}")]
    InvalidTransition {
        /// Name of the network filesystem
        name: String,
        /// Observed state
        from: String,
        /// Computed state
        to: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Where the error occurred (e.g. "leader-election", "runner")
        context: String,
    },
}

impl Error {
    /// Create a not-found error for the given kind and name
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a topology error for the named endpoint
    pub fn topology(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Topology {
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// True when the API server rejected a write because the object changed since it was read
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Kube { source: kube::Error::Api(ae) } if ae.code == CONFLICT)
    }

    /// True when the error means a resource is absent
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::Kube {
                source: kube::Error::Api(ae),
            } => ae.code == NOT_FOUND,
            _ => false,
        }
    }

    /// Check if this error is retryable
    ///
    /// Conflicts and transient API failures are retried. Topology and
    /// transition errors need the observed objects to change first.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => match source {
                kube::Error::Api(ae) => ae.code == CONFLICT || !(400..500).contains(&ae.code),
                _ => true,
            },
            Error::NotFound { .. } => false,
            Error::Topology { .. } => false,
            Error::InvalidTransition { .. } => false,
            Error::Serialization { .. } => false,
            Error::Internal { .. } => true,
        }
    }
}
