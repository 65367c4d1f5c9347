//! Error types for the ALM operator

use thiserror::Error;

use crate::install::InstallError;
use crate::resolver::ResolveError;

/// Main error type for ALM operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// One or more of a ClusterServiceVersion's required CRDs was not found
    /// on the cluster. Transient: requirements are re-checked on requeue.
    #[error("requirements were not met")]
    RequirementsNotMet,

    /// Sentinel returned when a newer ClusterServiceVersion has taken over.
    /// The replacement precondition has already recorded the status change,
    /// so the dispatcher treats this tick as a successful no-op.
    #[error("replacing")]
    Replacing,

    /// Two ClusterServiceVersions claim the same CRD without a replacement
    /// chain linking them
    #[error("{csv} and {other} both own {crd}, but there is no replacement chain linking them")]
    OwnershipConflict {
        /// Name of the ClusterServiceVersion being reconciled
        csv: String,
        /// Name of the other owner
        other: String,
        /// Name of the contested CRD
        crd: String,
    },

    /// Install strategy parsing or execution error
    #[error(transparent)]
    Install(#[from] InstallError),

    /// Install plan resolution error
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Writing status back to the cluster failed
    #[error("error updating ClusterServiceVersion status: {0}")]
    StatusUpdate(String),

    /// Both the state transition and the subsequent status write failed;
    /// both messages are preserved
    #[error("error transitioning ClusterServiceVersion: {transition} and error updating ClusterServiceVersion status: {update}")]
    Sync {
        /// The transition error
        transition: String,
        /// The status write error
        update: String,
    },
}

impl Error {
    /// Create an ownership conflict error for two CSVs claiming the same CRD
    pub fn ownership_conflict(
        csv: impl Into<String>,
        other: impl Into<String>,
        crd: impl Into<String>,
    ) -> Self {
        Self::OwnershipConflict {
            csv: csv.into(),
            other: other.into(),
            crd: crd.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create a status update error with the given message
    pub fn status_update(msg: impl Into<String>) -> Self {
        Self::StatusUpdate(msg.into())
    }

    /// Returns true if this is the sentinel signalling that the CSV is being
    /// replaced and the tick should be treated as a successful no-op
    pub fn is_replacing_sentinel(&self) -> bool {
        matches!(self, Self::Replacing)
    }
}
