//! Supporting types for the ClusterServiceVersion CRD

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Lifecycle phase of a ClusterServiceVersion
///
/// A CSV moves Pending -> InstallReady -> Installing -> Succeeded, with
/// Failed reachable from requirement, install, and health checks. Replacing
/// and Deleting drive garbage collection along replacement chains.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum Phase {
    /// No phase recorded yet; the CSV has not been scheduled for
    /// requirement verification
    #[default]
    #[serde(rename = "")]
    None,
    /// Requirements are being verified
    Pending,
    /// All requirements present; install has not started
    InstallReady,
    /// Install strategy applied; waiting for components to report healthy
    Installing,
    /// All components report healthy
    Succeeded,
    /// Requirement, install, or health check failed permanently
    Failed,
    /// A newer ClusterServiceVersion has declared that it replaces this one
    Replacing,
    /// Marked for deletion; superseded by an installed replacement
    Deleting,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, ""),
            Self::Pending => write!(f, "Pending"),
            Self::InstallReady => write!(f, "InstallReady"),
            Self::Installing => write!(f, "Installing"),
            Self::Succeeded => write!(f, "Succeeded"),
            Self::Failed => write!(f, "Failed"),
            Self::Replacing => write!(f, "Replacing"),
            Self::Deleting => write!(f, "Deleting"),
        }
    }
}

/// Machine-readable reason accompanying a phase transition
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionReason {
    /// Requirements have not been checked yet
    RequirementsUnknown,
    /// One or more required CRDs could not be found on the cluster
    RequirementsNotMet,
    /// All required CRDs are present
    RequirementsMet,
    /// Another CSV owns one of this CSV's CRDs with no replacement chain
    /// linking the two
    OwnerConflict,
    /// The install strategy blob could not be parsed
    InvalidStrategy,
    /// Applying the install strategy failed
    ComponentFailed,
    /// The install strategy was applied successfully
    InstallSuccessful,
    /// The install health check reported an unrecoverable failure
    InstallCheckFailed,
    /// Waiting for installed components to report healthy
    Waiting,
    /// A previously healthy component regressed
    ComponentUnhealthy,
    /// A newer CSV declares that it replaces this one
    BeingReplaced,
    /// A newer CSV in the replacement chain installed successfully
    Replaced,
}

impl std::fmt::Display for ConditionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RequirementsUnknown => write!(f, "RequirementsUnknown"),
            Self::RequirementsNotMet => write!(f, "RequirementsNotMet"),
            Self::RequirementsMet => write!(f, "RequirementsMet"),
            Self::OwnerConflict => write!(f, "OwnerConflict"),
            Self::InvalidStrategy => write!(f, "InvalidStrategy"),
            Self::ComponentFailed => write!(f, "ComponentFailed"),
            Self::InstallSuccessful => write!(f, "InstallSuccessful"),
            Self::InstallCheckFailed => write!(f, "InstallCheckFailed"),
            Self::Waiting => write!(f, "Waiting"),
            Self::ComponentUnhealthy => write!(f, "ComponentUnhealthy"),
            Self::BeingReplaced => write!(f, "BeingReplaced"),
            Self::Replaced => write!(f, "Replaced"),
        }
    }
}

/// Presence of a single required or owned CRD on the cluster
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RequirementStatus {
    /// API group of the requirement (apiextensions.k8s.io for CRDs)
    pub group: String,

    /// API version of the requirement
    pub version: String,

    /// Kind of the requirement
    pub kind: String,

    /// Name of the required object
    pub name: String,

    /// Whether the object exists on the cluster
    pub present: bool,

    /// UID of the cluster object, when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
}

/// Reference to a CRD that a ClusterServiceVersion owns or requires
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CrdDescription {
    /// Full name of the CRD (plural.group)
    pub name: String,

    /// Version of the CRD's schema this CSV works with
    pub version: String,

    /// Kind served by the CRD
    pub kind: String,
}

impl CrdDescription {
    /// Identity key of the described CRD
    pub fn key(&self) -> CrdKey {
        CrdKey {
            name: self.name.clone(),
            version: self.version.clone(),
            kind: self.kind.clone(),
        }
    }
}

/// Identity of a CRD schema: name, served kind, and schema version
///
/// Ownership lookups key CRDs by this full triple; plain definition lookups
/// in catalogs key by name alone.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct CrdKey {
    /// Full name of the CRD
    pub name: String,
    /// Schema version
    pub version: String,
    /// Served kind
    pub kind: String,
}

impl std::fmt::Display for CrdKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.name, self.kind, self.version)
    }
}

/// Owned and required CRDs of a ClusterServiceVersion
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CustomResourceDefinitions {
    /// CRDs whose canonical owner is this CSV
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owned: Vec<CrdDescription>,

    /// CRDs this CSV cannot run without
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<CrdDescription>,
}

/// Opaque install strategy blob: a strategy name plus a strategy-specific
/// payload, interpreted only by the install subsystem
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct NamedInstallStrategy {
    /// Name of the strategy the payload encodes
    #[serde(rename = "strategy")]
    pub strategy_name: String,

    /// Strategy-specific payload
    #[serde(default)]
    pub spec: serde_json::Value,
}
