//! ClusterServiceVersion Custom Resource Definition
//!
//! A ClusterServiceVersion (CSV) declares one installable version of a
//! packaged operator: the CRDs it owns and requires, how to install it, and
//! optionally the older version it replaces. The CSV controller drives each
//! CSV through its lifecycle phases based on this declaration.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{
    ConditionReason, CrdDescription, CustomResourceDefinitions, NamedInstallStrategy, Phase,
    RequirementStatus,
};

/// Specification for a ClusterServiceVersion
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "alm.dev",
    version = "v1alpha1",
    kind = "ClusterServiceVersion",
    plural = "clusterserviceversions",
    shortname = "csv",
    status = "ClusterServiceVersionStatus",
    namespaced,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Reason","type":"string","jsonPath":".status.reason"}"#,
    printcolumn = r#"{"name":"Replaces","type":"string","jsonPath":".spec.replaces"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterServiceVersionSpec {
    /// Name of the CSV in the same namespace that this version supersedes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaces: Option<String>,

    /// CRDs this version owns and requires
    #[serde(default)]
    pub custom_resource_definitions: CustomResourceDefinitions,

    /// Install strategy blob, interpreted by the install subsystem
    #[serde(default)]
    pub install: NamedInstallStrategy,
}

/// Status for a ClusterServiceVersion
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterServiceVersionStatus {
    /// Current lifecycle phase
    #[serde(default)]
    pub phase: Phase,

    /// Machine-readable reason for the current phase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<ConditionReason>,

    /// Human-readable message about the current state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Presence of each owned and required CRD, recorded during
    /// requirement verification
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requirement_status: Vec<RequirementStatus>,
}

/// The `(phase, reason, message)` triple used to decide whether a status
/// write-back is needed
pub type StatusSummary = (Phase, Option<ConditionReason>, Option<String>);

impl ClusterServiceVersion {
    /// Current phase, defaulting to [`Phase::None`] when no status is recorded
    pub fn phase(&self) -> Phase {
        self.status.as_ref().map(|s| s.phase).unwrap_or_default()
    }

    /// Set the phase, reason, and message in one transition
    pub fn set_phase(&mut self, phase: Phase, reason: ConditionReason, message: impl Into<String>) {
        let status = self.status.get_or_insert_with(Default::default);
        status.phase = phase;
        status.reason = Some(reason);
        status.message = Some(message.into());
    }

    /// Record the outcome of requirement verification
    pub fn set_requirement_status(&mut self, statuses: Vec<RequirementStatus>) {
        let status = self.status.get_or_insert_with(Default::default);
        status.requirement_status = statuses;
    }

    /// The `(phase, reason, message)` triple of the current status
    pub fn status_summary(&self) -> StatusSummary {
        match &self.status {
            Some(s) => (s.phase, s.reason, s.message.clone()),
            None => (Phase::None, None, None),
        }
    }

    /// Returns true if this CSV owns a CRD with the given name
    pub fn owns_crd(&self, name: &str) -> bool {
        self.spec
            .custom_resource_definitions
            .owned
            .iter()
            .any(|crd| crd.name == name)
    }

    /// All owned and required CRD descriptions, deduplicated by name with
    /// owned descriptions taking precedence
    pub fn all_crd_descriptions(&self) -> Vec<CrdDescription> {
        let crds = &self.spec.custom_resource_definitions;
        let mut seen = std::collections::HashSet::new();
        crds.owned
            .iter()
            .chain(crds.required.iter())
            .filter(|desc| seen.insert(desc.name.clone()))
            .cloned()
            .collect()
    }

    /// Returns true if this CSV has been superseded: it is being replaced or
    /// is already marked for deletion
    pub fn is_obsolete(&self) -> bool {
        matches!(self.phase(), Phase::Replacing | Phase::Deleting)
    }

}
