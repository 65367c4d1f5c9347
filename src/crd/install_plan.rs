//! InstallPlan Custom Resource Definition
//!
//! An InstallPlan requests installation of one or more ClusterServiceVersions
//! by name. Its controller resolves the request against the registered
//! catalog sources and records the resulting resource steps on status.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::resolver::Step;

/// Specification for an InstallPlan
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "alm.dev",
    version = "v1alpha1",
    kind = "InstallPlan",
    plural = "installplans",
    shortname = "ip",
    status = "InstallPlanStatus",
    namespaced,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"CSVs","type":"string","jsonPath":".spec.clusterServiceVersionNames"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct InstallPlanSpec {
    /// Names of the ClusterServiceVersions to install
    #[serde(default)]
    pub cluster_service_version_names: Vec<String>,
}

/// Resolution state of an InstallPlan
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum InstallPlanPhase {
    /// The plan has not been resolved yet
    #[default]
    Planning,
    /// Every requested CSV and its transitive dependencies resolved to steps
    Complete,
    /// Resolution failed; the message carries the resolver error
    Failed,
}

impl std::fmt::Display for InstallPlanPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Planning => write!(f, "Planning"),
            Self::Complete => write!(f, "Complete"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Status for an InstallPlan
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InstallPlanStatus {
    /// Current resolution state
    #[serde(default)]
    pub phase: InstallPlanPhase,

    /// Human-readable message about the resolution outcome
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Ordered resource steps produced by the resolver
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plan: Vec<Step>,

    /// Names of the catalog sources that contributed at least one step
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub catalog_sources: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_defaults_to_planning() {
        let status = InstallPlanStatus::default();
        assert_eq!(status.phase, InstallPlanPhase::Planning);
        assert!(status.plan.is_empty());
    }

    #[test]
    fn test_spec_serializes_csv_names_camel_case() {
        let spec = InstallPlanSpec {
            cluster_service_version_names: vec!["etcd".to_string()],
        };
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["clusterServiceVersionNames"][0], "etcd");
    }
}
