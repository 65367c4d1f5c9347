//! Custom Resource Definitions managed by ALM

mod csv;
mod install_plan;
mod types;

pub use csv::{ClusterServiceVersion, ClusterServiceVersionSpec, ClusterServiceVersionStatus, StatusSummary};
pub use install_plan::{InstallPlan, InstallPlanPhase, InstallPlanSpec, InstallPlanStatus};
pub use types::{
    ConditionReason, CrdDescription, CrdKey, CustomResourceDefinitions, NamedInstallStrategy,
    Phase, RequirementStatus,
};

/// API group of the ALM CRDs
pub const API_GROUP: &str = "alm.dev";

/// API version of the ALM CRDs
pub const API_VERSION: &str = "v1alpha1";

/// Kind of the ClusterServiceVersion CRD
pub const CSV_KIND: &str = "ClusterServiceVersion";

/// Plural resource name of the ClusterServiceVersion CRD
pub const CSV_PLURAL: &str = "clusterserviceversions";
