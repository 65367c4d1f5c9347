//! Kubernetes controller reconciliation logic

mod client;
mod csv;
mod install_plan;
pub mod ownership;
pub mod replace;
pub mod requirements;
pub mod runner;

pub use client::{ClusterClient, KubeClusterClient};
pub use csv::{error_policy, reconcile, transition_csv_state, Context};
pub use install_plan::{
    plan_error_policy, reconcile_plan, KubePlanClient, PlanClient, PlanContext, SourceRegistry,
};
