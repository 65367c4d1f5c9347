//! ALM - Kubernetes operator for installing and upgrading packaged operators
//!
//! ALM manages the lifecycle of ClusterServiceVersions: declarative descriptions
//! of one installable version of a packaged operator, including the custom
//! resource definitions it owns and requires, its install strategy, and the
//! version it replaces.
//!
//! # Architecture
//!
//! Two engines drive the system:
//! - A per-CSV reconciler walks each ClusterServiceVersion through its
//!   lifecycle (requirement verification, install, health checking) and
//!   garbage-collects superseded versions along replacement chains.
//! - A multi-source dependency resolver turns an InstallPlan's requested CSV
//!   names into an ordered, deduplicated list of resource steps, pulling
//!   transitive dependencies from an ordered list of catalog sources.
//!
//! # Modules
//!
//! - [`crd`] - Custom Resource Definitions (ClusterServiceVersion, InstallPlan)
//! - [`catalog`] - Catalog source lookup (CSVs, CRDs, CRD ownership)
//! - [`resolver`] - Multi-source install plan resolution
//! - [`install`] - Install strategy parsing and execution
//! - [`controller`] - Kubernetes controller reconciliation logic
//! - [`config`] - Operator configuration
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod catalog;
pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod install;
pub mod resolver;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
