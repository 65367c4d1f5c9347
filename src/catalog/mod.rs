//! Catalog source lookup
//!
//! A catalog source is a named, read-only bag of ClusterServiceVersions and
//! CRD definitions. The resolver scans an ordered list of sources; order
//! defines precedence. Lookups are total and side-effect free, so an
//! in-memory implementation backs both production registries and tests.

use std::collections::HashMap;
use std::sync::Arc;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::ResourceExt;

use crate::crd::{ClusterServiceVersion, CrdKey};

/// Identity of a catalog source
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct SourceKey {
    /// Name of the catalog source
    pub name: String,
    /// Namespace the catalog source lives in
    pub namespace: String,
}

impl SourceKey {
    /// Create a new source key
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

impl std::fmt::Display for SourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Read-only view over one catalog source
pub trait Source: Send + Sync {
    /// Look up a ClusterServiceVersion by name
    fn find_csv(&self, name: &str) -> Option<ClusterServiceVersion>;

    /// Look up a CRD definition by name
    fn find_crd(&self, name: &str) -> Option<CustomResourceDefinition>;

    /// Look up the ClusterServiceVersion that owns the given CRD
    fn find_csv_owning_crd(&self, key: &CrdKey) -> Option<ClusterServiceVersion>;
}

/// A catalog source paired with its identity
///
/// The resolver takes an ordered list of these; argument order defines
/// source precedence.
#[derive(Clone)]
pub struct SourceRef {
    /// Identity of the source
    pub key: SourceKey,
    /// The source itself
    pub source: Arc<dyn Source>,
}

impl SourceRef {
    /// Pair a source with its identity
    pub fn new(key: SourceKey, source: Arc<dyn Source>) -> Self {
        Self { key, source }
    }
}

impl std::fmt::Debug for SourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRef").field("key", &self.key).finish()
    }
}

/// In-memory catalog source
///
/// Indexes CSVs by name, CRD definitions by name, and CRD ownership by the
/// full (name, version, kind) key.
#[derive(Default)]
pub struct InMemSource {
    csvs: HashMap<String, ClusterServiceVersion>,
    crds: HashMap<String, CustomResourceDefinition>,
    owners: HashMap<CrdKey, String>,
}

impl InMemSource {
    /// Create an empty catalog source
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a ClusterServiceVersion, replacing any existing entry with the
    /// same name and re-indexing its owned CRDs
    pub fn add_or_replace_csv(&mut self, csv: ClusterServiceVersion) {
        let name = csv.name_any();
        for owned in &csv.spec.custom_resource_definitions.owned {
            self.owners.insert(owned.key(), name.clone());
        }
        self.csvs.insert(name, csv);
    }

    /// Add a CRD definition, replacing any existing entry with the same name
    pub fn set_crd_definition(&mut self, crd: CustomResourceDefinition) {
        self.crds.insert(crd.name_any(), crd);
    }
}

impl Source for InMemSource {
    fn find_csv(&self, name: &str) -> Option<ClusterServiceVersion> {
        self.csvs.get(name).cloned()
    }

    fn find_crd(&self, name: &str) -> Option<CustomResourceDefinition> {
        self.crds.get(name).cloned()
    }

    fn find_csv_owning_crd(&self, key: &CrdKey) -> Option<ClusterServiceVersion> {
        self.owners
            .get(key)
            .and_then(|owner| self.csvs.get(owner))
            .cloned()
    }
}
