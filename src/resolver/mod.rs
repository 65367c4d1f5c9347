//! Multi-source install plan resolution
//!
//! Given an ordered list of catalog sources and an InstallPlan naming one or
//! more ClusterServiceVersions, the resolver produces an ordered,
//! duplicate-free list of resource steps that satisfies every dependency
//! transitively: each requested CSV, the CRD definitions it owns, and for
//! each CRD it requires, the definition plus the CSV that owns it, resolved
//! recursively. Every step is attributed to the catalog source that supplied
//! it; source precedence is argument order.

use std::collections::{BTreeSet, HashSet};

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::ResourceExt;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::catalog::{SourceKey, SourceRef};
use crate::crd::{ClusterServiceVersion, CrdDescription, CrdKey, InstallPlan, API_GROUP, API_VERSION, CSV_KIND};

/// Kind of a CustomResourceDefinition step
pub const CRD_KIND: &str = "CustomResourceDefinition";

/// API group of CustomResourceDefinition objects
pub const CRD_GROUP: &str = "apiextensions.k8s.io";

/// API version of CustomResourceDefinition objects
pub const CRD_VERSION: &str = "v1";

/// Errors produced by install plan resolution
///
/// The two not-found message formats are contractual; callers and tests
/// match on them verbatim.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// A requested or transitively required CSV is absent from all sources
    #[error("not found: ClusterServiceVersion {0}")]
    CsvNotFound(String),

    /// An owned or required CRD could not be located
    #[error("not found: CRD {0}")]
    CrdNotFound(CrdKey),

    /// A resolved object could not be rendered into a step manifest
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// A concrete resource to create, annotated with the catalog that supplied it
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepResource {
    /// API group of the resource
    pub group: String,

    /// API version of the resource
    pub version: String,

    /// Kind of the resource
    pub kind: String,

    /// Name of the resource
    pub name: String,

    /// Full manifest of the resource
    pub manifest: serde_json::Value,

    /// Name of the catalog source that supplied the resource
    pub catalog_source: String,

    /// Namespace of the catalog source that supplied the resource
    pub catalog_source_namespace: String,
}

/// One entry of a resolved install plan
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// Name of the CSV whose resolution produced this step
    pub resolving: String,

    /// The resource to create
    pub resource: StepResource,
}

/// Resolves install plans across an ordered list of catalog sources
#[derive(Clone, Copy, Debug, Default)]
pub struct MultiSourceResolver;

impl MultiSourceResolver {
    /// Resolve an install plan into an ordered list of steps
    ///
    /// Returns the steps together with the set of source keys that
    /// contributed at least one step. For a fixed input the output is
    /// deterministic: steps appear in traversal order (each CSV, then its
    /// owned CRDs, then each required CRD followed by its transitively
    /// resolved owner) and duplicates are dropped by `(kind, name)`.
    pub fn resolve_install_plan(
        &self,
        sources: &[SourceRef],
        catalog_label: &str,
        plan: &InstallPlan,
    ) -> Result<(Vec<Step>, BTreeSet<SourceKey>), ResolveError> {
        debug!(
            catalog = catalog_label,
            sources = sources.len(),
            "resolving install plan"
        );

        let mut resolution = Resolution {
            sources,
            steps: Vec::new(),
            used: BTreeSet::new(),
            seen: HashSet::new(),
        };
        for name in &plan.spec.cluster_service_version_names {
            resolution.resolve_csv(name)?;
        }
        Ok((resolution.steps, resolution.used))
    }
}

/// Working state of one resolution pass
struct Resolution<'a> {
    sources: &'a [SourceRef],
    steps: Vec<Step>,
    used: BTreeSet<SourceKey>,
    seen: HashSet<(String, String)>,
}

impl Resolution<'_> {
    /// Resolve one CSV as a root: emit its step, then its owned CRD
    /// definitions, then each required CRD and that CRD's owner.
    fn resolve_csv(&mut self, name: &str) -> Result<(), ResolveError> {
        if !self.mark_seen(CSV_KIND, name) {
            return Ok(());
        }

        let (csv, src_key) = self
            .find_in_sources(|source| source.find_csv(name))
            .ok_or_else(|| ResolveError::CsvNotFound(name.to_string()))?;
        debug!(csv = name, source = %src_key, "resolved ClusterServiceVersion");
        self.push_csv_step(&csv, src_key)?;

        let crds = csv.spec.custom_resource_definitions.clone();
        for owned in &crds.owned {
            self.resolve_owned_crd(name, owned)?;
        }
        for required in &crds.required {
            self.resolve_required_crd(name, required)?;
        }
        Ok(())
    }

    /// Emit a definition step for a CRD this CSV owns, taking the first
    /// source that carries the definition.
    fn resolve_owned_crd(
        &mut self,
        resolving: &str,
        desc: &CrdDescription,
    ) -> Result<(), ResolveError> {
        if !self.mark_seen(CRD_KIND, &desc.name) {
            return Ok(());
        }
        let (crd, src_key) = self
            .find_in_sources(|source| source.find_crd(&desc.name))
            .ok_or_else(|| ResolveError::CrdNotFound(desc.key()))?;
        self.push_crd_step(resolving, desc, &crd, src_key)
    }

    /// Emit a definition step for a required CRD and recursively resolve its
    /// owning CSV as a new root. Both the definition and an owner must be
    /// found in the same source.
    fn resolve_required_crd(
        &mut self,
        resolving: &str,
        desc: &CrdDescription,
    ) -> Result<(), ResolveError> {
        if !self.mark_seen(CRD_KIND, &desc.name) {
            return Ok(());
        }
        let key = desc.key();
        let sources = self.sources;
        let found = sources.iter().find_map(|sref| {
            let crd = sref.source.find_crd(&desc.name)?;
            let owner = sref.source.find_csv_owning_crd(&key)?;
            Some((crd, owner, sref.key.clone()))
        });
        let (crd, owner, src_key) = found.ok_or(ResolveError::CrdNotFound(key))?;
        self.push_crd_step(resolving, desc, &crd, src_key)?;
        self.resolve_csv(&owner.name_any())
    }

    /// Scan sources in precedence order; the first hit wins
    fn find_in_sources<T>(
        &self,
        lookup: impl Fn(&dyn crate::catalog::Source) -> Option<T>,
    ) -> Option<(T, SourceKey)> {
        self.sources
            .iter()
            .find_map(|sref| lookup(sref.source.as_ref()).map(|found| (found, sref.key.clone())))
    }

    /// Record a `(kind, name)` pair; returns false if already emitted
    fn mark_seen(&mut self, kind: &str, name: &str) -> bool {
        self.seen.insert((kind.to_string(), name.to_string()))
    }

    fn push_csv_step(
        &mut self,
        csv: &ClusterServiceVersion,
        src_key: SourceKey,
    ) -> Result<(), ResolveError> {
        let manifest = serde_json::to_value(csv)
            .map_err(|e| ResolveError::Serialization(e.to_string()))?;
        let name = csv.name_any();
        self.steps.push(Step {
            resolving: name.clone(),
            resource: StepResource {
                group: API_GROUP.to_string(),
                version: API_VERSION.to_string(),
                kind: CSV_KIND.to_string(),
                name,
                manifest,
                catalog_source: src_key.name.clone(),
                catalog_source_namespace: src_key.namespace.clone(),
            },
        });
        self.used.insert(src_key);
        Ok(())
    }

    fn push_crd_step(
        &mut self,
        resolving: &str,
        desc: &CrdDescription,
        crd: &CustomResourceDefinition,
        src_key: SourceKey,
    ) -> Result<(), ResolveError> {
        let manifest = serde_json::to_value(crd)
            .map_err(|e| ResolveError::Serialization(e.to_string()))?;
        self.steps.push(Step {
            resolving: resolving.to_string(),
            resource: StepResource {
                group: CRD_GROUP.to_string(),
                version: CRD_VERSION.to_string(),
                kind: CRD_KIND.to_string(),
                name: desc.name.clone(),
                manifest,
                catalog_source: src_key.name.clone(),
                catalog_source_namespace: src_key.namespace.clone(),
            },
        });
        self.used.insert(src_key);
        Ok(())
    }
}
