//! Cluster API access for the CSV controller
//!
//! The controller talks to the cluster through the [`ClusterClient`] trait so
//! tests can substitute mocks while production wires a real kube client.

use async_trait::async_trait;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams};
use kube::discovery::ApiResource;
use kube::Client;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::crd::{ClusterServiceVersion, API_GROUP, API_VERSION, CSV_KIND, CSV_PLURAL};
use crate::Error;

/// Field manager used for CSV status patches
const FIELD_MANAGER: &str = "alm-operator";

/// Trait abstracting cluster operations for the CSV controller
///
/// This trait allows mocking the Kubernetes client in tests while using
/// the real client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// List all ClusterServiceVersions in a namespace
    ///
    /// Objects that fail to decode are skipped rather than failing the list.
    async fn list_csvs(&self, namespace: &str) -> Result<Vec<ClusterServiceVersion>, Error>;

    /// Fetch a single ClusterServiceVersion, `None` when absent
    async fn get_csv(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ClusterServiceVersion>, Error>;

    /// Delete a ClusterServiceVersion cluster object
    async fn delete_csv(&self, namespace: &str, name: &str) -> Result<(), Error>;

    /// Write a ClusterServiceVersion's status back to the cluster
    async fn update_status(&self, csv: &ClusterServiceVersion) -> Result<(), Error>;

    /// Fetch a CustomResourceDefinition by name, `None` when absent
    async fn get_crd(&self, name: &str) -> Result<Option<CustomResourceDefinition>, Error>;
}

/// Real Kubernetes client implementation
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    /// Create a new KubeClusterClient wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn csvs(&self, namespace: &str) -> Api<ClusterServiceVersion> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn csv_resource() -> ApiResource {
        ApiResource {
            group: API_GROUP.to_string(),
            version: API_VERSION.to_string(),
            api_version: format!("{API_GROUP}/{API_VERSION}"),
            kind: CSV_KIND.to_string(),
            plural: CSV_PLURAL.to_string(),
        }
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn list_csvs(&self, namespace: &str) -> Result<Vec<ClusterServiceVersion>, Error> {
        // List dynamically and decode per object so one malformed CSV does
        // not hide the rest of the namespace.
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &Self::csv_resource());
        let list = api.list(&ListParams::default()).await?;

        let mut csvs = Vec::with_capacity(list.items.len());
        for obj in list.items {
            let value = match serde_json::to_value(&obj) {
                Ok(value) => value,
                Err(e) => {
                    debug!(error = %e, "skipping unserializable object in CSV list");
                    continue;
                }
            };
            match serde_json::from_value::<ClusterServiceVersion>(value) {
                Ok(csv) => csvs.push(csv),
                Err(e) => debug!(error = %e, "skipping malformed CSV in list"),
            }
        }
        Ok(csvs)
    }

    async fn get_csv(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ClusterServiceVersion>, Error> {
        Ok(self.csvs(namespace).get_opt(name).await?)
    }

    async fn delete_csv(&self, namespace: &str, name: &str) -> Result<(), Error> {
        self.csvs(namespace)
            .delete(name, &DeleteParams::default())
            .await?;
        Ok(())
    }

    async fn update_status(&self, csv: &ClusterServiceVersion) -> Result<(), Error> {
        let name = csv
            .metadata
            .name
            .clone()
            .ok_or_else(|| Error::serialization("CSV has no name"))?;
        let namespace = csv.metadata.namespace.clone().unwrap_or_default();

        let status_patch = serde_json::json!({
            "status": csv.status
        });

        self.csvs(&namespace)
            .patch_status(
                &name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&status_patch),
            )
            .await?;
        Ok(())
    }

    async fn get_crd(&self, name: &str) -> Result<Option<CustomResourceDefinition>, Error> {
        let api: Api<CustomResourceDefinition> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?)
    }
}
