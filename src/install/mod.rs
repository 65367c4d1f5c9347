//! Install strategy parsing and execution
//!
//! A ClusterServiceVersion carries an opaque install strategy blob: a
//! strategy name plus a strategy-specific payload. The [`StrategyResolver`]
//! turns the blob into a parsed [`Strategy`] and hands out an installer for
//! it; the installer applies the strategy to the cluster and reports whether
//! its components are healthy. The CSV controller only decides *when* to
//! invoke the installer and how to interpret the result.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use kube::api::{Api, DeleteParams, Patch, PatchParams};
use kube::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use crate::crd::{ClusterServiceVersion, NamedInstallStrategy};

/// Name of the deployment-based install strategy
pub const DEPLOYMENT_STRATEGY: &str = "deployment";

/// Field manager used for server-side apply of strategy components
const FIELD_MANAGER: &str = "alm-operator";

/// Label naming the CSV that owns a strategy component
const OWNER_NAME_LABEL: &str = "alm-owner-name";

/// Label naming the namespace of the owning CSV
const OWNER_NAMESPACE_LABEL: &str = "alm-owner-namespace";

/// Errors from strategy parsing, installation, and health checking
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InstallError {
    /// The strategy blob could not be parsed
    #[error("invalid install strategy: {0}")]
    InvalidStrategy(String),

    /// A component has not reported healthy yet; safe to re-check later
    #[error("component not ready: {0}")]
    NotReady(String),

    /// A component cannot make progress without a spec change
    #[error("unrecoverable component state: {0}")]
    Unrecoverable(String),

    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),
}

impl InstallError {
    /// Returns true if the install cannot make progress and the CSV should
    /// be marked failed instead of re-checked
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, Self::Unrecoverable(_))
    }
}

/// A parsed install strategy: the strategy name and its validated payload
#[derive(Clone, Debug, PartialEq)]
pub struct Strategy {
    /// Name of the strategy
    pub name: String,
    /// Strategy-specific payload
    pub spec: serde_json::Value,
}

/// Parses strategy blobs and hands out installers for them
#[cfg_attr(test, automock)]
pub trait StrategyResolver: Send + Sync {
    /// Parse and validate an install strategy blob
    fn unmarshal(&self, strategy: &NamedInstallStrategy) -> Result<Strategy, InstallError>;

    /// Build an installer for the named strategy
    ///
    /// `previous` carries the parsed strategy of the CSV this one replaces,
    /// when that CSV still exists, so the installer can take over and clean
    /// up the predecessor's components.
    fn installer_for(
        &self,
        strategy_name: &str,
        csv: &ClusterServiceVersion,
        previous: Option<Strategy>,
    ) -> Arc<dyn StrategyInstaller>;
}

/// Applies a parsed strategy to the cluster and checks its health
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StrategyInstaller: Send + Sync {
    /// Apply the strategy's components
    async fn install(&self, strategy: &Strategy) -> Result<(), InstallError>;

    /// Report whether every component of the strategy is present and healthy
    ///
    /// `Ok(false)` means components are still missing without an error to
    /// report; `Err` distinguishes recoverable waiting states from
    /// unrecoverable failures via [`InstallError::is_unrecoverable`].
    async fn check_installed(&self, strategy: &Strategy) -> Result<bool, InstallError>;
}

/// Payload of the deployment strategy: a list of named Deployment specs
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StrategyDetailsDeployment {
    /// Deployments to create, by name
    pub deployments: Vec<StrategyDeploymentSpec>,
}

/// One Deployment of a deployment strategy
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StrategyDeploymentSpec {
    /// Name of the Deployment
    pub name: String,
    /// Spec of the Deployment
    pub spec: DeploymentSpec,
}

/// Production strategy resolver backed by a Kubernetes client
pub struct ClusterStrategyResolver {
    client: Client,
}

impl ClusterStrategyResolver {
    /// Create a resolver that builds installers against the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl StrategyResolver for ClusterStrategyResolver {
    fn unmarshal(&self, strategy: &NamedInstallStrategy) -> Result<Strategy, InstallError> {
        unmarshal_strategy(strategy)
    }

    fn installer_for(
        &self,
        strategy_name: &str,
        csv: &ClusterServiceVersion,
        previous: Option<Strategy>,
    ) -> Arc<dyn StrategyInstaller> {
        debug!(strategy = strategy_name, "building installer");
        Arc::new(DeploymentInstaller {
            client: self.client.clone(),
            namespace: csv.metadata.namespace.clone().unwrap_or_default(),
            owner_name: csv.metadata.name.clone().unwrap_or_default(),
            previous,
        })
    }
}

/// Parse and validate a strategy blob without a client
///
/// Shared by the production resolver and tests; validation is pure.
pub fn unmarshal_strategy(strategy: &NamedInstallStrategy) -> Result<Strategy, InstallError> {
    if strategy.strategy_name.is_empty() {
        return Err(InstallError::InvalidStrategy(
            "install strategy not specified".to_string(),
        ));
    }
    match strategy.strategy_name.as_str() {
        DEPLOYMENT_STRATEGY => {
            serde_json::from_value::<StrategyDetailsDeployment>(strategy.spec.clone())
                .map_err(|e| InstallError::InvalidStrategy(e.to_string()))?;
        }
        other => {
            return Err(InstallError::InvalidStrategy(format!(
                "unrecognized install strategy: {other}"
            )));
        }
    }
    Ok(Strategy {
        name: strategy.strategy_name.clone(),
        spec: strategy.spec.clone(),
    })
}

/// Installer for the deployment strategy
///
/// Server-side-applies each named Deployment, labelled with its owning CSV,
/// and reports installed once every Deployment has its replicas available.
pub struct DeploymentInstaller {
    client: Client,
    namespace: String,
    owner_name: String,
    previous: Option<Strategy>,
}

impl DeploymentInstaller {
    fn details(&self, strategy: &Strategy) -> Result<StrategyDetailsDeployment, InstallError> {
        serde_json::from_value(strategy.spec.clone())
            .map_err(|e| InstallError::InvalidStrategy(e.to_string()))
    }

    fn api(&self) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }
}

#[async_trait]
impl StrategyInstaller for DeploymentInstaller {
    async fn install(&self, strategy: &Strategy) -> Result<(), InstallError> {
        let details = self.details(strategy)?;
        let api = self.api();

        for deployment in &details.deployments {
            let obj: Deployment = serde_json::from_value(serde_json::json!({
                "apiVersion": "apps/v1",
                "kind": "Deployment",
                "metadata": {
                    "name": deployment.name,
                    "namespace": self.namespace,
                    "labels": {
                        OWNER_NAME_LABEL: self.owner_name,
                        OWNER_NAMESPACE_LABEL: self.namespace,
                    },
                },
                "spec": deployment.spec,
            }))
            .map_err(|e| InstallError::InvalidStrategy(e.to_string()))?;

            api.patch(
                &deployment.name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(&obj),
            )
            .await?;

            info!(
                deployment = %deployment.name,
                namespace = %self.namespace,
                csv = %self.owner_name,
                "applied strategy deployment"
            );
        }

        // Take over from a replaced CSV: drop its deployments that the new
        // strategy no longer declares.
        if let Some(previous) = &self.previous {
            if let Ok(old) = self.details(previous) {
                for stale in old
                    .deployments
                    .iter()
                    .filter(|d| !details.deployments.iter().any(|n| n.name == d.name))
                {
                    match api.delete(&stale.name, &DeleteParams::default()).await {
                        Ok(_) => info!(deployment = %stale.name, "removed superseded deployment"),
                        Err(kube::Error::Api(ae)) if ae.code == 404 => {}
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }

        Ok(())
    }

    async fn check_installed(&self, strategy: &Strategy) -> Result<bool, InstallError> {
        let details = self.details(strategy)?;
        let api = self.api();

        for deployment in &details.deployments {
            let Some(found) = api.get_opt(&deployment.name).await? else {
                return Ok(false);
            };

            let status = found.status.unwrap_or_default();
            if let Some(conditions) = &status.conditions {
                if conditions
                    .iter()
                    .any(|c| c.type_ == "ReplicaFailure" && c.status == "True")
                {
                    return Err(InstallError::Unrecoverable(format!(
                        "deployment {} cannot create replicas",
                        deployment.name
                    )));
                }
            }

            let wanted = deployment.spec.replicas.unwrap_or(1);
            let available = status.available_replicas.unwrap_or(0);
            if available < wanted {
                return Err(InstallError::NotReady(format!(
                    "deployment {} has {available}/{wanted} replicas available",
                    deployment.name
                )));
            }
        }

        Ok(true)
    }
}
