//! InstallPlan controller implementation
//!
//! Resolves each InstallPlan's requested ClusterServiceVersions against the
//! registered catalog sources and records the outcome on status: either the
//! ordered step list (`Complete`) or the resolver error (`Failed`). A plan
//! is resolved once; a new plan object requests a new resolution.

use std::sync::Arc;

use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use tokio::sync::RwLock;
use tracing::{error, info, instrument};

#[cfg(test)]
use mockall::automock;

use crate::catalog::SourceRef;
use crate::crd::{InstallPlan, InstallPlanPhase, InstallPlanStatus};
use crate::resolver::MultiSourceResolver;
use crate::Error;

/// Field manager used for InstallPlan status patches
const FIELD_MANAGER: &str = "alm-operator";

/// Ordered catalog sources shared between the controller and catalog
/// refreshes
///
/// Refreshes swap the whole list under the write lock; resolution clones a
/// snapshot under the read lock, so a refresh never interleaves with a
/// resolve pass.
pub type SourceRegistry = Arc<RwLock<Vec<SourceRef>>>;

/// Trait abstracting cluster operations for the InstallPlan controller
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PlanClient: Send + Sync {
    /// Write an InstallPlan's status back to the cluster
    async fn update_status(&self, plan: &InstallPlan) -> Result<(), Error>;
}

/// Real Kubernetes client implementation
pub struct KubePlanClient {
    client: Client,
}

impl KubePlanClient {
    /// Create a new KubePlanClient wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PlanClient for KubePlanClient {
    async fn update_status(&self, plan: &InstallPlan) -> Result<(), Error> {
        let name = plan
            .metadata
            .name
            .clone()
            .ok_or_else(|| Error::serialization("InstallPlan has no name"))?;
        let namespace = plan.metadata.namespace.clone().unwrap_or_default();
        let api: Api<InstallPlan> = Api::namespaced(self.client.clone(), &namespace);

        let status_patch = serde_json::json!({
            "status": plan.status
        });
        api.patch_status(
            &name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&status_patch),
        )
        .await?;
        Ok(())
    }
}

/// Controller context for InstallPlan reconciliation
pub struct PlanContext {
    /// Cluster access (trait object for testability)
    pub client: Arc<dyn PlanClient>,
    /// Catalog sources to resolve against, in precedence order
    pub sources: SourceRegistry,
    /// Label identifying this resolution run in logs
    pub catalog_label: String,
}

impl PlanContext {
    /// Create a new plan controller context with the given Kubernetes client
    pub fn new(client: Client, sources: SourceRegistry) -> Self {
        Self {
            client: Arc::new(KubePlanClient::new(client)),
            sources,
            catalog_label: "alm-catalog".to_string(),
        }
    }

    /// Create a context with a custom client implementation
    ///
    /// This is primarily used for testing with mock clients.
    pub fn with_client(client: Arc<dyn PlanClient>, sources: SourceRegistry) -> Self {
        Self {
            client,
            sources,
            catalog_label: "alm-catalog".to_string(),
        }
    }
}

/// Reconcile an InstallPlan resource
#[instrument(skip(plan, ctx), fields(plan = %plan.name_any(), namespace = %plan.namespace().unwrap_or_default()))]
pub async fn reconcile_plan(plan: Arc<InstallPlan>, ctx: Arc<PlanContext>) -> Result<Action, Error> {
    let current = plan
        .status
        .as_ref()
        .map(|s| s.phase)
        .unwrap_or_default();
    if current != InstallPlanPhase::Planning {
        // resolution is terminal per plan object
        return Ok(Action::await_change());
    }

    // snapshot the registry so a catalog refresh cannot interleave
    let sources = ctx.sources.read().await.clone();

    let status = match MultiSourceResolver.resolve_install_plan(&sources, &ctx.catalog_label, &plan)
    {
        Ok((steps, used)) => {
            info!(steps = steps.len(), "resolved install plan");
            InstallPlanStatus {
                phase: InstallPlanPhase::Complete,
                message: None,
                plan: steps,
                catalog_sources: used.into_iter().map(|key| key.name).collect(),
            }
        }
        Err(e) => {
            info!(error = %e, "install plan resolution failed");
            InstallPlanStatus {
                phase: InstallPlanPhase::Failed,
                message: Some(e.to_string()),
                plan: Vec::new(),
                catalog_sources: Vec::new(),
            }
        }
    };

    if plan.status.as_ref() != Some(&status) {
        let mut out = (*plan).clone();
        out.status = Some(status);
        ctx.client.update_status(&out).await?;
    }

    Ok(Action::await_change())
}

/// Error policy for the InstallPlan controller
pub fn plan_error_policy(plan: Arc<InstallPlan>, err: &Error, _ctx: Arc<PlanContext>) -> Action {
    error!(?err, plan = %plan.name_any(), "install plan reconciliation failed");
    Action::requeue(std::time::Duration::from_secs(5))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{InMemSource, SourceKey};
    use crate::crd::{ClusterServiceVersion, ClusterServiceVersionSpec, InstallPlanSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::sync::Mutex;

    fn csv(name: &str) -> ClusterServiceVersion {
        ClusterServiceVersion {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            spec: ClusterServiceVersionSpec::default(),
            status: None,
        }
    }

    fn plan(names: &[&str]) -> InstallPlan {
        InstallPlan {
            metadata: ObjectMeta {
                name: Some("plan".to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            spec: InstallPlanSpec {
                cluster_service_version_names: names.iter().map(|n| n.to_string()).collect(),
            },
            status: None,
        }
    }

    fn registry_with(csvs: &[&str]) -> SourceRegistry {
        let mut src = InMemSource::new();
        for name in csvs {
            src.add_or_replace_csv(csv(name));
        }
        Arc::new(RwLock::new(vec![SourceRef::new(
            SourceKey::new("tectonic-ocs", "default"),
            Arc::new(src),
        )]))
    }

    fn capturing_client() -> (Arc<MockPlanClient>, Arc<Mutex<Vec<InstallPlan>>>) {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let captured_clone = captured.clone();
        let mut client = MockPlanClient::new();
        client.expect_update_status().returning(move |plan| {
            captured_clone.lock().unwrap().push(plan.clone());
            Ok(())
        });
        (Arc::new(client), captured)
    }

    #[tokio::test]
    async fn test_resolvable_plan_completes_with_steps() {
        let (client, captured) = capturing_client();
        let ctx = Arc::new(PlanContext::with_client(client, registry_with(&["etcd"])));

        let action = reconcile_plan(Arc::new(plan(&["etcd"])), ctx).await.unwrap();

        assert_eq!(action, Action::await_change());
        let written = captured.lock().unwrap();
        let status = written[0].status.as_ref().unwrap();
        assert_eq!(status.phase, InstallPlanPhase::Complete);
        assert_eq!(status.plan.len(), 1);
        assert_eq!(status.catalog_sources, vec!["tectonic-ocs"]);
    }

    #[tokio::test]
    async fn test_unresolvable_plan_fails_with_resolver_message() {
        let (client, captured) = capturing_client();
        let ctx = Arc::new(PlanContext::with_client(client, registry_with(&[])));

        reconcile_plan(Arc::new(plan(&["etcd"])), ctx).await.unwrap();

        let written = captured.lock().unwrap();
        let status = written[0].status.as_ref().unwrap();
        assert_eq!(status.phase, InstallPlanPhase::Failed);
        assert_eq!(
            status.message.as_deref(),
            Some("not found: ClusterServiceVersion etcd")
        );
        assert!(status.plan.is_empty());
    }

    #[tokio::test]
    async fn test_resolved_plan_is_not_resolved_again() {
        let mut client = MockPlanClient::new();
        client.expect_update_status().times(0);
        let ctx = Arc::new(PlanContext::with_client(
            Arc::new(client),
            registry_with(&["etcd"]),
        ));

        let mut resolved = plan(&["etcd"]);
        resolved.status = Some(InstallPlanStatus {
            phase: InstallPlanPhase::Complete,
            ..Default::default()
        });

        let action = reconcile_plan(Arc::new(resolved), ctx).await.unwrap();
        assert_eq!(action, Action::await_change());
    }
}
