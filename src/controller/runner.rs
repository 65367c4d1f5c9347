//! Controller runner - starts and manages the ALM controllers
//!
//! Wires each watched namespace to a ClusterServiceVersion controller and an
//! InstallPlan controller. The kube runtime provides the rate-limited work
//! queue underneath: add/update events enqueue the object's namespaced key,
//! a key in flight is not redelivered until its worker completes, and failed
//! reconciliations requeue through the error policy.

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use futures::{FutureExt, StreamExt};
use kube::api::Api;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::Client;

use crate::config::OperatorConfig;
use crate::controller::{
    error_policy, plan_error_policy, reconcile, reconcile_plan, Context, PlanContext,
};
use crate::crd::{ClusterServiceVersion, InstallPlan};

/// Run all controllers until shutdown
///
/// One CSV controller and one InstallPlan controller per watched namespace;
/// an empty namespace list watches the whole cluster.
pub async fn run_controllers(
    client: Client,
    config: &OperatorConfig,
    ctx: Arc<Context>,
    plan_ctx: Arc<PlanContext>,
) {
    let mut controllers = Vec::new();

    if config.watched_namespaces.is_empty() {
        tracing::info!("watching ClusterServiceVersions in all namespaces");
        controllers.push(csv_controller(Api::all(client.clone()), ctx.clone()).boxed());
        controllers.push(plan_controller(Api::all(client.clone()), plan_ctx.clone()).boxed());
    } else {
        for namespace in &config.watched_namespaces {
            tracing::info!(namespace = %namespace, "watching ClusterServiceVersions");
            controllers.push(
                csv_controller(Api::namespaced(client.clone(), namespace), ctx.clone()).boxed(),
            );
            controllers.push(
                plan_controller(Api::namespaced(client.clone(), namespace), plan_ctx.clone())
                    .boxed(),
            );
        }
    }

    join_all(controllers).await;
    tracing::info!("controllers stopped");
}

fn csv_controller(
    csvs: Api<ClusterServiceVersion>,
    ctx: Arc<Context>,
) -> impl Future<Output = ()> {
    Controller::new(csvs, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok(action) => tracing::debug!(?action, "CSV reconciliation completed"),
                Err(e) => tracing::error!(error = ?e, "CSV reconciliation error"),
            }
        })
}

fn plan_controller(
    plans: Api<InstallPlan>,
    ctx: Arc<PlanContext>,
) -> impl Future<Output = ()> {
    Controller::new(plans, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile_plan, plan_error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok(action) => tracing::debug!(?action, "InstallPlan reconciliation completed"),
                Err(e) => tracing::error!(error = ?e, "InstallPlan reconciliation error"),
            }
        })
}
