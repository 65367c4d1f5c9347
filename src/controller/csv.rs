//! ClusterServiceVersion controller implementation
//!
//! This module implements the reconciliation state machine for
//! ClusterServiceVersion resources. Each tick loads the current CSV, computes
//! the next status from cluster state (requirements, ownership, install
//! health, replacement chains), and writes the status back only when the
//! `(phase, reason, message)` triple changed.

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use crate::controller::client::{ClusterClient, KubeClusterClient};
use crate::controller::ownership::crd_owner_conflicts;
use crate::controller::replace::ReplacementGraph;
use crate::controller::requirements::requirement_status;
use crate::crd::{ClusterServiceVersion, ConditionReason, Phase};
use crate::install::{
    ClusterStrategyResolver, InstallError, Strategy, StrategyInstaller, StrategyResolver,
};
use crate::Error;

/// Requeue delay for CSVs that are actively progressing through phases
const REQUEUE_INTERVAL: Duration = Duration::from_secs(5);

/// Status message for CSVs superseded by an installed replacement
const REPLACED_MESSAGE: &str =
    "has been replaced by a newer ClusterServiceVersion that has successfully installed.";

/// Controller context containing shared state and clients
///
/// The context is shared across all reconciliation calls and holds
/// resources that are expensive to create (like Kubernetes clients).
pub struct Context {
    /// Cluster access (trait object for testability)
    pub client: Arc<dyn ClusterClient>,
    /// Install strategy parsing and installer construction
    pub strategies: Arc<dyn StrategyResolver>,
    /// Re-check interval for healthy CSVs
    pub wakeup_interval: Duration,
}

impl Context {
    /// Create a new controller context with the given Kubernetes client
    pub fn new(client: Client, wakeup_interval: Duration) -> Self {
        Self {
            client: Arc::new(KubeClusterClient::new(client.clone())),
            strategies: Arc::new(ClusterStrategyResolver::new(client)),
            wakeup_interval,
        }
    }

    /// Create a new controller context with custom client implementations
    ///
    /// This is primarily used for testing with mock clients.
    pub fn with_clients(
        client: Arc<dyn ClusterClient>,
        strategies: Arc<dyn StrategyResolver>,
        wakeup_interval: Duration,
    ) -> Self {
        Self {
            client,
            strategies,
            wakeup_interval,
        }
    }
}

/// Reconcile a ClusterServiceVersion resource
///
/// Runs the state transition, then applies the write-back rule: status is
/// persisted only when the `(phase, reason, message)` triple changed. The
/// `replacing` sentinel short-circuits the tick as a successful no-op
/// because the replacement precondition has already recorded its status.
/// If both the transition and the status write fail, the composite error
/// preserves both messages.
#[instrument(skip(csv, ctx), fields(csv = %csv.name_any(), namespace = %csv.namespace().unwrap_or_default()))]
pub async fn reconcile(
    csv: Arc<ClusterServiceVersion>,
    ctx: Arc<Context>,
) -> Result<Action, Error> {
    info!("syncing");
    let (out, sync_error) = transition_csv_state((*csv).clone(), &ctx).await;

    if matches!(sync_error, Some(Error::Replacing)) {
        return Ok(Action::requeue(REQUEUE_INTERVAL));
    }

    if out.status_summary() != csv.status_summary() {
        if let Err(update_err) = ctx.client.update_status(&out).await {
            return Err(match sync_error {
                None => Error::status_update(update_err.to_string()),
                Some(e) => Error::Sync {
                    transition: e.to_string(),
                    update: update_err.to_string(),
                },
            });
        }
    }

    match sync_error {
        Some(e) => Err(e),
        None => Ok(next_action(csv.phase(), &out, ctx.wakeup_interval)),
    }
}

/// Error policy for the controller
///
/// Called when reconciliation fails; requeues with a delay and lets the
/// controller's rate limiter back off repeated failures.
pub fn error_policy(csv: Arc<ClusterServiceVersion>, error: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        ?error,
        csv = %csv.name_any(),
        "reconciliation failed"
    );
    Action::requeue(REQUEUE_INTERVAL)
}

/// Move a CSV's status state machine along one step
///
/// Takes a copy of the incoming CSV and returns the transitioned copy plus
/// an optional error; the input object is never mutated in place by the
/// controller. The replacement precondition runs first on every invocation.
pub async fn transition_csv_state(
    mut out: ClusterServiceVersion,
    ctx: &Context,
) -> (ClusterServiceVersion, Option<Error>) {
    let name = out.name_any();
    let namespace = out.namespace().unwrap_or_default();

    let csvs = match ctx.client.list_csvs(&namespace).await {
        Ok(csvs) => csvs,
        Err(e) => {
            warn!(error = %e, "unable to list CSVs in namespace");
            Vec::new()
        }
    };

    // Check whether a newer CSV has taken over before running any phase
    // handler; Replacing and Deleting CSVs are already past this point.
    if !matches!(out.phase(), Phase::Replacing | Phase::Deleting) {
        let replacement = ReplacementGraph::new(&csvs)
            .successor(&out)
            .map(|newer| newer.name_any());
        if let Some(newer) = replacement {
            info!(newer = %newer, "newer ClusterServiceVersion replacing, no-op");
            out.set_phase(
                Phase::Replacing,
                ConditionReason::BeingReplaced,
                format!("being replaced by csv: {newer}"),
            );
            if let Err(e) = ctx.client.update_status(&out).await {
                warn!(error = %e, "unable to record replacing status");
            }
            return (out, Some(Error::Replacing));
        }
    }

    match out.phase() {
        Phase::None => {
            info!("scheduling ClusterServiceVersion for requirement verification");
            out.set_phase(
                Phase::Pending,
                ConditionReason::RequirementsUnknown,
                "requirements not yet checked",
            );
            (out, None)
        }
        Phase::Pending => {
            let (met, statuses) = requirement_status(ctx.client.as_ref(), &out).await;
            out.set_requirement_status(statuses);

            if !met {
                info!("requirements were not met");
                out.set_phase(
                    Phase::Pending,
                    ConditionReason::RequirementsNotMet,
                    "one or more requirements couldn't be found",
                );
                return (out, Some(Error::RequirementsNotMet));
            }

            if let Err(conflict) = crd_owner_conflicts(&out, &csvs) {
                out.set_phase(
                    Phase::Failed,
                    ConditionReason::OwnerConflict,
                    format!("owner conflict: {conflict}"),
                );
                return (out, Some(conflict));
            }

            info!("scheduling ClusterServiceVersion for install");
            out.set_phase(
                Phase::InstallReady,
                ConditionReason::RequirementsMet,
                "all requirements found, attempting install",
            );
            (out, None)
        }
        Phase::InstallReady => {
            let Some((installer, strategy)) = parse_strategies(&mut out, &csvs, ctx) else {
                return (out, None);
            };

            if let Err(e) = installer.install(&strategy).await {
                out.set_phase(
                    Phase::Failed,
                    ConditionReason::ComponentFailed,
                    format!("install strategy failed: {e}"),
                );
                return (out, Some(e.into()));
            }

            out.set_phase(
                Phase::Installing,
                ConditionReason::InstallSuccessful,
                "waiting for install components to report healthy",
            );
            (out, None)
        }
        Phase::Installing => {
            let Some((installer, strategy)) = parse_strategies(&mut out, &csvs, ctx) else {
                return (out, None);
            };
            match update_install_status(
                &mut out,
                installer.as_ref(),
                &strategy,
                ConditionReason::Waiting,
            )
            .await
            {
                None => info!(strategy = %strategy.name, "install strategy successful"),
                Some(e) => debug!(error = %e, "install not complete yet"),
            }
            (out, None)
        }
        Phase::Succeeded => {
            let Some((installer, strategy)) = parse_strategies(&mut out, &csvs, ctx) else {
                return (out, None);
            };
            if let Some(e) = update_install_status(
                &mut out,
                installer.as_ref(),
                &strategy,
                ConditionReason::ComponentUnhealthy,
            )
            .await
            {
                info!(strategy = %strategy.name, error = %e, "unhealthy component");
            }
            (out, None)
        }
        Phase::Replacing => {
            // Determine CSVs that are safe to delete by finding a
            // replacement chain ending in a running CSV. Collapse only from
            // the chain root: marking an intermediate first would break the
            // chain for CSVs behind it.
            let is_root = ReplacementGraph::new(&csvs).predecessor(&out).is_none();
            if !is_root {
                debug!("being replaced, but is not the chain root; skipping gc");
                return (out, None);
            }

            let intermediates = find_intermediates_for_deletion(&out, &csvs, ctx).await;
            for intermediate in &intermediates {
                if *intermediate == name {
                    out.set_phase(Phase::Deleting, ConditionReason::Replaced, REPLACED_MESSAGE);
                } else if let Some(other) = csvs.iter().find(|c| c.name_any() == *intermediate) {
                    let mut other = other.clone();
                    other.set_phase(Phase::Deleting, ConditionReason::Replaced, REPLACED_MESSAGE);
                    if let Err(e) = ctx.client.update_status(&other).await {
                        warn!(
                            csv = %intermediate,
                            error = %e,
                            "unable to mark replaced CSV for deletion"
                        );
                    }
                }
            }
            // with no installed replacement yet, requeue until the chain
            // terminates in one
            (out, None)
        }
        Phase::Deleting => {
            if let Err(e) = ctx.client.delete_csv(&namespace, &name).await {
                warn!(error = %e, "unable to delete csv marked for deletion");
            }
            (out, None)
        }
        Phase::Failed => {
            debug!("failed, awaiting spec change");
            (out, None)
        }
    }
}

/// Parse the CSV's install strategy and build an installer for it
///
/// Returns `None` after recording `Failed/InvalidStrategy` when the blob
/// does not parse. When the CSV replaces a predecessor that still exists,
/// the predecessor's strategy is parsed and handed to the installer so it
/// can take over existing components.
fn parse_strategies(
    out: &mut ClusterServiceVersion,
    csvs_in_namespace: &[ClusterServiceVersion],
    ctx: &Context,
) -> Option<(Arc<dyn StrategyInstaller>, Strategy)> {
    let strategy = match ctx.strategies.unmarshal(&out.spec.install) {
        Ok(strategy) => strategy,
        Err(e) => {
            out.set_phase(
                Phase::Failed,
                ConditionReason::InvalidStrategy,
                format!("install strategy invalid: {e}"),
            );
            return None;
        }
    };

    let previous = out
        .spec
        .replaces
        .as_deref()
        .and_then(|replaces| csvs_in_namespace.iter().find(|c| c.name_any() == replaces))
        .and_then(|prev| ctx.strategies.unmarshal(&prev.spec.install).ok());

    let installer = ctx.strategies.installer_for(&strategy.name, out, previous);
    Some((installer, strategy))
}

/// Re-check install health and move the phase accordingly
///
/// Healthy components settle in `Succeeded`; an unrecoverable check fails
/// the CSV; a recoverable error drops back to `Installing` with the given
/// reason and the error is returned for logging.
async fn update_install_status(
    out: &mut ClusterServiceVersion,
    installer: &dyn StrategyInstaller,
    strategy: &Strategy,
    waiting_reason: ConditionReason,
) -> Option<InstallError> {
    match installer.check_installed(strategy).await {
        Ok(true) => {
            if out.phase() != Phase::Succeeded {
                out.set_phase(
                    Phase::Succeeded,
                    ConditionReason::InstallSuccessful,
                    "install strategy completed with no errors",
                );
            }
            None
        }
        // components missing with nothing to report; re-checked on requeue
        Ok(false) => None,
        Err(e) if e.is_unrecoverable() => {
            out.set_phase(
                Phase::Failed,
                ConditionReason::InstallCheckFailed,
                format!("install failed: {e}"),
            );
            Some(e)
        }
        Err(e) => {
            out.set_phase(Phase::Installing, waiting_reason, format!("installing: {e}"));
            Some(e)
        }
    }
}

/// Walk the replacement chain forward from `csv` until a running, current
/// replacement is found
///
/// Returns the names of every chain link before the installed one (starting
/// with `csv` itself); empty when no replacement has installed yet.
async fn find_intermediates_for_deletion(
    csv: &ClusterServiceVersion,
    csvs_in_namespace: &[ClusterServiceVersion],
    ctx: &Context,
) -> Vec<String> {
    let graph = ReplacementGraph::new(csvs_in_namespace);
    let mut chain = Vec::new();
    let mut hops = 0;
    let mut current = csv;

    while let Some(next) = graph.successor(current) {
        chain.push(current.name_any());
        debug!(
            candidate = %next.name_any(),
            "checking whether replacement is running"
        );

        if let Ok(strategy) = ctx.strategies.unmarshal(&next.spec.install) {
            let installer = ctx.strategies.installer_for(&strategy.name, next, None);
            let installed = matches!(installer.check_installed(&strategy).await, Ok(true));
            if installed && !next.is_obsolete() {
                return chain;
            }
        }

        hops += 1;
        if hops > csvs_in_namespace.len() {
            break;
        }
        current = next;
    }
    Vec::new()
}

/// Requeue schedule for a successfully transitioned CSV
fn next_action(in_phase: Phase, out: &ClusterServiceVersion, wakeup_interval: Duration) -> Action {
    match out.phase() {
        Phase::None
        | Phase::Pending
        | Phase::InstallReady
        | Phase::Installing
        | Phase::Replacing => Action::requeue(REQUEUE_INTERVAL),
        Phase::Succeeded => Action::requeue(wakeup_interval),
        // revisit quickly to issue the delete; after that the eventual 404
        // resolves the loop without re-enqueueing
        Phase::Deleting if in_phase != Phase::Deleting => Action::requeue(REQUEUE_INTERVAL),
        Phase::Deleting | Phase::Failed => Action::await_change(),
    }
}
