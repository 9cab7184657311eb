use crate::{
    k8s::{
        labels, App, Deployment, Ingress, Namespace, NetworkPolicy, Project, Resource,
        ResourceExt, Service,
    },
    lease::{Leadership, LEASE_DURATION},
    reconcile::{AppReconciler, Error, KubeStore, Outcome, ProjectReconciler, ReconcileMetrics},
};
use futures::prelude::*;
use kube::{
    runtime::{
        controller::{Action, Controller},
        reflector::ObjectRef,
        watcher,
    },
    Api, Client,
};
use std::{fmt, sync::Arc};
use tokio::time;
use tracing::{info_span, Instrument};

const PROJECT: &str = "Project";
const APP: &str = "App";

/// State shared by every reconcile pass.
pub(crate) struct Context {
    pub(crate) projects: ProjectReconciler<KubeStore>,
    pub(crate) apps: AppReconciler<KubeStore>,
    pub(crate) metrics: ReconcileMetrics,

    /// Unset when leader election is disabled.
    pub(crate) leadership: Option<Leadership>,

    /// Delay before re-running a pass that wrote to the cluster.
    pub(crate) requeue_delay: time::Duration,

    /// Delay before retrying a pass that failed.
    pub(crate) error_requeue: time::Duration,
}

/// Runs the Project controller until the runtime begins shutting down.
///
/// Namespaces are cluster-scoped like their Project and are tracked through
/// their owner reference directly. Policies live in the Project's namespace,
/// so they are mapped back to their owner explicitly.
pub(crate) async fn projects(client: Client, ctx: Arc<Context>, drain: drain::Watch) {
    let owned = watcher::Config::default().labels(labels::PROJECT);
    let controller = Controller::new(Api::<Project>::all(client.clone()), Default::default())
        .owns(Api::<Namespace>::all(client.clone()), owned.clone())
        .watches(Api::<NetworkPolicy>::all(client), owned, owning_project)
        .run(reconcile_project, error_policy, ctx)
        .for_each(log_result);
    run_until_drained(controller, drain).await
}

/// Runs the App controller until the runtime begins shutting down.
pub(crate) async fn apps(client: Client, ctx: Arc<Context>, drain: drain::Watch) {
    let owned = watcher::Config::default().labels(labels::PROJECT);
    let controller = Controller::new(Api::<App>::all(client.clone()), Default::default())
        .owns(Api::<Deployment>::all(client.clone()), owned.clone())
        .owns(Api::<Service>::all(client.clone()), owned.clone())
        .owns(Api::<Ingress>::all(client), owned)
        .run(reconcile_app, error_policy, ctx)
        .for_each(log_result);
    run_until_drained(controller, drain).await
}

async fn run_until_drained(controller: impl Future<Output = ()>, drain: drain::Watch) {
    tokio::select! {
        _ = controller => {}
        release = drain.signaled() => {
            tracing::debug!("Stopping controller");
            drop(release);
        }
    }
}

async fn reconcile_project(project: Arc<Project>, ctx: Arc<Context>) -> Result<Action, Error> {
    let started = time::Instant::now();
    if !ctx.is_leader() {
        return Ok(ctx.standby(PROJECT, started));
    }

    let name = project.name_any();
    let result = ctx
        .projects
        .reconcile(&name)
        .instrument(info_span!("project", %name))
        .await;
    ctx.complete(PROJECT, result, started)
}

async fn reconcile_app(app: Arc<App>, ctx: Arc<Context>) -> Result<Action, Error> {
    let started = time::Instant::now();
    if !ctx.is_leader() {
        return Ok(ctx.standby(APP, started));
    }

    let namespace = app.namespace().unwrap_or_default();
    let name = app.name_any();
    let result = ctx
        .apps
        .reconcile(&namespace, &name)
        .instrument(info_span!("app", %namespace, %name))
        .await;
    ctx.complete(APP, result, started)
}

fn error_policy<K>(obj: Arc<K>, error: &Error, ctx: Arc<Context>) -> Action
where
    K: Resource<DynamicType = ()>,
{
    tracing::warn!(
        kind = %K::kind(&()),
        namespace = ?obj.namespace(),
        name = %obj.name_any(),
        %error,
        "Reconcile failed; retrying",
    );
    Action::requeue(ctx.error_requeue)
}

/// Maps a policy to the Project that controls it, if any.
fn owning_project(policy: NetworkPolicy) -> Option<ObjectRef<Project>> {
    policy
        .owner_references()
        .iter()
        .find(|owner| {
            owner.controller == Some(true)
                && owner.kind == Project::kind(&())
                && owner.api_version == Project::api_version(&())
        })
        .map(|owner| ObjectRef::new(&owner.name))
}

async fn log_result<K, E>(result: Result<(ObjectRef<K>, Action), E>)
where
    K: Resource,
    K::DynamicType: fmt::Debug,
    E: fmt::Display,
{
    match result {
        Ok((obj, action)) => tracing::trace!(?obj, ?action, "Reconciled"),
        Err(error) => tracing::debug!(%error, "Controller error"),
    }
}

// === impl Context ===

impl Context {
    fn is_leader(&self) -> bool {
        self.leadership
            .as_ref()
            .map_or(true, |leadership| leadership.is_leader())
    }

    /// Another replica holds the lease; check again once it may have expired.
    fn standby(&self, kind: &'static str, started: time::Instant) -> Action {
        self.metrics.observe(kind, "standby", started);
        Action::requeue(LEASE_DURATION)
    }

    fn complete(
        &self,
        kind: &'static str,
        result: Result<Outcome, Error>,
        started: time::Instant,
    ) -> Result<Action, Error> {
        match result {
            Ok(outcome) => {
                self.metrics.observe(kind, outcome.as_str(), started);
                Ok(match outcome {
                    Outcome::Requeue => Action::requeue(self.requeue_delay),
                    Outcome::Done => Action::await_change(),
                })
            }
            Err(error) => {
                self.metrics.observe(kind, "error", started);
                Err(error)
            }
        }
    }
}
