use crate::{
    build, diff,
    k8s::{labels, App, AppStatus, Deployment, Ingress, ObjectMeta, PodSpec, Service},
    ClusterInfo, Outcome, ResourceId, Result, Store,
};
use std::sync::Arc;

/// Converges an App's Deployment, Service, optional Ingress, and status.
pub struct AppReconciler<S> {
    store: S,
    cluster: Arc<ClusterInfo>,
}

/// The result of converging a single dependent.
enum Step<T> {
    /// The dependent matches its target.
    Converged(T),

    /// The dependent was created or updated.
    Mutated,
}

impl<S: Store> AppReconciler<S> {
    pub fn new(store: S, cluster: Arc<ClusterInfo>) -> Self {
        Self { store, cluster }
    }

    /// Runs a single pass for the named App.
    ///
    /// Dependents are checked in a fixed order (Deployment, Service, Ingress,
    /// then status). The first mismatch is corrected and the pass ends, so
    /// each pass makes at most one write.
    pub async fn reconcile(&self, namespace: &str, name: &str) -> Result<Outcome> {
        let Some(app) = self
            .store
            .get::<App>(&ResourceId::namespaced(namespace, name))
            .await?
        else {
            tracing::debug!(%namespace, %name, "App not found; it must have been deleted");
            return Ok(Outcome::Done);
        };

        let deployment = match self.converge_deployment(&app).await? {
            Step::Converged(deployment) => deployment,
            Step::Mutated => return Ok(Outcome::Requeue),
        };

        if let Step::Mutated = self.converge_service(&app).await? {
            return Ok(Outcome::Requeue);
        }

        if let Step::Mutated = self.converge_ingress(&app).await? {
            return Ok(Outcome::Requeue);
        }

        let mut status = app.status.clone().unwrap_or_default();
        let url = build::app::external_url(&app, &self.cluster);
        if status.external_url != url {
            tracing::info!(%namespace, %name, old = ?status.external_url, new = ?url, "Updating App external URL");
            status.external_url = url;
            self.update_status(app, status).await?;
            return Ok(Outcome::Requeue);
        }

        if !diff::replica_status_eq(&status, &deployment) {
            let (available, unavailable) = diff::replica_status(&deployment);
            tracing::info!(%namespace, %name, available, unavailable, "Updating App replica status");
            status.available_replicas = available;
            status.unavailable_replicas = unavailable;
            // Later Deployment status changes trigger a new pass on their own.
            self.update_status(app, status).await?;
            return Ok(Outcome::Done);
        }

        tracing::debug!(%namespace, %name, "App converged");
        Ok(Outcome::Done)
    }

    async fn converge_deployment(&self, app: &App) -> Result<Step<Deployment>> {
        let target = build::app::deployment(app)?;
        let id = ResourceId::of(&target);

        let Some(mut dep) = self.store.get::<Deployment>(&id).await? else {
            tracing::info!(namespace = ?id.namespace, name = %id.name, "Creating Deployment");
            self.store.create(&target).await?;
            return Ok(Step::Mutated);
        };

        if !diff::replicas_eq(&dep, &target) {
            let replicas = diff::replicas(&target);
            tracing::info!(
                namespace = ?id.namespace,
                name = %id.name,
                old = ?diff::replicas(&dep),
                new = ?replicas,
                "Updating Deployment replicas",
            );
            dep.spec.get_or_insert_with(Default::default).replicas = replicas;
            self.store.update(&dep).await?;
            return Ok(Step::Mutated);
        }

        let containers = diff::template_containers(&target);
        if !diff::containers_eq(diff::template_containers(&dep), containers) {
            tracing::info!(namespace = ?id.namespace, name = %id.name, "Updating Deployment containers");
            let containers = containers.to_vec();
            pod_spec_mut(&mut dep).containers = containers;
            self.store.update(&dep).await?;
            return Ok(Step::Mutated);
        }

        if !diff::restart_marker_eq(&dep, &target) {
            tracing::info!(namespace = ?id.namespace, name = %id.name, "Restarting Deployment");
            let marker = diff::restart_marker(&target).map(str::to_string);
            let annotations = template_metadata_mut(&mut dep)
                .annotations
                .get_or_insert_with(Default::default);
            match marker {
                Some(marker) => {
                    annotations.insert(labels::RESTARTED_AT_ANNOTATION.to_string(), marker);
                }
                None => {
                    annotations.remove(labels::RESTARTED_AT_ANNOTATION);
                }
            }
            self.store.update(&dep).await?;
            return Ok(Step::Mutated);
        }

        Ok(Step::Converged(dep))
    }

    async fn converge_service(&self, app: &App) -> Result<Step<()>> {
        let target = build::app::service(app)?;
        let id = ResourceId::of(&target);

        let Some(mut svc) = self.store.get::<Service>(&id).await? else {
            tracing::info!(namespace = ?id.namespace, name = %id.name, "Creating Service");
            self.store.create(&target).await?;
            return Ok(Step::Mutated);
        };

        let ports = target.spec.and_then(|s| s.ports).unwrap_or_default();
        let observed = svc.spec.as_ref().and_then(|s| s.ports.as_deref());
        if !diff::service_ports_eq(observed.unwrap_or_default(), &ports) {
            tracing::info!(namespace = ?id.namespace, name = %id.name, "Updating Service ports");
            svc.spec.get_or_insert_with(Default::default).ports = Some(ports);
            self.store.update(&svc).await?;
            return Ok(Step::Mutated);
        }

        Ok(Step::Converged(()))
    }

    /// Ensures the Ingress exists and routes to the exposed port. Apps that
    /// expose no port are left alone; a previously created Ingress is only
    /// removed with the App.
    async fn converge_ingress(&self, app: &App) -> Result<Step<()>> {
        let Some(target) = build::app::ingress(app, &self.cluster)? else {
            return Ok(Step::Converged(()));
        };
        let id = ResourceId::of(&target);

        let Some(mut ingress) = self.store.get::<Ingress>(&id).await? else {
            tracing::info!(namespace = ?id.namespace, name = %id.name, "Creating Ingress");
            self.store.create(&target).await?;
            return Ok(Step::Mutated);
        };

        if !diff::ingress_eq(&ingress, &target) {
            tracing::info!(namespace = ?id.namespace, name = %id.name, "Updating Ingress");
            let target = target.spec.unwrap_or_default();
            let spec = ingress.spec.get_or_insert_with(Default::default);
            spec.rules = target.rules;
            if target.ingress_class_name.is_some() {
                spec.ingress_class_name = target.ingress_class_name;
            }
            self.store.update(&ingress).await?;
            return Ok(Step::Mutated);
        }

        Ok(Step::Converged(()))
    }

    async fn update_status(&self, mut app: App, status: AppStatus) -> Result<()> {
        app.status = Some(status);
        self.store.update_status(&app).await?;
        Ok(())
    }
}

fn pod_spec_mut(dep: &mut Deployment) -> &mut PodSpec {
    dep.spec
        .get_or_insert_with(Default::default)
        .template
        .spec
        .get_or_insert_with(Default::default)
}

fn template_metadata_mut(dep: &mut Deployment) -> &mut ObjectMeta {
    dep.spec
        .get_or_insert_with(Default::default)
        .template
        .metadata
        .get_or_insert_with(Default::default)
}
