use crate::{
    build::{self, project::NETWORK_POLICY_NAME},
    k8s::{Namespace, NetworkPolicy, Project},
    ClusterInfo, Outcome, ResourceId, Result, Store,
};
use std::sync::Arc;

/// Converges a Project's namespace and network isolation policy.
pub struct ProjectReconciler<S> {
    store: S,
    cluster: Arc<ClusterInfo>,
}

impl<S: Store> ProjectReconciler<S> {
    pub fn new(store: S, cluster: Arc<ClusterInfo>) -> Self {
        Self { store, cluster }
    }

    /// Runs a single pass for the named Project.
    ///
    /// The namespace must exist before the policy can be created within it,
    /// so each missing object is created in its own pass.
    pub async fn reconcile(&self, name: &str) -> Result<Outcome> {
        let Some(project) = self
            .store
            .get::<Project>(&ResourceId::cluster(name))
            .await?
        else {
            tracing::debug!(%name, "Project not found; it must have been deleted");
            return Ok(Outcome::Done);
        };

        let namespace = project.namespace_name();
        if self
            .store
            .get::<Namespace>(&ResourceId::cluster(&namespace))
            .await?
            .is_none()
        {
            let ns = build::project::namespace(&project)?;
            tracing::info!(%namespace, "Creating Namespace");
            self.store.create(&ns).await?;
            return Ok(Outcome::Requeue);
        }

        let policy_id = ResourceId::namespaced(&namespace, NETWORK_POLICY_NAME);
        if self
            .store
            .get::<NetworkPolicy>(&policy_id)
            .await?
            .is_none()
        {
            let policy = build::project::network_policy(&project, &self.cluster)?;
            tracing::info!(%namespace, name = %NETWORK_POLICY_NAME, "Creating NetworkPolicy");
            self.store.create(&policy).await?;
            return Ok(Outcome::Requeue);
        }

        tracing::debug!(%namespace, "Project converged");
        Ok(Outcome::Done)
    }
}
