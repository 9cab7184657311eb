#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Converges the cluster objects derived from declared Projects and Apps.
//!
//! Every reconcile pass re-derives its targets from the declared object and
//! the currently observed dependents, performs at most one mutating call, and
//! reports whether it should be re-invoked. No state survives between passes,
//! so duplicate, reordered, or abandoned passes are harmless.

mod app;
pub mod build;
pub mod diff;
mod metrics;
mod project;
mod resource_id;
pub mod store;

#[cfg(test)]
mod tests;

pub use self::{
    app::AppReconciler,
    metrics::ReconcileMetrics,
    project::ProjectReconciler,
    resource_id::ResourceId,
    store::{KubeStore, Object, Store, StoreError},
};
pub use kxc_controller_k8s_api as k8s;

pub const DEFAULT_ROOT_DOMAIN: &str = "127.0.0.1.xip.io";
pub const DEFAULT_INGRESS_NAMESPACE: &str = "kube-system";

/// Cluster-wide settings consumed when deriving target objects.
///
/// Built once at startup and shared, read-only, by every reconciler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterInfo {
    /// Suffix of every App's external host name.
    pub root_domain: String,

    /// Namespace of the ingress controller, whose pods may reach every
    /// Project's workloads.
    pub ingress_namespace: String,

    /// Set as the `ingressClassName` of derived Ingresses, if configured.
    pub ingress_class: Option<String>,
}

/// What the driver should do once a pass completes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// A dependent object was written; re-run the pass to continue
    /// converging.
    Requeue,

    /// Nothing more to do until the object or one of its dependents changes.
    Done,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{kind} {id} has no {field}")]
    MissingMetadata {
        kind: String,
        id: ResourceId,
        field: &'static str,
    },

    #[error("cannot determine the Project of App {namespace}/{name}")]
    UnknownProject { namespace: String, name: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

// === impl ClusterInfo ===

impl Default for ClusterInfo {
    fn default() -> Self {
        Self {
            root_domain: DEFAULT_ROOT_DOMAIN.to_string(),
            ingress_namespace: DEFAULT_INGRESS_NAMESPACE.to_string(),
            ingress_class: None,
        }
    }
}

// === impl Outcome ===

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requeue => "requeue",
            Self::Done => "done",
        }
    }
}
