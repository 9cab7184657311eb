#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod cloud;
pub mod labels;

pub use self::cloud::{
    App, AppSpec, AppStatus, Project, ProjectSpec, UserAccount, UserAccountSpec,
};
pub use k8s_openapi::{
    api::{
        self,
        apps::v1::{Deployment, DeploymentSpec, DeploymentStatus},
        core::v1::{
            Container, ContainerPort, Namespace, PodSpec, PodTemplateSpec, Service, ServicePort,
            ServiceSpec,
        },
        networking::v1::{
            HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
            IngressServiceBackend, IngressSpec, NetworkPolicy, NetworkPolicyIngressRule,
            NetworkPolicyPeer, NetworkPolicySpec, ServiceBackendPort,
        },
    },
    apimachinery::pkg::apis::meta::v1::{LabelSelector, OwnerReference},
    ClusterResourceScope, NamespaceResourceScope,
};
pub use kube::core::{CustomResourceExt, ObjectMeta, Resource, ResourceExt};

/// Every Project is realized as a namespace named with this prefix followed
/// by the Project name, keeping tenant namespaces clear of the
/// orchestrator-reserved ones.
pub const PROJECT_NAMESPACE_PREFIX: &str = "kxc-proj-";

/// Returns the name of the namespace that realizes the named Project.
pub fn project_namespace_name(project: &str) -> String {
    format!("{PROJECT_NAMESPACE_PREFIX}{project}")
}

/// Returns the Project name realized by the given namespace, if it was
/// created for a Project.
pub fn project_name_from_namespace(namespace: &str) -> Option<&str> {
    namespace
        .strip_prefix(PROJECT_NAMESPACE_PREFIX)
        .filter(|name| !name.is_empty())
}
