pub mod app;
pub mod project;
pub mod user_account;

pub use self::{
    app::{App, AppSpec, AppStatus, Container, Port, Protocol},
    project::{Project, ProjectSpec},
    user_account::{Role, UserAccount, UserAccountSpec},
};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::CustomResourceExt;

/// Returns the CRD manifests for every platform resource.
pub fn crds() -> Vec<CustomResourceDefinition> {
    vec![Project::crd(), App::crd(), UserAccount::crd()]
}
