use crate::labels;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A tenant boundary. Each Project is realized as a namespace and a network
/// isolation policy within it.
#[derive(Clone, Debug, Default, PartialEq, Eq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(group = "cloud.kubexcloud.com", version = "v1alpha1", kind = "Project")]
pub struct ProjectSpec {}

// === impl Project ===

impl Project {
    /// The UserAccount that owns this Project, if labeled.
    pub fn owner_user(&self) -> Option<&str> {
        self.labels().get(labels::USER_ACCOUNT).map(String::as_str)
    }

    /// The namespace in which the Project's workloads live.
    pub fn namespace_name(&self) -> String {
        crate::project_namespace_name(&self.name_any())
    }
}
