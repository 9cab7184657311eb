use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// An API identity. Projects reference it only through their
/// `user_account` label; nothing here is reconciled.
#[derive(Clone, Debug, PartialEq, Eq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "cloud.kubexcloud.com",
    version = "v1alpha1",
    kind = "UserAccount",
    printcolumn = r#"{"name":"Role","type":"string","jsonPath":".spec.role"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct UserAccountSpec {
    /// Password hash.
    pub password: String,
    pub role: Role,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Regular,
    Admin,
}
