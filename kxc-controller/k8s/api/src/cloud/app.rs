use crate::labels;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::{fmt, num::NonZeroU16};

/// A deployable workload within a Project's namespace.
#[derive(Clone, Debug, PartialEq, Eq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "cloud.kubexcloud.com",
    version = "v1alpha1",
    kind = "App",
    status = "AppStatus",
    namespaced,
    printcolumn = r#"{"name":"ExternalURL","type":"string","jsonPath":".status.externalUrl"}"#,
    printcolumn = r#"{"name":"AvailableReplicas","type":"integer","jsonPath":".status.availableReplicas"}"#,
    printcolumn = r#"{"name":"UnavailableReplicas","type":"integer","jsonPath":".status.unavailableReplicas"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AppSpec {
    #[schemars(range(min = 0))]
    pub replicas: i32,

    #[schemars(length(min = 1))]
    pub containers: Vec<Container>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub image: String,
    pub name: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<Port>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Port {
    pub number: NonZeroU16,
    pub protocol: Protocol,

    /// Only meaningful for HTTP served over TCP.
    #[serde(default)]
    pub expose_externally: bool,
}

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum Protocol {
    #[serde(rename = "TCP")]
    Tcp,
    #[serde(rename = "UDP")]
    Udp,
}

/// Observed state, written only by the controller.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppStatus {
    /// Serialized as `null` when unset so that merging the status clears a
    /// stale URL.
    #[serde(default)]
    pub external_url: Option<String>,

    #[serde(default)]
    pub available_replicas: i32,

    #[serde(default)]
    pub unavailable_replicas: i32,
}

// === impl App ===

impl App {
    /// The Project this App belongs to.
    ///
    /// Apps are labeled with their Project when they are declared; an
    /// unlabeled App falls back to the Project that its namespace realizes.
    pub fn project_name(&self) -> Option<String> {
        if let Some(project) = self.labels().get(labels::PROJECT) {
            return Some(project.clone());
        }
        self.namespace()
            .as_deref()
            .and_then(crate::project_name_from_namespace)
            .map(Into::into)
    }

    /// The opaque value whose change forces the App's pods to restart.
    pub fn restart_marker(&self) -> Option<&str> {
        self.annotations()
            .get(labels::RESTARTED_AT_ANNOTATION)
            .map(String::as_str)
    }
}

// === impl Protocol ===

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ObjectMeta;
    use maplit::btreemap;

    fn app(namespace: &str, labels: Option<labels::Map>) -> App {
        App {
            metadata: ObjectMeta {
                name: Some("web".to_string()),
                namespace: Some(namespace.to_string()),
                labels,
                ..Default::default()
            },
            spec: AppSpec {
                replicas: 1,
                containers: vec![],
            },
            status: None,
        }
    }

    #[test]
    fn project_from_label_or_namespace() {
        let labeled = app("kxc-proj-ns", Some(labels::for_app("label", "web")));
        assert_eq!(labeled.project_name().as_deref(), Some("label"));

        let unlabeled = app("kxc-proj-acme", None);
        assert_eq!(unlabeled.project_name().as_deref(), Some("acme"));

        let stray = app("default", None);
        assert_eq!(stray.project_name(), None);
    }

    #[test]
    fn deserializes_declared_spec() {
        let app: App = serde_json::from_value(serde_json::json!({
            "apiVersion": "cloud.kubexcloud.com/v1alpha1",
            "kind": "App",
            "metadata": {
                "name": "web",
                "namespace": "kxc-proj-acme",
                "annotations": { "cloud.kubexcloud.com/restartedAt": "2020-01-01T00:00:00Z" },
            },
            "spec": {
                "replicas": 2,
                "containers": [{
                    "image": "busybox",
                    "name": "busybox",
                    "ports": [{ "number": 9123, "protocol": "TCP", "exposeExternally": true }],
                }],
            },
        }))
        .expect("App must deserialize");

        assert_eq!(app.spec.replicas, 2);
        assert!(app.spec.containers[0].command.is_empty());
        assert_eq!(
            app.spec.containers[0].ports,
            vec![Port {
                number: NonZeroU16::new(9123).unwrap(),
                protocol: Protocol::Tcp,
                expose_externally: true,
            }]
        );
        assert_eq!(app.restart_marker(), Some("2020-01-01T00:00:00Z"));
        assert_eq!(
            app.annotations().clone(),
            btreemap! {
                "cloud.kubexcloud.com/restartedAt".to_string() => "2020-01-01T00:00:00Z".to_string(),
            }
        );
    }
}
