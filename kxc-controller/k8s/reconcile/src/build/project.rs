use super::owner_ref;
use crate::{
    k8s::{
        labels, LabelSelector, Namespace, NetworkPolicy, NetworkPolicyIngressRule,
        NetworkPolicyPeer, NetworkPolicySpec, ObjectMeta, Project, ResourceExt,
    },
    ClusterInfo, Result,
};

/// Name of the isolation policy created in every Project namespace.
pub const NETWORK_POLICY_NAME: &str = "allow-from-same-namespace-and-ingress";

/// Label set by the API server on every namespace, holding its name.
const NAMESPACE_NAME_LABEL: &str = "kubernetes.io/metadata.name";

/// Builds the namespace in which the Project's Apps live.
pub fn namespace(project: &Project) -> Result<Namespace> {
    Ok(Namespace {
        metadata: ObjectMeta {
            name: Some(project.namespace_name()),
            labels: Some(labels::for_namespace(&project.name_any())),
            owner_references: Some(vec![owner_ref(project)?]),
            ..Default::default()
        },
        ..Default::default()
    })
}

/// Builds the policy isolating the Project's namespace.
///
/// Every pod in the namespace accepts traffic only from pods in the same
/// namespace and from the ingress controller's namespace.
pub fn network_policy(project: &Project, cluster: &ClusterInfo) -> Result<NetworkPolicy> {
    let same_namespace = NetworkPolicyPeer {
        pod_selector: Some(LabelSelector::default()),
        ..Default::default()
    };
    let ingress_controller = NetworkPolicyPeer {
        namespace_selector: Some(LabelSelector {
            match_labels: Some(
                Some((
                    NAMESPACE_NAME_LABEL.to_string(),
                    cluster.ingress_namespace.clone(),
                ))
                .into_iter()
                .collect(),
            ),
            ..Default::default()
        }),
        ..Default::default()
    };

    Ok(NetworkPolicy {
        metadata: ObjectMeta {
            name: Some(NETWORK_POLICY_NAME.to_string()),
            namespace: Some(project.namespace_name()),
            labels: Some(labels::for_namespace(&project.name_any())),
            owner_references: Some(vec![owner_ref(project)?]),
            ..Default::default()
        },
        // The default pod selector selects every pod in the namespace.
        spec: Some(NetworkPolicySpec {
            policy_types: Some(vec!["Ingress".to_string()]),
            ingress: Some(vec![
                NetworkPolicyIngressRule {
                    from: Some(vec![same_namespace]),
                    ..Default::default()
                },
                NetworkPolicyIngressRule {
                    from: Some(vec![ingress_controller]),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        }),
        ..Default::default()
    })
}
