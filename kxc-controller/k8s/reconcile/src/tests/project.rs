use super::*;
use crate::{
    build::project::NETWORK_POLICY_NAME,
    k8s::{Namespace, NetworkPolicy},
    ProjectReconciler, ResourceId,
};
use pretty_assertions::assert_eq;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Dependent {
    Namespace,
    NetworkPolicy,
}

fn namespace_id() -> ResourceId {
    ResourceId::cluster(NAMESPACE)
}

fn policy_id() -> ResourceId {
    ResourceId::namespaced(NAMESPACE, NETWORK_POLICY_NAME)
}

fn reconciler(store: &MemoryStore) -> ProjectReconciler<MemoryStore> {
    ProjectReconciler::new(store.clone(), cluster())
}

#[tokio::test]
async fn project_creates_namespace_then_policy() {
    let store = MemoryStore::default();
    let project = store.insert(mk_project(PROJECT));
    let reconciler = reconciler(&store);

    assert_eq!(reconciler.reconcile(PROJECT).await.unwrap(), Outcome::Requeue);
    assert_eq!(store.writes(), vec![Write::create::<Namespace>(&namespace_id())]);

    assert_eq!(reconciler.reconcile(PROJECT).await.unwrap(), Outcome::Requeue);
    assert_eq!(
        store.writes(),
        vec![
            Write::create::<Namespace>(&namespace_id()),
            Write::create::<NetworkPolicy>(&policy_id()),
        ]
    );

    assert_eq!(reconciler.reconcile(PROJECT).await.unwrap(), Outcome::Done);
    assert_eq!(store.writes().len(), 2, "a converged project must not be written");

    let ns = store.object::<Namespace>(&namespace_id()).unwrap();
    assert_eq!(
        ns.metadata.labels,
        Some(btreemap! {
            "app".to_string() => "kxc".to_string(),
            "project".to_string() => "acme".to_string(),
        })
    );

    let policy = store.object::<NetworkPolicy>(&policy_id()).unwrap();
    assert_eq!(policy.metadata.namespace.as_deref(), Some(NAMESPACE));

    for owners in [ns.metadata.owner_references, policy.metadata.owner_references] {
        let owners = owners.expect("dependents must be owned");
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].kind, "Project");
        assert_eq!(Some(&owners[0].uid), project.metadata.uid.as_ref());
        assert_eq!(owners[0].controller, Some(true));
    }
}

#[tokio::test]
async fn missing_project_is_done() {
    let store = MemoryStore::default();
    let outcome = reconciler(&store).reconcile("gone").await.unwrap();
    assert_eq!(outcome, Outcome::Done);
    assert!(store.writes().is_empty());
}

#[tokio::test]
async fn project_recreates_only_missing_dependents() {
    for missing in subsets(&[Dependent::Namespace, Dependent::NetworkPolicy]) {
        let store = MemoryStore::default();
        store.insert(mk_project(PROJECT));
        let reconciler = reconciler(&store);
        converge(|| reconciler.reconcile(PROJECT)).await;

        for dependent in &missing {
            match dependent {
                Dependent::Namespace => store.remove::<Namespace>(&namespace_id()),
                Dependent::NetworkPolicy => store.remove::<NetworkPolicy>(&policy_id()),
            }
        }
        store.clear_writes();

        converge(|| reconciler.reconcile(PROJECT)).await;
        let recreated = missing
            .iter()
            .map(|dependent| match dependent {
                Dependent::Namespace => Write::create::<Namespace>(&namespace_id()),
                Dependent::NetworkPolicy => Write::create::<NetworkPolicy>(&policy_id()),
            })
            .collect::<Vec<_>>();
        assert_eq!(store.writes(), recreated, "missing {missing:?}");
    }
}

#[tokio::test]
async fn project_retries_after_conflict() {
    let store = MemoryStore::default();
    store.insert(mk_project(PROJECT));
    let reconciler = reconciler(&store);

    store.conflict_next_write();
    let error = reconciler.reconcile(PROJECT).await.unwrap_err();
    assert!(
        matches!(&error, crate::Error::Store(e) if e.is_conflict()),
        "unexpected error: {error}"
    );
    assert!(store.writes().is_empty());

    assert_eq!(converge(|| reconciler.reconcile(PROJECT)).await, 3);
    assert!(store.object::<NetworkPolicy>(&policy_id()).is_some());
}

#[tokio::test]
async fn policy_admits_configured_ingress_namespace() {
    let store = MemoryStore::default();
    store.insert(mk_project(PROJECT));
    let reconciler = reconciler(&store);
    converge(|| reconciler.reconcile(PROJECT)).await;

    let policy = store.object::<NetworkPolicy>(&policy_id()).unwrap();
    let peers = policy
        .spec
        .and_then(|spec| spec.ingress)
        .unwrap_or_default()
        .into_iter()
        .flat_map(|rule| rule.from.unwrap_or_default())
        .filter_map(|peer| peer.namespace_selector?.match_labels)
        .collect::<Vec<_>>();
    assert_eq!(
        peers,
        vec![btreemap! {
            "kubernetes.io/metadata.name".to_string() => "ingress-nginx".to_string(),
        }]
    );
}
