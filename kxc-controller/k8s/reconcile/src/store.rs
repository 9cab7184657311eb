//! The object store capability consumed by the reconcilers.
//!
//! Reconcilers only ever read, create, and replace whole objects (or their
//! status sub-resource) by name. Updates carry the observed
//! `resourceVersion`, so a concurrent writer causes the update to fail with
//! [`StoreError::Conflict`] rather than be silently overwritten.

use crate::{
    k8s::{labels, ClusterResourceScope, NamespaceResourceScope},
    ResourceId,
};
use kube::{
    api::{Api, ListParams, Patch, PatchParams, PostParams},
    Client, Resource,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::{fmt, future::Future};
use tokio::time;

pub const FIELD_MANAGER: &str = "kxc-controller";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: String, id: ResourceId },

    #[error("{kind} {id} already exists")]
    AlreadyExists { kind: String, id: ResourceId },

    #[error("{kind} {id} was modified concurrently")]
    Conflict { kind: String, id: ResourceId },

    #[error("{kind} {id}: request timed out after {timeout:?}")]
    Timeout {
        kind: String,
        id: ResourceId,
        timeout: time::Duration,
    },

    #[error("failed to encode {kind} {id}: {source}")]
    Serialize {
        kind: String,
        id: ResourceId,
        source: serde_json::Error,
    },

    #[error("{kind} {id}: {source}")]
    Api {
        kind: String,
        id: ResourceId,
        source: kube::Error,
    },
}

/// A typed object that can be read and written through a [`Store`].
pub trait Object:
    Resource<DynamicType = ()>
    + Clone
    + fmt::Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Returns an API handle for the object's kind, scoped to `namespace`
    /// when the kind is namespaced.
    fn api(client: Client, namespace: Option<&str>) -> Api<Self>;
}

/// Builds API handles for a resource scope.
pub trait ApiScope {
    fn api<K>(client: Client, namespace: Option<&str>) -> Api<K>
    where
        K: Resource<DynamicType = (), Scope = Self>;
}

#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// Fetches an object, returning `None` if it does not exist.
    async fn get<K: Object>(&self, id: &ResourceId) -> Result<Option<K>, StoreError>;

    /// Lists the objects whose labels match every entry in `selector`.
    async fn list<K: Object>(
        &self,
        namespace: Option<&str>,
        selector: &labels::Map,
    ) -> Result<Vec<K>, StoreError>;

    async fn create<K: Object>(&self, obj: &K) -> Result<K, StoreError>;

    /// Replaces an object, excluding its status.
    async fn update<K: Object>(&self, obj: &K) -> Result<K, StoreError>;

    /// Replaces only an object's status sub-resource.
    async fn update_status<K: Object>(&self, obj: &K) -> Result<K, StoreError>;
}

/// A [`Store`] backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    timeout: time::Duration,
}

// === impl StoreError ===

impl StoreError {
    pub fn not_found<K: Resource<DynamicType = ()>>(id: &ResourceId) -> Self {
        Self::NotFound {
            kind: K::kind(&()).to_string(),
            id: id.clone(),
        }
    }

    pub fn already_exists<K: Resource<DynamicType = ()>>(id: &ResourceId) -> Self {
        Self::AlreadyExists {
            kind: K::kind(&()).to_string(),
            id: id.clone(),
        }
    }

    pub fn conflict<K: Resource<DynamicType = ()>>(id: &ResourceId) -> Self {
        Self::Conflict {
            kind: K::kind(&()).to_string(),
            id: id.clone(),
        }
    }

    pub fn serialize<K: Resource<DynamicType = ()>>(
        id: &ResourceId,
        source: serde_json::Error,
    ) -> Self {
        Self::Serialize {
            kind: K::kind(&()).to_string(),
            id: id.clone(),
            source,
        }
    }

    fn from_kube<K: Resource<DynamicType = ()>>(id: &ResourceId, error: kube::Error) -> Self {
        match error {
            kube::Error::Api(ref rsp) if rsp.code == 404 => Self::not_found::<K>(id),
            kube::Error::Api(ref rsp) if rsp.code == 409 && rsp.reason == "AlreadyExists" => {
                Self::already_exists::<K>(id)
            }
            kube::Error::Api(ref rsp) if rsp.code == 409 => Self::conflict::<K>(id),
            source => Self::Api {
                kind: K::kind(&()).to_string(),
                id: id.clone(),
                source,
            },
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

// === impl Object ===

impl<K> Object for K
where
    K: Resource<DynamicType = ()>
        + Clone
        + fmt::Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static,
    K::Scope: ApiScope,
{
    fn api(client: Client, namespace: Option<&str>) -> Api<Self> {
        <K::Scope as ApiScope>::api(client, namespace)
    }
}

impl ApiScope for NamespaceResourceScope {
    fn api<K>(client: Client, namespace: Option<&str>) -> Api<K>
    where
        K: Resource<DynamicType = (), Scope = Self>,
    {
        match namespace {
            Some(ns) => Api::namespaced(client, ns),
            None => Api::all(client),
        }
    }
}

impl ApiScope for ClusterResourceScope {
    fn api<K>(client: Client, _: Option<&str>) -> Api<K>
    where
        K: Resource<DynamicType = (), Scope = Self>,
    {
        Api::all(client)
    }
}

// === impl KubeStore ===

impl KubeStore {
    pub fn new(client: Client, timeout: time::Duration) -> Self {
        Self { client, timeout }
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        }
    }

    async fn call<K, T>(
        &self,
        id: &ResourceId,
        req: impl Future<Output = kube::Result<T>> + Send,
    ) -> Result<T, StoreError>
    where
        K: Resource<DynamicType = ()>,
    {
        with_deadline::<K, T>(id, self.timeout, req).await
    }
}

/// Bounds a request by `timeout` and classifies its errors.
async fn with_deadline<K, T>(
    id: &ResourceId,
    timeout: time::Duration,
    req: impl Future<Output = kube::Result<T>>,
) -> Result<T, StoreError>
where
    K: Resource<DynamicType = ()>,
{
    match time::timeout(timeout, req).await {
        Ok(Ok(rsp)) => Ok(rsp),
        Ok(Err(error)) => Err(StoreError::from_kube::<K>(id, error)),
        Err(_) => Err(StoreError::Timeout {
            kind: K::kind(&()).to_string(),
            id: id.clone(),
            timeout,
        }),
    }
}

/// Builds the merge patch that writes an object's status. The observed
/// `resourceVersion` rides along as a precondition. Status fields that
/// should be cleared must serialize as `null`.
fn status_patch<K: Object>(obj: &K) -> Result<Value, StoreError> {
    let id = ResourceId::of(obj);
    let mut value = serde_json::to_value(obj).map_err(|e| StoreError::serialize::<K>(&id, e))?;
    let status = value.get_mut("status").map(Value::take).unwrap_or_default();
    Ok(serde_json::json!({
        "metadata": { "resourceVersion": obj.meta().resource_version },
        "status": status,
    }))
}

#[async_trait::async_trait]
impl Store for KubeStore {
    async fn get<K: Object>(&self, id: &ResourceId) -> Result<Option<K>, StoreError> {
        let api = K::api(self.client.clone(), id.namespace.as_deref());
        self.call::<K, _>(id, api.get_opt(&id.name)).await
    }

    async fn list<K: Object>(
        &self,
        namespace: Option<&str>,
        selector: &labels::Map,
    ) -> Result<Vec<K>, StoreError> {
        let id = ResourceId {
            namespace: namespace.map(Into::into),
            name: "*".to_string(),
        };
        let api = K::api(self.client.clone(), namespace);
        let params = ListParams::default().labels(&labels::selector(selector));
        let list = self.call::<K, _>(&id, api.list(&params)).await?;
        Ok(list.items)
    }

    async fn create<K: Object>(&self, obj: &K) -> Result<K, StoreError> {
        let id = ResourceId::of(obj);
        let api = K::api(self.client.clone(), id.namespace.as_deref());
        let params = Self::post_params();
        self.call::<K, _>(&id, api.create(&params, obj)).await
    }

    async fn update<K: Object>(&self, obj: &K) -> Result<K, StoreError> {
        let id = ResourceId::of(obj);
        let api = K::api(self.client.clone(), id.namespace.as_deref());
        let params = Self::post_params();
        self.call::<K, _>(&id, api.replace(&id.name, &params, obj)).await
    }

    /// Merges the object's status over the stored one.
    async fn update_status<K: Object>(&self, obj: &K) -> Result<K, StoreError> {
        let id = ResourceId::of(obj);
        let patch = status_patch(obj)?;
        let api = K::api(self.client.clone(), id.namespace.as_deref());
        let params = PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        self.call::<K, _>(&id, api.patch_status(&id.name, &params, &Patch::Merge(&patch)))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::{App, AppSpec, AppStatus, Deployment, ObjectMeta};
    use kube::core::ErrorResponse;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{reason} ({code})"),
            reason: reason.to_string(),
            code,
        })
    }

    fn web() -> ResourceId {
        ResourceId::namespaced("kxc-proj-acme", "web")
    }

    #[test]
    fn classifies_api_errors() {
        let id = web();
        let classify =
            |code: u16, reason: &str| StoreError::from_kube::<Deployment>(&id, api_error(code, reason));

        assert!(matches!(
            classify(404, "NotFound"),
            StoreError::NotFound { kind, .. } if kind == "Deployment"
        ));
        assert!(matches!(
            classify(409, "AlreadyExists"),
            StoreError::AlreadyExists { .. }
        ));
        assert!(classify(409, "Conflict").is_conflict());
        assert!(matches!(
            classify(403, "Forbidden"),
            StoreError::Api { source: kube::Error::Api(ref rsp), .. } if rsp.code == 403
        ));
        assert!(matches!(
            classify(500, "InternalError"),
            StoreError::Api { .. }
        ));
    }

    #[tokio::test]
    async fn deadline_expires_as_timeout() {
        let timeout = time::Duration::from_millis(1);
        let pending = std::future::pending::<kube::Result<()>>();
        let error = with_deadline::<Deployment, _>(&web(), timeout, pending)
            .await
            .expect_err("request must time out");
        assert!(matches!(
            error,
            StoreError::Timeout { timeout: t, .. } if t == timeout
        ));
    }

    #[tokio::test]
    async fn deadline_passes_errors_through_classification() {
        let rsp = async { Err::<(), _>(api_error(409, "Conflict")) };
        let error = with_deadline::<Deployment, _>(&web(), time::Duration::from_secs(1), rsp)
            .await
            .expect_err("request must fail");
        assert!(error.is_conflict());
    }

    fn app(status: Option<AppStatus>) -> App {
        let mut app = App::new(
            "web",
            AppSpec {
                replicas: 1,
                containers: Vec::new(),
            },
        );
        app.metadata = ObjectMeta {
            name: Some("web".to_string()),
            namespace: Some("kxc-proj-acme".to_string()),
            resource_version: Some("7".to_string()),
            ..Default::default()
        };
        app.status = status;
        app
    }

    #[test]
    fn status_patch_clears_external_url() {
        let patch = status_patch(&app(Some(AppStatus {
            external_url: None,
            available_replicas: 2,
            unavailable_replicas: 0,
        })))
        .expect("status must serialize");

        assert_eq!(patch["metadata"]["resourceVersion"], "7");
        let status = patch["status"].as_object().expect("status must be an object");
        assert_eq!(status.get("externalUrl"), Some(&Value::Null));
        assert_eq!(status["availableReplicas"], 2);
    }

    #[test]
    fn status_patch_sets_external_url() {
        let patch = status_patch(&app(Some(AppStatus {
            external_url: Some("http://web.apps.example.com".to_string()),
            ..Default::default()
        })))
        .expect("status must serialize");

        assert_eq!(
            patch["status"]["externalUrl"],
            "http://web.apps.example.com"
        );
    }
}
