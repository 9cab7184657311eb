use crate::{
    k8s::{labels, Deployment, ObjectMeta, OwnerReference, Resource, ResourceExt},
    reconcile::store::FIELD_MANAGER,
};
use anyhow::{Context, Result};
use k8s_openapi::api::coordination::v1 as coordv1;
use kube::api::{Api, PostParams};
use std::sync::Arc;
use tokio::{sync::watch, time};

pub(crate) const LEASE_DURATION: time::Duration = time::Duration::from_secs(30);
const LEASE_NAME: &str = "kxc-controller-write";
const RENEW_GRACE_PERIOD: time::Duration = time::Duration::from_secs(1);

/// Determines whether this replica may write to the cluster.
#[derive(Clone, Debug)]
pub(crate) struct Leadership {
    claims: watch::Receiver<Arc<kubert::lease::Claim>>,
    hostname: String,
}

/// Ensures the write Lease exists and starts competing for it as `hostname`.
pub(crate) async fn init<T>(
    runtime: &kubert::Runtime<T>,
    ns: &str,
    deployment_name: &str,
    hostname: &str,
) -> Result<Leadership> {
    let api = Api::<coordv1::Lease>::namespaced(runtime.client(), ns);
    let owner = controller_deployment(runtime, ns, deployment_name).await?;
    create_if_missing(&api, write_lease(ns, owner)).await?;

    let params = kubert::lease::ClaimParams {
        lease_duration: LEASE_DURATION,
        renew_grace_period: RENEW_GRACE_PERIOD,
    };
    let (claims, _task) = kubert::lease::LeaseManager::init(api, LEASE_NAME)
        .await?
        .spawn(hostname, params)
        .await?;
    Ok(Leadership {
        claims,
        hostname: hostname.to_string(),
    })
}

/// References the controller's own Deployment, which owns the Lease so that
/// it is collected on uninstall.
async fn controller_deployment<T>(
    runtime: &kubert::Runtime<T>,
    ns: &str,
    name: &str,
) -> Result<OwnerReference> {
    let deployment = Api::<Deployment>::namespaced(runtime.client(), ns)
        .get(name)
        .await
        .with_context(|| format!("failed to fetch Deployment {ns}/{name}"))?;
    deployment
        .controller_owner_ref(&())
        .context("controller Deployment has no UID")
}

fn write_lease(ns: &str, owner: OwnerReference) -> coordv1::Lease {
    let pairs = [
        (labels::APP, labels::PLATFORM),
        ("cloud.kubexcloud.com/component", "controller"),
    ];
    coordv1::Lease {
        metadata: ObjectMeta {
            name: Some(LEASE_NAME.to_string()),
            namespace: Some(ns.to_string()),
            owner_references: Some(vec![owner]),
            labels: Some(
                pairs
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            ..Default::default()
        },
        spec: None,
    }
}

/// Creates the Lease unless another replica already has. Holder fields are
/// left to the lease manager.
async fn create_if_missing(api: &Api<coordv1::Lease>, lease: coordv1::Lease) -> Result<()> {
    let params = PostParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..Default::default()
    };
    match api.create(&params, &lease).await {
        Ok(lease) => {
            tracing::info!(name = %lease.name_any(), "Created write Lease");
            Ok(())
        }
        Err(kube::Error::Api(rsp)) if is_already_exists(rsp.code, &rsp.reason) => {
            tracing::debug!("Write Lease already exists");
            Ok(())
        }
        Err(error) => Err(error).context("failed to create write Lease"),
    }
}

fn is_already_exists(code: u16, reason: &str) -> bool {
    code == 409 && reason == "AlreadyExists"
}

// === impl Leadership ===

impl Leadership {
    pub(crate) fn is_leader(&self) -> bool {
        self.claims.borrow().is_current_for(&self.hostname)
    }
}
