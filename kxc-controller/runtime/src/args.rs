use crate::{
    controller::{self, Context},
    k8s::cloud,
    lease,
    reconcile::{
        AppReconciler, ClusterInfo, KubeStore, ProjectReconciler, ReconcileMetrics,
        DEFAULT_INGRESS_NAMESPACE, DEFAULT_ROOT_DOMAIN,
    },
};
use anyhow::{bail, Context as _, Result};
use clap::Parser;
use prometheus_client::registry::Registry;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{info, info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(
    name = "kxc-controller",
    about = "Converges the cluster objects of declared Projects and Apps"
)]
pub struct Args {
    #[clap(long, default_value = "kxc=info,warn", env = "KXC_CONTROLLER_LOG")]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Domain under which every App is exposed as `<app>.<root-domain>`.
    #[clap(long, default_value = DEFAULT_ROOT_DOMAIN, env = "ROOT_DOMAIN")]
    root_domain: String,

    /// Namespace of the ingress controller, admitted by every Project's
    /// network policy.
    #[clap(long, default_value = DEFAULT_INGRESS_NAMESPACE, env = "INGRESS_NAMESPACE")]
    ingress_namespace: String,

    #[clap(long, env = "INGRESS_CLASS")]
    ingress_class: Option<String>,

    #[clap(long, default_value = "100")]
    requeue_delay_ms: u64,

    #[clap(long, default_value = "5")]
    error_requeue_secs: u64,

    #[clap(long, default_value = "5000")]
    store_timeout_ms: u64,

    /// Only reconcile while holding the controller's write lease.
    #[clap(long)]
    leader_election: bool,

    #[clap(long, default_value = "kxc-system")]
    controller_namespace: String,

    #[clap(long, default_value = "kxc-controller")]
    controller_deployment_name: String,

    /// Prints the custom resource definitions and exits.
    #[clap(long)]
    print_crds: bool,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            admin,
            client,
            log_level,
            log_format,
            root_domain,
            ingress_namespace,
            ingress_class,
            requeue_delay_ms,
            error_requeue_secs,
            store_timeout_ms,
            leader_election,
            controller_namespace,
            controller_deployment_name,
            print_crds,
        } = self;

        if print_crds {
            for crd in cloud::crds() {
                print!("{}", serde_yaml::to_string(&crd)?);
            }
            return Ok(());
        }

        let cluster = Arc::new(ClusterInfo {
            root_domain,
            ingress_namespace,
            ingress_class,
        });

        let mut prom = <Registry>::default();
        let metrics = ReconcileMetrics::register(prom.sub_registry_with_prefix("kxc_reconcile"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        let leadership = if leader_election {
            let hostname = std::env::var("HOSTNAME")
                .context("HOSTNAME must be set when leader election is enabled")?;
            let leadership = lease::init(
                &runtime,
                &controller_namespace,
                &controller_deployment_name,
                &hostname,
            )
            .await?;
            Some(leadership)
        } else {
            None
        };

        let store = KubeStore::new(runtime.client(), Duration::from_millis(store_timeout_ms));
        let ctx = Arc::new(Context {
            projects: ProjectReconciler::new(store.clone(), cluster.clone()),
            apps: AppReconciler::new(store, cluster.clone()),
            metrics,
            leadership,
            requeue_delay: Duration::from_millis(requeue_delay_ms),
            error_requeue: Duration::from_secs(error_requeue_secs),
        });

        tokio::spawn(
            controller::projects(runtime.client(), ctx.clone(), runtime.shutdown_handle())
                .instrument(info_span!("projects")),
        );
        tokio::spawn(
            controller::apps(runtime.client(), ctx, runtime.shutdown_handle())
                .instrument(info_span!("apps")),
        );
        info!(
            root_domain = %cluster.root_domain,
            ingress_namespace = %cluster.ingress_namespace,
            leader_election,
            "Controllers started",
        );

        // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
        // complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}
