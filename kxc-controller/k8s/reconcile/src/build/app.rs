use super::owner_ref;
use crate::{
    k8s::{
        cloud, labels, App, Container, ContainerPort, Deployment, DeploymentSpec,
        HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
        IngressServiceBackend, IngressSpec, LabelSelector, ObjectMeta, PodSpec, PodTemplateSpec,
        ResourceExt, Service, ServiceBackendPort, ServicePort, ServiceSpec,
    },
    ClusterInfo, Error, Result,
};
use std::num::NonZeroU16;

const CLUSTER_IP: &str = "ClusterIP";
const INGRESS_PATH: &str = "/";
const INGRESS_PATH_TYPE: &str = "Prefix";

/// Returns the one port routed from outside the cluster, if any.
///
/// Scanning containers and then their ports in declared order, the first TCP
/// port flagged for external exposure wins. Later qualifying ports remain
/// reachable through the Service only.
pub fn exposed_port(app: &App) -> Option<NonZeroU16> {
    app.spec
        .containers
        .iter()
        .flat_map(|c| c.ports.iter())
        .find(|p| p.expose_externally && p.protocol == cloud::Protocol::Tcp)
        .map(|p| p.number)
}

/// The host name on which an App is exposed.
pub fn host(app: &App, cluster: &ClusterInfo) -> String {
    format!("{}.{}", app.name_any(), cluster.root_domain)
}

/// The URL at which an App is reachable from outside the cluster, if it
/// exposes a port.
pub fn external_url(app: &App, cluster: &ClusterInfo) -> Option<String> {
    exposed_port(app)?;
    Some(format!("http://{}/", host(app, cluster)))
}

/// Names a service port uniquely across the App's containers.
pub fn service_port_name(container: &cloud::Container, port: &cloud::Port) -> String {
    format!("{}-{}", container.name, port.number)
}

/// Labels shared by the App's pods and every object derived from the App.
pub fn labels(app: &App) -> Result<labels::Map> {
    let project = app.project_name().ok_or_else(|| Error::UnknownProject {
        namespace: app.namespace().unwrap_or_default(),
        name: app.name_any(),
    })?;
    Ok(labels::for_app(&project, &app.name_any()))
}

pub fn deployment(app: &App) -> Result<Deployment> {
    let labels = labels(app)?;

    let containers = app
        .spec
        .containers
        .iter()
        .map(|c| Container {
            name: c.name.clone(),
            image: Some(c.image.clone()),
            command: non_empty(c.command.clone()),
            ports: non_empty(
                c.ports
                    .iter()
                    .map(|p| ContainerPort {
                        container_port: p.number.get().into(),
                        protocol: Some(p.protocol.to_string()),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        })
        .collect();

    let annotations = app.restart_marker().map(|marker| {
        Some((labels::RESTARTED_AT_ANNOTATION.to_string(), marker.to_string()))
            .into_iter()
            .collect()
    });

    Ok(Deployment {
        metadata: metadata(app, labels.clone())?,
        spec: Some(DeploymentSpec {
            replicas: Some(app.spec.replicas),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    annotations,
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers,
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    })
}

pub fn service(app: &App) -> Result<Service> {
    let labels = labels(app)?;

    let ports = app
        .spec
        .containers
        .iter()
        .flat_map(|c| {
            c.ports.iter().map(move |p| ServicePort {
                name: Some(service_port_name(c, p)),
                port: p.number.get().into(),
                protocol: Some(p.protocol.to_string()),
                ..Default::default()
            })
        })
        .collect();

    Ok(Service {
        metadata: metadata(app, labels.clone())?,
        spec: Some(ServiceSpec {
            type_: Some(CLUSTER_IP.to_string()),
            selector: Some(labels),
            ports: Some(ports),
            ..Default::default()
        }),
        status: None,
    })
}

/// Builds the Ingress routing the App's host to its exposed port, or `None`
/// if the App exposes no port.
pub fn ingress(app: &App, cluster: &ClusterInfo) -> Result<Option<Ingress>> {
    let Some(port) = exposed_port(app) else {
        return Ok(None);
    };

    let backend = IngressBackend {
        service: Some(IngressServiceBackend {
            name: app.name_any(),
            port: Some(ServiceBackendPort {
                number: Some(port.get().into()),
                name: None,
            }),
        }),
        resource: None,
    };

    Ok(Some(Ingress {
        metadata: metadata(app, labels(app)?)?,
        spec: Some(IngressSpec {
            ingress_class_name: cluster.ingress_class.clone(),
            rules: Some(vec![IngressRule {
                host: Some(host(app, cluster)),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some(INGRESS_PATH.to_string()),
                        path_type: INGRESS_PATH_TYPE.to_string(),
                        backend,
                    }],
                }),
            }]),
            ..Default::default()
        }),
        status: None,
    }))
}

/// Dependents share the App's name and namespace and are owned by it.
fn metadata(app: &App, labels: labels::Map) -> Result<ObjectMeta> {
    Ok(ObjectMeta {
        name: Some(app.name_any()),
        namespace: app.namespace(),
        labels: Some(labels),
        owner_references: Some(vec![owner_ref(app)?]),
        ..Default::default()
    })
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}
