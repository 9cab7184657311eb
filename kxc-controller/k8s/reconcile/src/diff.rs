//! Field-by-field comparisons between observed dependents and their targets.
//!
//! Only the fields the controller derives are compared. Fields defaulted by
//! the API server (e.g. a port's protocol) are normalized first so that a
//! freshly created object compares equal to its target.

use crate::k8s::{
    labels, AppStatus, Container, ContainerPort, Deployment, Ingress, ObjectMeta, PodSpec,
    ServicePort,
};

const DEFAULT_PROTOCOL: &str = "TCP";

pub fn replicas_eq(observed: &Deployment, target: &Deployment) -> bool {
    replicas(observed) == replicas(target)
}

pub fn replicas(dep: &Deployment) -> Option<i32> {
    dep.spec.as_ref().and_then(|s| s.replicas)
}

/// Compares the image, name, command, and ports of each container, in order.
pub fn containers_eq(observed: &[Container], target: &[Container]) -> bool {
    observed.len() == target.len()
        && observed.iter().zip(target).all(|(o, t)| {
            o.name == t.name
                && o.image == t.image
                && slice(&o.command) == slice(&t.command)
                && container_ports_eq(slice(&o.ports), slice(&t.ports))
        })
}

fn container_ports_eq(observed: &[ContainerPort], target: &[ContainerPort]) -> bool {
    observed.len() == target.len()
        && observed.iter().zip(target).all(|(o, t)| {
            o.container_port == t.container_port && protocol(&o.protocol) == protocol(&t.protocol)
        })
}

pub fn template_containers(dep: &Deployment) -> &[Container] {
    pod_spec(dep).map(|s| &*s.containers).unwrap_or_default()
}

fn pod_spec(dep: &Deployment) -> Option<&PodSpec> {
    dep.spec.as_ref()?.template.spec.as_ref()
}

pub fn restart_marker_eq(observed: &Deployment, target: &Deployment) -> bool {
    restart_marker(observed) == restart_marker(target)
}

/// The restart marker annotated on the pod template.
pub fn restart_marker(dep: &Deployment) -> Option<&str> {
    template_metadata(dep)?
        .annotations
        .as_ref()?
        .get(labels::RESTARTED_AT_ANNOTATION)
        .map(String::as_str)
}

fn template_metadata(dep: &Deployment) -> Option<&ObjectMeta> {
    dep.spec.as_ref()?.template.metadata.as_ref()
}

/// Compares the name, port, and protocol of each service port, in order.
pub fn service_ports_eq(observed: &[ServicePort], target: &[ServicePort]) -> bool {
    observed.len() == target.len()
        && observed.iter().zip(target).all(|(o, t)| {
            o.name == t.name && o.port == t.port && protocol(&o.protocol) == protocol(&t.protocol)
        })
}

/// A single routing entry: host, backend service name, and backend port.
type Route<'a> = (Option<&'a str>, Option<&'a str>, Option<i32>);

/// Compares the host and backend of every ingress path, and the ingress
/// class when the target sets one.
pub fn ingress_eq(observed: &Ingress, target: &Ingress) -> bool {
    let target_class = target
        .spec
        .as_ref()
        .and_then(|s| s.ingress_class_name.as_deref());
    if target_class.is_some() && ingress_class(observed) != target_class {
        return false;
    }
    routes(observed) == routes(target)
}

fn ingress_class(ingress: &Ingress) -> Option<&str> {
    ingress.spec.as_ref()?.ingress_class_name.as_deref()
}

fn routes(ingress: &Ingress) -> Vec<Route<'_>> {
    ingress
        .spec
        .iter()
        .flat_map(|s| s.rules.iter().flatten())
        .flat_map(|rule| {
            rule.http.iter().flat_map(move |http| {
                http.paths.iter().map(move |path| {
                    let svc = path.backend.service.as_ref();
                    (
                        rule.host.as_deref(),
                        svc.map(|s| s.name.as_str()),
                        svc.and_then(|s| s.port.as_ref()).and_then(|p| p.number),
                    )
                })
            })
        })
        .collect()
}

/// Compares the replica counts mirrored into an App's status with those
/// observed on its Deployment.
pub fn replica_status_eq(status: &AppStatus, dep: &Deployment) -> bool {
    let (available, unavailable) = replica_status(dep);
    status.available_replicas == available && status.unavailable_replicas == unavailable
}

/// The available and unavailable replica counts observed on a Deployment.
pub fn replica_status(dep: &Deployment) -> (i32, i32) {
    dep.status.as_ref().map_or((0, 0), |s| {
        (
            s.available_replicas.unwrap_or(0),
            s.unavailable_replicas.unwrap_or(0),
        )
    })
}

fn protocol(protocol: &Option<String>) -> &str {
    protocol.as_deref().unwrap_or(DEFAULT_PROTOCOL)
}

fn slice<T>(items: &Option<Vec<T>>) -> &[T] {
    items.as_deref().unwrap_or_default()
}
