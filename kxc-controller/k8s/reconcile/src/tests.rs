use crate::{
    k8s::{
        cloud::{Container, Port, Protocol},
        labels, App, AppSpec, ObjectMeta, Project,
    },
    ClusterInfo, Outcome, Result,
};
use maplit::btreemap;
use std::{future::Future, num::NonZeroU16, sync::Arc};

mod project;

use self::store::{MemoryStore, Op, Write};

const PROJECT: &str = "acme";
const NAMESPACE: &str = "kxc-proj-acme";

/// Bounds the number of passes a convergence may take before a test fails.
const MAX_PASSES: usize = 16;

fn cluster() -> Arc<ClusterInfo> {
    Arc::new(ClusterInfo {
        root_domain: "apps.example.com".to_string(),
        ingress_namespace: "ingress-nginx".to_string(),
        ingress_class: None,
    })
}

fn mk_project(name: &str) -> Project {
    Project {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels::for_project("alice")),
            ..Default::default()
        },
        spec: Default::default(),
    }
}

fn mk_app(name: &str, replicas: i32, containers: Vec<Container>) -> App {
    App {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(NAMESPACE.to_string()),
            labels: Some(btreemap! {
                labels::PROJECT.to_string() => PROJECT.to_string(),
            }),
            ..Default::default()
        },
        spec: AppSpec {
            replicas,
            containers,
        },
        status: None,
    }
}

fn mk_container(name: &str, ports: Vec<Port>) -> Container {
    Container {
        image: "busybox".to_string(),
        name: name.to_string(),
        command: vec![],
        ports,
    }
}

fn tcp(number: u16, expose_externally: bool) -> Port {
    Port {
        number: NonZeroU16::new(number).unwrap(),
        protocol: Protocol::Tcp,
        expose_externally,
    }
}

fn udp(number: u16) -> Port {
    Port {
        number: NonZeroU16::new(number).unwrap(),
        protocol: Protocol::Udp,
        expose_externally: false,
    }
}

/// Runs passes until one reports [`Outcome::Done`], returning the number of
/// passes taken.
async fn converge<F, Fut>(mut pass: F) -> usize
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Outcome>>,
{
    for n in 1..=MAX_PASSES {
        match pass().await {
            Ok(Outcome::Done) => return n,
            Ok(Outcome::Requeue) => {}
            Err(error) => panic!("pass {n} failed: {error}"),
        }
    }
    panic!("did not converge after {MAX_PASSES} passes");
}

/// Returns every subset of `items`, excluding the empty set.
fn subsets<T: Copy>(items: &[T]) -> Vec<Vec<T>> {
    (1..(1u32 << items.len()))
        .map(|mask| {
            items
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, item)| *item)
                .collect()
        })
        .collect()
}
