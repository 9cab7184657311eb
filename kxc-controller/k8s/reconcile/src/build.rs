//! Pure functions deriving the target shape of every dependent object.
//!
//! Builders are re-run on every pass; given the same declared object and
//! [`ClusterInfo`](crate::ClusterInfo) they always produce the same result.

pub mod app;
pub mod project;

use crate::{
    k8s::{OwnerReference, Resource},
    Error, ResourceId, Result,
};

/// Returns a controller owner reference to `owner`, so that the orchestrator
/// garbage-collects the dependent when `owner` is deleted.
pub fn owner_ref<K>(owner: &K) -> Result<OwnerReference>
where
    K: Resource<DynamicType = ()>,
{
    owner
        .controller_owner_ref(&())
        .ok_or_else(|| Error::MissingMetadata {
            kind: K::kind(&()).to_string(),
            id: ResourceId::of(owner),
            field: "uid",
        })
}
