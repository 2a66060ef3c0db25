//! Object store abstraction used by the controller.
//!
//! The controller only needs four operations on namespaced objects. Production
//! code uses [`KubeStore`], backed by the Kubernetes API. Tests inject
//! [`MemoryStore`], which keeps objects in memory and simulates optimistic
//! concurrency and owner-reference garbage collection.

mod api;
mod memory;

pub use api::KubeStore;
pub use memory::{MemoryStore, Verb, WriteRecord};

use crate::crd::SqliteDatabaseStatus;
use crate::error::OperatorResult;
use k8s_openapi::NamespaceResourceScope;
use kube::Resource;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by [`ObjectStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = OperatorResult<T>> + Send + 'a>>;

/// A namespaced object the store can read and write.
pub trait StoredObject:
    Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> StoredObject for K where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Provider trait for cluster object storage.
pub trait ObjectStore: Send + Sync {
    /// Fetch an object by name. Returns `None` if it does not exist.
    fn get<'a, K: StoredObject>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
    ) -> StoreFuture<'a, Option<K>>;

    /// Create a new object.
    fn create<'a, K: StoredObject>(&'a self, namespace: &'a str, object: &'a K)
    -> StoreFuture<'a, K>;

    /// Replace an existing object.
    ///
    /// Fails with a conflict if the object's `resourceVersion` is stale.
    fn replace<'a, K: StoredObject>(
        &'a self,
        namespace: &'a str,
        object: &'a K,
    ) -> StoreFuture<'a, K>;

    /// Merge-patch the status subresource of a SqliteDatabase.
    fn patch_status<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
        status: &'a SqliteDatabaseStatus,
    ) -> StoreFuture<'a, ()>;
}
