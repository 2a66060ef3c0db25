//! Kubernetes API backed store.

use super::{ObjectStore, StoreFuture, StoredObject};
use crate::crd::{SqliteDatabase, SqliteDatabaseStatus};
use kube::api::{Patch, PatchParams, PostParams};
use kube::{Api, Client, ResourceExt};

/// Object store talking to the Kubernetes API server.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    /// Create a store from a Kubernetes client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl ObjectStore for KubeStore {
    fn get<'a, K: StoredObject>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
    ) -> StoreFuture<'a, Option<K>> {
        Box::pin(async move {
            let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
            Ok(api.get_opt(name).await?)
        })
    }

    fn create<'a, K: StoredObject>(
        &'a self,
        namespace: &'a str,
        object: &'a K,
    ) -> StoreFuture<'a, K> {
        Box::pin(async move {
            let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
            Ok(api.create(&PostParams::default(), object).await?)
        })
    }

    fn replace<'a, K: StoredObject>(
        &'a self,
        namespace: &'a str,
        object: &'a K,
    ) -> StoreFuture<'a, K> {
        Box::pin(async move {
            let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
            Ok(api
                .replace(&object.name_any(), &PostParams::default(), object)
                .await?)
        })
    }

    fn patch_status<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
        status: &'a SqliteDatabaseStatus,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let api: Api<SqliteDatabase> = Api::namespaced(self.client.clone(), namespace);
            let patch = serde_json::json!({
                "status": status
            });

            api.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
                .await?;

            Ok(())
        })
    }
}
