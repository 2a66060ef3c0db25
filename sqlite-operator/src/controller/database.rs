//! SqliteDatabase controller.
//!
//! Reconciles SqliteDatabase resources into their dependent objects and
//! reports the observed state back on the status subresource.

use super::converge::{ensure, set_controller_reference};
use super::status::{WorkloadObservation, derive_status, failed_status};
use super::{ControllerContext, ReconcileAction};
use crate::crd::{SqliteDatabase, SqliteDatabaseStatus, apply_defaults};
use crate::error::{OperatorError, OperatorResult};
use crate::resources;
use crate::store::{KubeStore, ObjectStore, StoredObject};
use k8s_openapi::api::apps::v1::Deployment;
use kube::ResourceExt;
use std::sync::Arc;

/// Controller for SqliteDatabase resources.
pub struct DatabaseController<S = KubeStore> {
    ctx: Arc<ControllerContext<S>>,
}

impl<S> Clone for DatabaseController<S> {
    fn clone(&self) -> Self {
        Self {
            ctx: Arc::clone(&self.ctx),
        }
    }
}

impl<S: ObjectStore> DatabaseController<S> {
    /// Create a new database controller.
    pub fn new(ctx: Arc<ControllerContext<S>>) -> Self {
        Self { ctx }
    }

    /// Reconcile the SqliteDatabase `name` in `namespace`.
    ///
    /// This is the main reconciliation loop that:
    /// 1. Fetches and defaults the spec
    /// 2. Records the observed generation
    /// 3. Ensures the storage claim, ConfigMaps, Deployment, Service and Ingress
    /// 4. Derives and persists the status
    ///
    /// A missing SqliteDatabase is not an error. An invalid spec records a
    /// Failed status before the error is returned.
    pub async fn reconcile(&self, namespace: &str, name: &str) -> OperatorResult<ReconcileAction> {
        let store = &self.ctx.store;

        let Some(mut db) = store.get::<SqliteDatabase>(namespace, name).await? else {
            tracing::debug!(name = %name, namespace = %namespace, "SqliteDatabase not found, nothing to do");
            return Ok(ReconcileAction::Done);
        };

        apply_defaults(&mut db.spec);

        tracing::info!(
            name = %name,
            namespace = %namespace,
            generation = ?db.metadata.generation,
            replication = db.spec.replication().is_some(),
            rest_api = db.spec.rest_api().is_some(),
            ingress = db.spec.exposure().is_some(),
            "Reconciling SqliteDatabase"
        );

        self.observe_generation(&mut db).await?;

        if let Err(e) = self.ensure_resources(&db).await {
            if e.is_precondition() {
                self.record_failure(&db, &e).await;
            }
            return Err(e);
        }

        let workload = resources::workload_name(name);
        let observation =
            WorkloadObservation::from_lookup(store.get::<Deployment>(namespace, &workload).await);
        let status = derive_status(&db, &observation, &self.ctx.config, chrono::Utc::now());

        tracing::info!(
            name = %name,
            namespace = %namespace,
            phase = %status.phase,
            replicas = status.replicas,
            "Updating SqliteDatabase status"
        );
        store.patch_status(namespace, name, &status).await?;

        Ok(ReconcileAction::Requeue(self.ctx.config.resync_interval))
    }

    /// Persist `metadata.generation` as the observed generation if it moved ahead.
    async fn observe_generation(&self, db: &mut SqliteDatabase) -> OperatorResult<()> {
        let Some(generation) = db.metadata.generation else {
            return Ok(());
        };
        let observed = db.status.as_ref().and_then(|s| s.observed_generation);
        if observed.is_some_and(|o| o >= generation) {
            return Ok(());
        }

        let status = SqliteDatabaseStatus {
            observed_generation: Some(generation),
            ..db.status.clone().unwrap_or_default()
        };

        tracing::debug!(
            name = %db.name_any(),
            generation = generation,
            "Recording observed generation"
        );
        self.ctx
            .store
            .patch_status(&namespace_of(db)?, &db.name_any(), &status)
            .await?;

        db.status = Some(status);
        Ok(())
    }

    /// Converge every dependent object in order, stopping at the first error.
    async fn ensure_resources(&self, db: &SqliteDatabase) -> OperatorResult<()> {
        let config = &self.ctx.config;

        self.ensure_owned(db, resources::build_storage_claim(db))
            .await?;

        if db.spec.replication().is_some() {
            self.ensure_owned(db, resources::build_litestream_configmap(db))
                .await?;
        }

        if let Some(rest) = db.spec.rest_api() {
            self.ensure_owned(db, resources::build_sqlite_rest_configmap(db, rest)?)
                .await?;
        }

        self.ensure_owned(db, resources::build_deployment(db, config))
            .await?;

        if let Some(rest) = db.spec.rest_api() {
            self.ensure_owned(db, resources::build_service(db, rest))
                .await?;
        }

        if let Some(ingress) = db.spec.exposure() {
            let ingress = resources::build_ingress(db, ingress, config)?;
            self.ensure_owned(db, ingress).await?;
        }

        Ok(())
    }

    async fn ensure_owned<K: StoredObject>(
        &self,
        db: &SqliteDatabase,
        desired: K,
    ) -> OperatorResult<()> {
        ensure(&self.ctx.store, desired, |object| {
            set_controller_reference(db, object)
        })
        .await?;
        Ok(())
    }

    /// Best-effort Failed status for an invalid spec.
    async fn record_failure(&self, db: &SqliteDatabase, error: &OperatorError) {
        let name = db.name_any();
        tracing::warn!(name = %name, error = %error, "SqliteDatabase spec is invalid");

        let status = failed_status(db, error, chrono::Utc::now());
        let result = match namespace_of(db) {
            Ok(namespace) => self.ctx.store.patch_status(&namespace, &name, &status).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::warn!(name = %name, error = %e, "Failed to record failure status");
        }
    }
}

fn namespace_of(db: &SqliteDatabase) -> OperatorResult<String> {
    db.namespace()
        .ok_or_else(|| OperatorError::InvalidConfig("SqliteDatabase must be namespaced".into()))
}
