//! Kubernetes resource builders for SqliteDatabase.
//!
//! Every builder is a pure function of a defaulted [`SqliteDatabase`]: the same
//! input always yields the same object. Names are derived from the database
//! name and the object kind only. Owner references are attached later by the
//! convergence engine, not here.

mod litestream;
mod network;
mod sqlite_rest;
mod storage;
mod workload;

pub use litestream::{
    LITESTREAM_CONFIG_KEY, LitestreamConfig, LitestreamDb, LitestreamReplica,
    build_litestream_config, build_litestream_configmap, encode_litestream_config, replica_url,
};
pub use network::{CERT_ISSUER_ANNOTATION, build_ingress, build_service};
pub use sqlite_rest::{
    SQLITE_REST_CONFIG_KEY, SqliteRestConfig, SqliteRestDatabase, SqliteRestServer,
    build_sqlite_rest_config, build_sqlite_rest_configmap,
};
pub use storage::build_storage_claim;
pub use workload::build_deployment;

use crate::crd::SqliteDatabase;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use std::collections::BTreeMap;

/// Value of the `app.kubernetes.io/name` label.
pub const APP_NAME: &str = "sqlite-database";

/// Value of the `app.kubernetes.io/managed-by` label.
pub const MANAGED_BY: &str = "sqlite-operator";

/// Directory holding the database file in every container.
pub const DATA_DIR: &str = "/var/lib/sqlite";

/// Token file mounted from the auth Secret.
pub const AUTH_TOKEN_FILE: &str = "/etc/auth/token";

/// Name of the PersistentVolumeClaim.
pub fn storage_claim_name(db_name: &str) -> String {
    format!("{}-db-storage", db_name)
}

/// Name of the Litestream ConfigMap.
pub fn litestream_config_name(db_name: &str) -> String {
    format!("{}-litestream-config", db_name)
}

/// Name of the sqlite-rest ConfigMap.
pub fn sqlite_rest_config_name(db_name: &str) -> String {
    format!("{}-sqlite-rest-config", db_name)
}

/// Name of the Deployment.
pub fn workload_name(db_name: &str) -> String {
    db_name.to_string()
}

/// Name of the Service.
pub fn service_name(db_name: &str) -> String {
    format!("{}-service", db_name)
}

/// Name of the Ingress.
pub fn ingress_name(db_name: &str) -> String {
    format!("{}-ingress", db_name)
}

/// Full path of the database file.
pub fn database_path(db: &SqliteDatabase) -> String {
    format!("{}/{}", DATA_DIR, db.spec.database.file_name())
}

/// Labels applied to every owned object.
pub fn labels(db_name: &str) -> BTreeMap<String, String> {
    let mut labels = selector_labels(db_name);
    labels.insert(
        "app.kubernetes.io/managed-by".to_string(),
        MANAGED_BY.to_string(),
    );
    labels
}

/// Labels selecting the database pods.
pub fn selector_labels(db_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app.kubernetes.io/name".to_string(), APP_NAME.to_string()),
        ("app.kubernetes.io/instance".to_string(), db_name.to_string()),
    ])
}

/// Metadata for an owned object named `name`.
fn object_meta(db: &SqliteDatabase, name: String) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: db.namespace(),
        labels: Some(labels(&db.name_any())),
        ..Default::default()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_derived_from_database_name() {
        assert_eq!(storage_claim_name("orders"), "orders-db-storage");
        assert_eq!(litestream_config_name("orders"), "orders-litestream-config");
        assert_eq!(sqlite_rest_config_name("orders"), "orders-sqlite-rest-config");
        assert_eq!(workload_name("orders"), "orders");
        assert_eq!(service_name("orders"), "orders-service");
        assert_eq!(ingress_name("orders"), "orders-ingress");
    }

    #[test]
    fn labels_identify_instance_and_manager() {
        let labels = labels("orders");
        assert_eq!(labels["app.kubernetes.io/name"], "sqlite-database");
        assert_eq!(labels["app.kubernetes.io/instance"], "orders");
        assert_eq!(labels["app.kubernetes.io/managed-by"], "sqlite-operator");

        let selector = selector_labels("orders");
        assert_eq!(selector.len(), 2);
        assert!(!selector.contains_key("app.kubernetes.io/managed-by"));
    }
}
