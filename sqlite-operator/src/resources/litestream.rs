//! Litestream replication ConfigMap.

use super::{database_path, litestream_config_name, object_meta};
use crate::crd::{ReplicaSpec, ReplicaType, SqliteDatabase};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::ResourceExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// ConfigMap key holding the Litestream configuration file.
pub const LITESTREAM_CONFIG_KEY: &str = "litestream.yml";

/// Litestream configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LitestreamConfig {
    /// Replicated databases, one entry per replication target.
    pub dbs: Vec<LitestreamDb>,
}

/// A database entry in the Litestream configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LitestreamDb {
    /// Path of the database file.
    pub path: String,
    /// Replication target.
    pub replica: LitestreamReplica,
}

/// Replication target of a Litestream database entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LitestreamReplica {
    /// Replica URL (`s3://`, `abs://`, `gs://` or `file://`).
    pub url: String,
    /// Bucket region.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Snapshot retention period.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention: Option<String>,
    /// Interval between retention checks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_check_interval: Option<String>,
    /// Custom S3 endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// Build the replica URL for a replication target.
///
/// Unrecognized backends are treated as S3.
pub fn replica_url(replica: &ReplicaSpec) -> String {
    let path = replica.path.as_deref().unwrap_or("");
    match replica.replica_type {
        ReplicaType::S3 | ReplicaType::Other => format!("s3://{}/{}", replica.bucket, path),
        ReplicaType::Azure => format!("abs://{}/{}", replica.bucket, path),
        ReplicaType::Gcs => format!("gs://{}/{}", replica.bucket, path),
        ReplicaType::Local => format!("file:///backups/{}", path),
    }
}

/// Build the Litestream configuration for a database.
pub fn build_litestream_config(db: &SqliteDatabase) -> LitestreamConfig {
    let path = database_path(db);
    let replicas = db
        .spec
        .litestream
        .as_ref()
        .map(|l| l.replicas.as_slice())
        .unwrap_or_default();

    let dbs = replicas
        .iter()
        .map(|replica| LitestreamDb {
            path: path.clone(),
            replica: LitestreamReplica {
                url: replica_url(replica),
                region: replica.region.clone(),
                retention: replica.retention.clone(),
                retention_check_interval: replica.retention_check_interval.clone(),
                endpoint: replica.endpoint.clone(),
            },
        })
        .collect();

    LitestreamConfig { dbs }
}

/// Encode a Litestream configuration, degrading to a minimal document if the
/// structured encoder fails.
///
/// The fallback only carries the first entry's path and URL. Replicating to one
/// target is preferred over failing the whole reconcile.
pub fn encode_litestream_config<F>(config: &LitestreamConfig, encode: F) -> String
where
    F: FnOnce(&LitestreamConfig) -> Result<String, serde_yaml::Error>,
{
    match encode(config) {
        Ok(yaml) => yaml,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode Litestream config, using minimal fallback");
            match config.dbs.first() {
                Some(db) => format!(
                    "dbs:\n  - path: {}\n    replica:\n      url: {}\n",
                    db.path, db.replica.url
                ),
                None => "dbs: []\n".to_string(),
            }
        }
    }
}

/// Build the Litestream ConfigMap for a database.
pub fn build_litestream_configmap(db: &SqliteDatabase) -> ConfigMap {
    let config = build_litestream_config(db);
    let yaml = encode_litestream_config(&config, |c| serde_yaml::to_string(c));

    ConfigMap {
        metadata: object_meta(db, litestream_config_name(&db.name_any())),
        data: Some(BTreeMap::from([(LITESTREAM_CONFIG_KEY.to_string(), yaml)])),
        ..Default::default()
    }
}
