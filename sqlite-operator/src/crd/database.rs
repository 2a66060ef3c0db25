//! SqliteDatabase Custom Resource Definition.
//!
//! Defines a single SQLite database in Kubernetes, optionally replicated with
//! Litestream and served over HTTP by sqlite-rest.

use super::defaults::{
    DEFAULT_ACCESS_MODE, DEFAULT_DATABASE_NAME, DEFAULT_METRICS_PORT, DEFAULT_REST_PORT,
    DEFAULT_RETENTION, DEFAULT_RETENTION_CHECK_INTERVAL, DEFAULT_STORAGE_SIZE,
};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// SqliteDatabase is the Schema for the sqlitedatabases API.
///
/// The operator creates a PersistentVolumeClaim, a Deployment running the
/// configured sidecars, their ConfigMaps and, when requested, a Service and an
/// Ingress. All of them are owned by the SqliteDatabase and are garbage
/// collected with it.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "database.sqlite.io",
    version = "v1alpha1",
    kind = "SqliteDatabase",
    plural = "sqlitedatabases",
    shortname = "sqldb",
    namespaced,
    status = "SqliteDatabaseStatus",
    printcolumn = r#"{"name":"Database", "type":"string", "jsonPath":".spec.database.name"}"#,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Replicas", "type":"integer", "jsonPath":".status.replicas"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SqliteDatabaseSpec {
    /// Database file and storage configuration.
    #[serde(default)]
    pub database: DatabaseSpec,

    /// Litestream replication configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub litestream: Option<LitestreamSpec>,

    /// sqlite-rest API configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sqlite_rest: Option<SqliteRestSpec>,

    /// Ingress configuration for external access.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress: Option<IngressSpec>,

    /// Resource requirements for the sidecar containers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
}

impl SqliteDatabaseSpec {
    /// Litestream configuration, if replication is enabled.
    pub fn replication(&self) -> Option<&LitestreamSpec> {
        self.litestream.as_ref().filter(|l| l.enabled)
    }

    /// sqlite-rest configuration, if the API is enabled.
    pub fn rest_api(&self) -> Option<&SqliteRestSpec> {
        self.sqlite_rest.as_ref().filter(|r| r.enabled)
    }

    /// Ingress configuration, if external access is enabled.
    pub fn exposure(&self) -> Option<&IngressSpec> {
        self.ingress.as_ref().filter(|i| i.enabled)
    }
}

/// SQLite database configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSpec {
    /// Name of the SQLite database file (defaults to `database.db`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Name of a ConfigMap holding an `init.sql` script run on first start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_script: Option<String>,

    /// Storage for the database file.
    #[serde(default)]
    pub storage: StorageSpec,
}

impl DatabaseSpec {
    /// Database file name.
    pub fn file_name(&self) -> &str {
        self.name.as_deref().unwrap_or(DEFAULT_DATABASE_NAME)
    }
}

/// Storage configuration for the database volume.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageSpec {
    /// Size of the persistent volume (e.g., "1Gi").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,

    /// Storage class name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,

    /// Access mode for the persistent volume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_mode: Option<AccessMode>,
}

impl StorageSpec {
    /// Requested volume size.
    pub fn size(&self) -> &str {
        self.size.as_deref().unwrap_or(DEFAULT_STORAGE_SIZE)
    }

    /// Requested access mode.
    pub fn access_mode(&self) -> AccessMode {
        self.access_mode.unwrap_or(DEFAULT_ACCESS_MODE)
    }
}

/// Persistent volume access mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum AccessMode {
    /// Mounted read-write by a single node.
    ReadWriteOnce,
    /// Mounted read-write by many nodes.
    ReadWriteMany,
    /// Mounted read-only by many nodes.
    ReadOnlyMany,
}

impl AccessMode {
    /// The Kubernetes access mode token.
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::ReadWriteOnce => "ReadWriteOnce",
            AccessMode::ReadWriteMany => "ReadWriteMany",
            AccessMode::ReadOnlyMany => "ReadOnlyMany",
        }
    }
}

/// Litestream replication configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LitestreamSpec {
    /// Enable Litestream replication.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Replication targets.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replicas: Vec<ReplicaSpec>,
}

/// A single Litestream replication target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReplicaSpec {
    /// Storage backend.
    #[serde(rename = "type")]
    pub replica_type: ReplicaType,

    /// Bucket for S3/GCS or container for Azure.
    #[serde(default)]
    pub bucket: String,

    /// Region for S3/GCS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Custom S3 endpoint (e.g., a Wasabi or MinIO host).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Path within the bucket or container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Credentials for the storage backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<CredentialsSpec>,

    /// Retention period for snapshots. The API server defaults it to "24h".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(default = "default_retention")]
    pub retention: Option<String>,

    /// How often expired snapshots are checked for. The API server defaults it
    /// to "1h".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(default = "default_retention_check_interval")]
    pub retention_check_interval: Option<String>,
}

/// Litestream storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReplicaType {
    /// Amazon S3 or an S3-compatible store.
    S3,
    /// Azure Blob Storage.
    Azure,
    /// Google Cloud Storage.
    Gcs,
    /// Local filesystem under `/backups`.
    Local,
    /// Unrecognized backend, replicated as S3. Not offered by the schema.
    #[serde(other)]
    #[schemars(skip)]
    Other,
}

/// Reference to a Secret holding storage backend credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsSpec {
    /// Name of the Secret.
    pub secret_name: String,

    /// Secret key holding the access key (defaults to `access-key`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key_field: Option<String>,

    /// Secret key holding the secret key (defaults to `secret-key`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key_field: Option<String>,
}

/// sqlite-rest API configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SqliteRestSpec {
    /// Enable the sqlite-rest sidecar.
    #[serde(default)]
    pub enabled: bool,

    /// HTTP port for the API.
    #[serde(default = "default_rest_port")]
    #[schemars(range(min = 1, max = 65535))]
    pub port: i32,

    /// Name of a Secret holding the auth token under the `token` key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_secret: Option<String>,

    /// Tables exposed through the API.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_tables: Vec<String>,

    /// Metrics endpoint configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsSpec>,
}

impl SqliteRestSpec {
    /// Metrics port, if metrics are enabled.
    pub fn metrics_port(&self) -> Option<i32> {
        self.metrics.as_ref().filter(|m| m.enabled).map(|m| m.port)
    }
}

/// Metrics endpoint configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSpec {
    /// Enable the metrics endpoint.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Port for the metrics endpoint.
    #[serde(default = "default_metrics_port")]
    #[schemars(range(min = 1, max = 65535))]
    pub port: i32,
}

/// Ingress configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngressSpec {
    /// Enable the Ingress.
    #[serde(default)]
    pub enabled: bool,

    /// Hostname routed to the API. Required when enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// TLS configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsSpec>,
}

/// Ingress TLS configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TlsSpec {
    /// Enable TLS.
    #[serde(default)]
    pub enabled: bool,

    /// Name of the Secret holding the certificate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,
}

/// Resource requirements.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequirements {
    /// Resource requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requests: Option<ResourceSpec>,

    /// Resource limits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limits: Option<ResourceSpec>,
}

/// Resource specification (CPU and memory).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpec {
    /// CPU (e.g., "1", "500m").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,

    /// Memory (e.g., "1Gi", "512Mi").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_rest_port() -> i32 {
    DEFAULT_REST_PORT
}

fn default_metrics_port() -> i32 {
    DEFAULT_METRICS_PORT
}

fn default_retention() -> Option<String> {
    Some(DEFAULT_RETENTION.to_string())
}

fn default_retention_check_interval() -> Option<String> {
    Some(DEFAULT_RETENTION_CHECK_INTERVAL.to_string())
}

/// SqliteDatabase status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SqliteDatabaseStatus {
    /// Current phase of the database.
    #[serde(default)]
    pub phase: DatabasePhase,

    /// Human-readable message about the current state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Number of ready replicas of the Deployment.
    #[serde(default)]
    pub replicas: i32,

    /// Endpoint URLs. Serialized as `null` when absent so a merge patch clears it.
    #[serde(default)]
    pub endpoints: Option<EndpointsStatus>,

    /// Conditions representing the current state.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<DatabaseCondition>,

    /// Most recent `metadata.generation` observed by the operator.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl SqliteDatabaseStatus {
    /// Find a condition by type.
    pub fn condition(&self, condition_type: &str) -> Option<&DatabaseCondition> {
        self.conditions
            .iter()
            .find(|c| c.condition_type == condition_type)
    }
}

/// Endpoint URLs for the database.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EndpointsStatus {
    /// REST API endpoint URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rest: Option<String>,

    /// Metrics endpoint URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<String>,
}

/// Database phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum DatabasePhase {
    /// Resources are being created or the workload is not ready yet.
    #[default]
    Pending,
    /// The workload has at least one ready replica.
    Running,
    /// The workload could not be observed or reconciliation failed.
    Failed,
    /// The database is being deleted.
    Terminating,
}

impl fmt::Display for DatabasePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabasePhase::Pending => write!(f, "Pending"),
            DatabasePhase::Running => write!(f, "Running"),
            DatabasePhase::Failed => write!(f, "Failed"),
            DatabasePhase::Terminating => write!(f, "Terminating"),
        }
    }
}

/// Condition status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ConditionStatus {
    /// The condition holds.
    True,
    /// The condition does not hold.
    False,
    /// The condition could not be determined.
    Unknown,
}

/// Condition representing database state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseCondition {
    /// Type of condition (e.g., Ready).
    #[serde(rename = "type")]
    pub condition_type: String,

    /// Status of the condition.
    pub status: ConditionStatus,

    /// Machine-readable reason for the last transition.
    pub reason: String,

    /// Human-readable message.
    pub message: String,

    /// Last time the condition status changed (RFC 3339).
    pub last_transition_time: String,
}
