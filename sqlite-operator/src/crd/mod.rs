//! Custom Resource Definitions for the SQLite Kubernetes operator.
//!
//! - [`SqliteDatabase`]: a SQLite database with optional replication and REST API
//! - [`defaults`]: the defaulting pass applied before every reconcile

mod database;
pub mod defaults;

pub use database::{
    AccessMode, ConditionStatus, CredentialsSpec, DatabaseCondition, DatabasePhase, DatabaseSpec,
    EndpointsStatus, IngressSpec, LitestreamSpec, MetricsSpec, ReplicaSpec, ReplicaType,
    ResourceRequirements, ResourceSpec, SqliteDatabase, SqliteDatabaseSpec, SqliteDatabaseStatus,
    SqliteRestSpec, StorageSpec, TlsSpec,
};
pub use defaults::{apply_defaults, defaulted};
