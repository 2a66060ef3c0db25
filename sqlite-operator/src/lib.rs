//! SQLite Kubernetes Operator
//!
//! This crate provides a Kubernetes operator for running SQLite databases,
//! replicated to object storage with Litestream and served over HTTP by
//! sqlite-rest.
//!
//! # Custom Resource Definitions
//!
//! - **SqliteDatabase**: A database file on a PersistentVolumeClaim, a
//!   Deployment running the configured sidecars, and optionally a Service and
//!   an Ingress for the API
//!
//! # Example
//!
//! ```yaml
//! apiVersion: database.sqlite.io/v1alpha1
//! kind: SqliteDatabase
//! metadata:
//!   name: orders
//! spec:
//!   database:
//!     name: app.db
//!     storage:
//!       size: 2Gi
//!   litestream:
//!     replicas:
//!       - type: s3
//!         bucket: backups
//!         path: orders
//!         credentials:
//!           secretName: s3-creds
//!   sqliteRest:
//!     enabled: true
//!     port: 8080
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod resources;
pub mod store;
pub mod telemetry;

pub use config::OperatorConfig;
pub use crd::{SqliteDatabase, SqliteDatabaseSpec, SqliteDatabaseStatus};
pub use error::{OperatorError, OperatorResult};
