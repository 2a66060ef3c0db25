//! Defaulting pass for SqliteDatabase specs.
//!
//! Fills every unset optional field with its documented default. The pass is
//! total and idempotent, so it can run on every reconcile of the working copy.

use super::database::{
    AccessMode, IngressSpec, LitestreamSpec, MetricsSpec, SqliteDatabaseSpec, SqliteRestSpec,
};

/// Database file name used when none is given.
pub const DEFAULT_DATABASE_NAME: &str = "database.db";

/// Volume size used when none is given.
pub const DEFAULT_STORAGE_SIZE: &str = "1Gi";

/// Access mode used when none is given. Shared volumes let the sidecars run on
/// distributed filesystems.
pub const DEFAULT_ACCESS_MODE: AccessMode = AccessMode::ReadWriteMany;

/// sqlite-rest HTTP port used when none is given.
pub const DEFAULT_REST_PORT: i32 = 8080;

/// sqlite-rest metrics port used when none is given.
pub const DEFAULT_METRICS_PORT: i32 = 8081;

/// Snapshot retention applied by the CRD schema.
pub const DEFAULT_RETENTION: &str = "24h";

/// Retention check interval applied by the CRD schema.
pub const DEFAULT_RETENTION_CHECK_INTERVAL: &str = "1h";

/// Apply defaults in place.
pub fn apply_defaults(spec: &mut SqliteDatabaseSpec) {
    let database = &mut spec.database;
    database
        .name
        .get_or_insert_with(|| DEFAULT_DATABASE_NAME.to_string());
    database
        .storage
        .size
        .get_or_insert_with(|| DEFAULT_STORAGE_SIZE.to_string());
    database.storage.access_mode.get_or_insert(DEFAULT_ACCESS_MODE);

    spec.litestream.get_or_insert_with(|| LitestreamSpec {
        enabled: true,
        replicas: Vec::new(),
    });

    spec.sqlite_rest.get_or_insert_with(|| SqliteRestSpec {
        enabled: false,
        port: DEFAULT_REST_PORT,
        auth_secret: None,
        allowed_tables: Vec::new(),
        metrics: Some(MetricsSpec {
            enabled: true,
            port: DEFAULT_METRICS_PORT,
        }),
    });

    spec.ingress.get_or_insert_with(|| IngressSpec {
        enabled: false,
        host: None,
        tls: None,
    });
}

/// Return a defaulted copy of `spec`.
pub fn defaulted(spec: &SqliteDatabaseSpec) -> SqliteDatabaseSpec {
    let mut spec = spec.clone();
    apply_defaults(&mut spec);
    spec
}
