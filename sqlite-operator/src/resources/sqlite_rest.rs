//! sqlite-rest API ConfigMap.

use super::{AUTH_TOKEN_FILE, database_path, object_meta, sqlite_rest_config_name};
use crate::crd::{SqliteDatabase, SqliteRestSpec};
use crate::error::OperatorResult;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::ResourceExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// ConfigMap key holding the sqlite-rest configuration file.
pub const SQLITE_REST_CONFIG_KEY: &str = "sqlite-rest.yml";

/// sqlite-rest configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqliteRestConfig {
    /// Server section.
    pub server: SqliteRestServer,
}

/// Server section of the sqlite-rest configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SqliteRestServer {
    /// Listen address, `:<port>`.
    pub addr: String,
    /// Database connection.
    pub database: SqliteRestDatabase,
    /// Bearer token file, set when an auth Secret is configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token_file: Option<String>,
    /// Comma separated table allow-list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_allow_table: Option<String>,
    /// Metrics listen address, `:<port>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_addr: Option<String>,
}

/// Database section of the sqlite-rest configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqliteRestDatabase {
    /// Path of the database file.
    pub dsn: String,
}

/// Build the sqlite-rest configuration.
///
/// Each optional directive is present only when its spec field is set.
pub fn build_sqlite_rest_config(db: &SqliteDatabase, rest: &SqliteRestSpec) -> SqliteRestConfig {
    let allowed = (!rest.allowed_tables.is_empty()).then(|| rest.allowed_tables.join(","));

    SqliteRestConfig {
        server: SqliteRestServer {
            addr: format!(":{}", rest.port),
            database: SqliteRestDatabase {
                dsn: database_path(db),
            },
            auth_token_file: rest.auth_secret.as_ref().map(|_| AUTH_TOKEN_FILE.to_string()),
            security_allow_table: allowed,
            metrics_addr: rest.metrics_port().map(|port| format!(":{}", port)),
        },
    }
}

/// Build the sqlite-rest ConfigMap for a database.
pub fn build_sqlite_rest_configmap(
    db: &SqliteDatabase,
    rest: &SqliteRestSpec,
) -> OperatorResult<ConfigMap> {
    let yaml = serde_yaml::to_string(&build_sqlite_rest_config(db, rest))?;

    Ok(ConfigMap {
        metadata: object_meta(db, sqlite_rest_config_name(&db.name_any())),
        data: Some(BTreeMap::from([(SQLITE_REST_CONFIG_KEY.to_string(), yaml)])),
        ..Default::default()
    })
}
