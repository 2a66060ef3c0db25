//! Operator configuration.
//!
//! Process-wide settings that feed the resource builders and the controller
//! loop. Read once at startup from `SQLITE_OPERATOR_*` environment variables.

use std::env;
use std::time::Duration;

/// Container images used by the generated Deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageConfig {
    /// Image providing the `sqlite3` CLI for the init container.
    pub sqlite: String,
    /// Litestream image.
    pub litestream: String,
    /// sqlite-rest image.
    pub sqlite_rest: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            sqlite: "keinos/sqlite3:latest".to_string(),
            litestream: "litestream/litestream:latest".to_string(),
            sqlite_rest: "ghcr.io/b4fun/sqlite-rest/server:main".to_string(),
        }
    }
}

/// Configuration for the SqliteDatabase controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorConfig {
    /// DNS suffix of in-cluster Services, used for endpoint URLs.
    pub cluster_domain: String,
    /// Container images.
    pub images: ImageConfig,
    /// cert-manager ClusterIssuer annotated on TLS-enabled Ingresses.
    pub cert_issuer: String,
    /// Periodic resync interval after a successful reconcile.
    pub resync_interval: Duration,
    /// Delay before retrying a failed reconcile.
    pub error_requeue: Duration,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            cluster_domain: "svc.cluster.local".to_string(),
            images: ImageConfig::default(),
            cert_issuer: "letsencrypt-prod".to_string(),
            resync_interval: Duration::from_secs(300),
            error_requeue: Duration::from_secs(30),
        }
    }
}

impl OperatorConfig {
    /// Create configuration from environment variables.
    ///
    /// Environment variables:
    /// - `SQLITE_OPERATOR_CLUSTER_DOMAIN`: Service DNS suffix
    /// - `SQLITE_OPERATOR_SQLITE_IMAGE`, `SQLITE_OPERATOR_LITESTREAM_IMAGE`,
    ///   `SQLITE_OPERATOR_SQLITE_REST_IMAGE`: container images
    /// - `SQLITE_OPERATOR_CERT_ISSUER`: cert-manager ClusterIssuer name
    /// - `SQLITE_OPERATOR_RESYNC_SECONDS`: periodic resync interval
    /// - `SQLITE_OPERATOR_ERROR_REQUEUE_SECONDS`: retry delay after errors
    ///
    /// Unset or unparsable values fall back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            cluster_domain: env_string("SQLITE_OPERATOR_CLUSTER_DOMAIN")
                .unwrap_or(defaults.cluster_domain),
            images: ImageConfig {
                sqlite: env_string("SQLITE_OPERATOR_SQLITE_IMAGE")
                    .unwrap_or(defaults.images.sqlite),
                litestream: env_string("SQLITE_OPERATOR_LITESTREAM_IMAGE")
                    .unwrap_or(defaults.images.litestream),
                sqlite_rest: env_string("SQLITE_OPERATOR_SQLITE_REST_IMAGE")
                    .unwrap_or(defaults.images.sqlite_rest),
            },
            cert_issuer: env_string("SQLITE_OPERATOR_CERT_ISSUER")
                .unwrap_or(defaults.cert_issuer),
            resync_interval: env_seconds("SQLITE_OPERATOR_RESYNC_SECONDS")
                .unwrap_or(defaults.resync_interval),
            error_requeue: env_seconds("SQLITE_OPERATOR_ERROR_REQUEUE_SECONDS")
                .unwrap_or(defaults.error_requeue),
        }
    }

    /// Set the cluster DNS suffix.
    pub fn with_cluster_domain(mut self, domain: impl Into<String>) -> Self {
        self.cluster_domain = domain.into();
        self
    }

    /// Set the cert-manager ClusterIssuer.
    pub fn with_cert_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.cert_issuer = issuer.into();
        self
    }

    /// Set the periodic resync interval.
    pub fn with_resync_interval(mut self, interval: Duration) -> Self {
        self.resync_interval = interval;
        self
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_seconds(key: &str) -> Option<Duration> {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
