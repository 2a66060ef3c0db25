//! Deployment running the database sidecars.
//!
//! The pod has one init container that creates the database file when it is
//! missing, a Litestream sidecar when replication is enabled and a sqlite-rest
//! sidecar when the API is enabled. All of them share the data volume.

use super::{
    AUTH_TOKEN_FILE, DATA_DIR, LITESTREAM_CONFIG_KEY, database_path, litestream_config_name,
    object_meta, selector_labels, sqlite_rest_config_name, storage_claim_name, workload_name,
};
use crate::config::OperatorConfig;
use crate::crd::{LitestreamSpec, ResourceSpec, SqliteDatabase, SqliteRestSpec};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, ContainerPort, EnvVar, EnvVarSource,
    PersistentVolumeClaimVolumeSource, PodSpec, PodTemplateSpec, ResourceRequirements,
    SecretKeySelector, SecretVolumeSource, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::ResourceExt;
use std::collections::BTreeMap;

const DATA_VOLUME: &str = "db-storage";
const INIT_SCRIPT_VOLUME: &str = "init-script";
const INIT_SCRIPT_DIR: &str = "/init";
const LITESTREAM_VOLUME: &str = "litestream-config";
const LITESTREAM_DIR: &str = "/etc/litestream";
const SQLITE_REST_VOLUME: &str = "sqlite-rest-config";
const SQLITE_REST_DIR: &str = "/etc/sqlite-rest";
const AUTH_VOLUME: &str = "sqlite-rest-auth";
const AUTH_DIR: &str = "/etc/auth";

const DEFAULT_ACCESS_KEY_FIELD: &str = "access-key";
const DEFAULT_SECRET_KEY_FIELD: &str = "secret-key";

/// Build the Deployment for a database.
pub fn build_deployment(db: &SqliteDatabase, config: &OperatorConfig) -> Deployment {
    let name = db.name_any();
    let selector = selector_labels(&name);

    Deployment {
        metadata: object_meta(db, workload_name(&name)),
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(selector.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(selector),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    init_containers: Some(vec![init_container(db, config)]),
                    containers: containers(db, config),
                    volumes: Some(volumes(db)),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn data_mount() -> VolumeMount {
    VolumeMount {
        name: DATA_VOLUME.to_string(),
        mount_path: DATA_DIR.to_string(),
        ..Default::default()
    }
}

fn init_container(db: &SqliteDatabase, config: &OperatorConfig) -> Container {
    let mut mounts = vec![data_mount()];
    if db.spec.database.init_script.is_some() {
        mounts.push(VolumeMount {
            name: INIT_SCRIPT_VOLUME.to_string(),
            mount_path: INIT_SCRIPT_DIR.to_string(),
            read_only: Some(true),
            ..Default::default()
        });
    }

    Container {
        name: "init-db".to_string(),
        image: Some(config.images.sqlite.clone()),
        command: Some(vec!["/bin/sh".to_string(), "-c".to_string()]),
        args: Some(vec![init_script(db)]),
        volume_mounts: Some(mounts),
        ..Default::default()
    }
}

/// Shell script creating the database file if it does not exist yet.
fn init_script(db: &SqliteDatabase) -> String {
    let path = shell_quote(&database_path(db));
    let create = if db.spec.database.init_script.is_some() {
        format!(
            "  echo \"Initializing database with init script...\"\n  sqlite3 {} < {}/init.sql\n",
            path, INIT_SCRIPT_DIR
        )
    } else {
        format!(
            "  echo \"Creating empty database...\"\n  sqlite3 {} \"PRAGMA journal_mode=WAL;\"\n",
            path
        )
    };

    format!(
        "set -e\nmkdir -p {dir}\nif [ ! -f {path} ]; then\n{create}else\n  echo \"Database already exists\"\nfi\necho \"Database ready at\" {path}\n",
        dir = DATA_DIR,
        path = path,
        create = create,
    )
}

/// Single-quote `value` for `/bin/sh`.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn containers(db: &SqliteDatabase, config: &OperatorConfig) -> Vec<Container> {
    let resources = container_resources(db);
    let mut containers = Vec::new();

    if let Some(litestream) = db.spec.replication() {
        containers.push(Container {
            resources: resources.clone(),
            ..litestream_container(litestream, config)
        });
    }

    if let Some(rest) = db.spec.rest_api() {
        containers.push(Container {
            resources,
            ..sqlite_rest_container(db, rest, config)
        });
    }

    containers
}

fn litestream_container(litestream: &LitestreamSpec, config: &OperatorConfig) -> Container {
    let env: Vec<EnvVar> = litestream
        .replicas
        .iter()
        .filter_map(|replica| replica.credentials.as_ref())
        .flat_map(|creds| {
            [
                secret_env(
                    "LITESTREAM_ACCESS_KEY_ID",
                    &creds.secret_name,
                    creds
                        .access_key_field
                        .as_deref()
                        .unwrap_or(DEFAULT_ACCESS_KEY_FIELD),
                ),
                secret_env(
                    "LITESTREAM_SECRET_ACCESS_KEY",
                    &creds.secret_name,
                    creds
                        .secret_key_field
                        .as_deref()
                        .unwrap_or(DEFAULT_SECRET_KEY_FIELD),
                ),
            ]
        })
        .collect();

    Container {
        name: "litestream".to_string(),
        image: Some(config.images.litestream.clone()),
        command: Some(vec!["litestream".to_string()]),
        args: Some(vec![
            "replicate".to_string(),
            "-config".to_string(),
            format!("{}/{}", LITESTREAM_DIR, LITESTREAM_CONFIG_KEY),
        ]),
        env: (!env.is_empty()).then_some(env),
        volume_mounts: Some(vec![
            data_mount(),
            VolumeMount {
                name: LITESTREAM_VOLUME.to_string(),
                mount_path: LITESTREAM_DIR.to_string(),
                read_only: Some(true),
                ..Default::default()
            },
        ]),
        ..Default::default()
    }
}

fn secret_env(name: &str, secret: &str, key: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret.to_string(),
                key: key.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn sqlite_rest_container(
    db: &SqliteDatabase,
    rest: &SqliteRestSpec,
    config: &OperatorConfig,
) -> Container {
    let mut mounts = vec![
        data_mount(),
        VolumeMount {
            name: SQLITE_REST_VOLUME.to_string(),
            mount_path: SQLITE_REST_DIR.to_string(),
            read_only: Some(true),
            ..Default::default()
        },
    ];
    if rest.auth_secret.is_some() {
        mounts.push(VolumeMount {
            name: AUTH_VOLUME.to_string(),
            mount_path: AUTH_DIR.to_string(),
            read_only: Some(true),
            ..Default::default()
        });
    }

    Container {
        name: "sqlite-rest".to_string(),
        image: Some(config.images.sqlite_rest.clone()),
        args: Some(sqlite_rest_args(db, rest)),
        ports: Some(sqlite_rest_ports(rest)),
        volume_mounts: Some(mounts),
        ..Default::default()
    }
}

fn sqlite_rest_args(db: &SqliteDatabase, rest: &SqliteRestSpec) -> Vec<String> {
    let mut args = vec![
        "serve".to_string(),
        "--db-dsn".to_string(),
        database_path(db),
        "--http-addr".to_string(),
        format!(":{}", rest.port),
    ];

    if let Some(port) = rest.metrics_port() {
        args.push("--metrics-addr".to_string());
        args.push(format!(":{}", port));
    }

    for table in &rest.allowed_tables {
        args.push("--security-allow-table".to_string());
        args.push(table.clone());
    }

    if rest.auth_secret.is_some() {
        args.push("--auth-token-file".to_string());
        args.push(AUTH_TOKEN_FILE.to_string());
    }

    args
}

fn sqlite_rest_ports(rest: &SqliteRestSpec) -> Vec<ContainerPort> {
    let mut ports = vec![ContainerPort {
        name: Some("http".to_string()),
        container_port: rest.port,
        ..Default::default()
    }];

    if let Some(port) = rest.metrics_port() {
        ports.push(ContainerPort {
            name: Some("metrics".to_string()),
            container_port: port,
            ..Default::default()
        });
    }

    ports
}

fn volumes(db: &SqliteDatabase) -> Vec<Volume> {
    let name = db.name_any();
    let mut volumes = vec![Volume {
        name: DATA_VOLUME.to_string(),
        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
            claim_name: storage_claim_name(&name),
            ..Default::default()
        }),
        ..Default::default()
    }];

    if let Some(script) = &db.spec.database.init_script {
        volumes.push(configmap_volume(INIT_SCRIPT_VOLUME, script.clone()));
    }

    if db.spec.replication().is_some() {
        volumes.push(configmap_volume(
            LITESTREAM_VOLUME,
            litestream_config_name(&name),
        ));
    }

    if let Some(rest) = db.spec.rest_api() {
        volumes.push(configmap_volume(
            SQLITE_REST_VOLUME,
            sqlite_rest_config_name(&name),
        ));

        if let Some(secret) = &rest.auth_secret {
            volumes.push(Volume {
                name: AUTH_VOLUME.to_string(),
                secret: Some(SecretVolumeSource {
                    secret_name: Some(secret.clone()),
                    ..Default::default()
                }),
                ..Default::default()
            });
        }
    }

    volumes
}

fn configmap_volume(volume: &str, configmap: String) -> Volume {
    Volume {
        name: volume.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: configmap,
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn container_resources(db: &SqliteDatabase) -> Option<ResourceRequirements> {
    let resources = db.spec.resources.as_ref()?;
    Some(ResourceRequirements {
        requests: resources.requests.as_ref().map(quantities),
        limits: resources.limits.as_ref().map(quantities),
        ..Default::default()
    })
}

fn quantities(spec: &ResourceSpec) -> BTreeMap<String, Quantity> {
    let mut map = BTreeMap::new();
    if let Some(cpu) = &spec.cpu {
        map.insert("cpu".to_string(), Quantity(cpu.clone()));
    }
    if let Some(memory) = &spec.memory {
        map.insert("memory".to_string(), Quantity(memory.clone()));
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{
        CredentialsSpec, DatabaseSpec, LitestreamSpec, MetricsSpec, ReplicaSpec, ReplicaType,
        ResourceRequirements as SpecResources, SqliteDatabaseSpec,
    };
    use crate::resources::fixtures::database;

    fn pod(deploy: &Deployment) -> &PodSpec {
        deploy
            .spec
            .as_ref()
            .and_then(|s| s.template.spec.as_ref())
            .expect("pod spec")
    }

    fn container<'a>(pod: &'a PodSpec, name: &str) -> Option<&'a Container> {
        pod.containers.iter().find(|c| c.name == name)
    }

    fn volume_names(pod: &PodSpec) -> Vec<&str> {
        pod.volumes
            .as_ref()
            .map(|v| v.iter().map(|v| v.name.as_str()).collect())
            .unwrap_or_default()
    }

    fn replica(secret: Option<&str>) -> ReplicaSpec {
        ReplicaSpec {
            replica_type: ReplicaType::S3,
            bucket: "backups".into(),
            region: None,
            endpoint: None,
            path: Some("orders".into()),
            credentials: secret.map(|s| CredentialsSpec {
                secret_name: s.into(),
                access_key_field: None,
                secret_key_field: Some("aws-secret".into()),
            }),
            retention: None,
            retention_check_interval: None,
        }
    }

    fn api_spec() -> SqliteRestSpec {
        SqliteRestSpec {
            enabled: true,
            port: 8080,
            auth_secret: None,
            allowed_tables: vec![],
            metrics: Some(MetricsSpec {
                enabled: true,
                port: 8081,
            }),
        }
    }

    #[test]
    fn default_spec_runs_litestream_only() {
        let db = database("orders", SqliteDatabaseSpec::default());
        let deploy = build_deployment(&db, &OperatorConfig::default());

        assert_eq!(deploy.metadata.name.as_deref(), Some("orders"));
        assert_eq!(deploy.spec.as_ref().and_then(|s| s.replicas), Some(1));

        let pod = pod(&deploy);
        assert_eq!(pod.containers.len(), 1);
        assert!(container(pod, "litestream").is_some());
        assert!(container(pod, "sqlite-rest").is_none());
        assert_eq!(volume_names(pod), vec!["db-storage", "litestream-config"]);

        let selector = deploy
            .spec
            .as_ref()
            .and_then(|s| s.selector.match_labels.clone())
            .expect("selector");
        let template_labels = deploy
            .spec
            .as_ref()
            .and_then(|s| s.template.metadata.as_ref())
            .and_then(|m| m.labels.clone())
            .expect("template labels");
        assert_eq!(selector, template_labels);
    }

    #[test]
    fn init_container_creates_missing_database() {
        let db = database("orders", SqliteDatabaseSpec::default());
        let deploy = build_deployment(&db, &OperatorConfig::default());
        let init = &pod(&deploy).init_containers.as_ref().expect("init containers")[0];

        assert_eq!(init.name, "init-db");
        let script = &init.args.as_ref().expect("args")[0];
        assert!(script.contains("if [ ! -f '/var/lib/sqlite/database.db' ]"));
        assert!(script.contains("Creating empty database"));
        assert!(!script.contains("init.sql"));
        assert!(!script.contains("tail -f"));
        assert_eq!(init.volume_mounts.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn init_script_quotes_database_path() {
        let db = database(
            "orders",
            SqliteDatabaseSpec {
                database: DatabaseSpec {
                    name: Some("it's a; db.db".into()),
                    ..Default::default()
                },
                ..Default::default()
            },
        );
        let deploy = build_deployment(&db, &OperatorConfig::default());
        let init = &pod(&deploy).init_containers.as_ref().expect("init containers")[0];
        let script = &init.args.as_ref().expect("args")[0];

        let quoted = r"'/var/lib/sqlite/it'\''s a; db.db'";
        assert!(script.contains(&format!("if [ ! -f {} ]", quoted)));
        assert!(script.contains(&format!("sqlite3 {} \"PRAGMA", quoted)));
        assert!(!script.contains("sqlite3 /var/lib/sqlite/it's"));
    }

    #[test]
    fn shell_quote_wraps_and_escapes() {
        assert_eq!(shell_quote("plain"), "'plain'");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn init_script_is_sourced_from_configmap() {
        let db = database(
            "orders",
            SqliteDatabaseSpec {
                database: DatabaseSpec {
                    name: Some("app.db".into()),
                    init_script: Some("orders-schema".into()),
                    ..Default::default()
                },
                ..Default::default()
            },
        );
        let deploy = build_deployment(&db, &OperatorConfig::default());
        let pod = pod(&deploy);
        let init = &pod.init_containers.as_ref().expect("init containers")[0];

        let script = &init.args.as_ref().expect("args")[0];
        assert!(script.contains("sqlite3 '/var/lib/sqlite/app.db' < /init/init.sql"));

        let mounts = init.volume_mounts.as_ref().expect("mounts");
        assert!(mounts.iter().any(|m| m.name == "init-script" && m.mount_path == "/init"));

        let volume = pod
            .volumes
            .as_ref()
            .and_then(|v| v.iter().find(|v| v.name == "init-script"))
            .expect("init-script volume");
        assert_eq!(
            volume.config_map.as_ref().map(|c| c.name.as_str()),
            Some("orders-schema")
        );
    }

    #[test]
    fn credentials_become_secret_env_vars() {
        let db = database(
            "orders",
            SqliteDatabaseSpec {
                litestream: Some(LitestreamSpec {
                    enabled: true,
                    replicas: vec![replica(Some("s3-creds")), replica(None)],
                }),
                ..Default::default()
            },
        );
        let deploy = build_deployment(&db, &OperatorConfig::default());
        let litestream = container(pod(&deploy), "litestream").expect("litestream");

        let env = litestream.env.as_ref().expect("env");
        assert_eq!(env.len(), 2);

        let access = env[0]
            .value_from
            .as_ref()
            .and_then(|v| v.secret_key_ref.as_ref())
            .expect("secret ref");
        assert_eq!(env[0].name, "LITESTREAM_ACCESS_KEY_ID");
        assert_eq!(access.name, "s3-creds");
        assert_eq!(access.key, "access-key");

        let secret = env[1]
            .value_from
            .as_ref()
            .and_then(|v| v.secret_key_ref.as_ref())
            .expect("secret ref");
        assert_eq!(env[1].name, "LITESTREAM_SECRET_ACCESS_KEY");
        assert_eq!(secret.key, "aws-secret");
    }

    #[test]
    fn replica_without_credentials_sets_no_env() {
        let db = database(
            "orders",
            SqliteDatabaseSpec {
                litestream: Some(LitestreamSpec {
                    enabled: true,
                    replicas: vec![replica(None)],
                }),
                ..Default::default()
            },
        );
        let deploy = build_deployment(&db, &OperatorConfig::default());
        let litestream = container(pod(&deploy), "litestream").expect("litestream");
        assert!(litestream.env.is_none());
    }

    #[test]
    fn api_sidecar_args_and_ports_follow_config() {
        let mut rest = api_spec();
        rest.allowed_tables = vec!["users".into(), "orders".into()];
        rest.auth_secret = Some("api-token".into());

        let db = database(
            "orders",
            SqliteDatabaseSpec {
                litestream: Some(LitestreamSpec {
                    enabled: false,
                    replicas: vec![],
                }),
                sqlite_rest: Some(rest),
                ..Default::default()
            },
        );
        let deploy = build_deployment(&db, &OperatorConfig::default());
        let pod = pod(&deploy);
        assert!(container(pod, "litestream").is_none());

        let api = container(pod, "sqlite-rest").expect("sqlite-rest");
        let args = api.args.as_ref().expect("args");
        assert_eq!(
            args,
            &vec![
                "serve",
                "--db-dsn",
                "/var/lib/sqlite/database.db",
                "--http-addr",
                ":8080",
                "--metrics-addr",
                ":8081",
                "--security-allow-table",
                "users",
                "--security-allow-table",
                "orders",
                "--auth-token-file",
                "/etc/auth/token",
            ]
        );

        let ports: Vec<(Option<&str>, i32)> = api
            .ports
            .as_ref()
            .expect("ports")
            .iter()
            .map(|p| (p.name.as_deref(), p.container_port))
            .collect();
        assert_eq!(ports, vec![(Some("http"), 8080), (Some("metrics"), 8081)]);

        let mounts: Vec<&str> = api
            .volume_mounts
            .as_ref()
            .expect("mounts")
            .iter()
            .map(|m| m.mount_path.as_str())
            .collect();
        assert_eq!(mounts, vec!["/var/lib/sqlite", "/etc/sqlite-rest", "/etc/auth"]);

        assert_eq!(
            volume_names(pod),
            vec!["db-storage", "sqlite-rest-config", "sqlite-rest-auth"]
        );
    }

    #[test]
    fn resources_apply_to_sidecars_only() {
        let db = database(
            "orders",
            SqliteDatabaseSpec {
                sqlite_rest: Some(api_spec()),
                resources: Some(SpecResources {
                    requests: Some(ResourceSpec {
                        cpu: Some("100m".into()),
                        memory: Some("128Mi".into()),
                    }),
                    limits: None,
                }),
                ..Default::default()
            },
        );
        let deploy = build_deployment(&db, &OperatorConfig::default());
        let pod = pod(&deploy);

        for sidecar in &pod.containers {
            let requests = sidecar
                .resources
                .as_ref()
                .and_then(|r| r.requests.as_ref())
                .expect("requests");
            assert_eq!(requests["cpu"], Quantity("100m".into()));
            assert_eq!(requests["memory"], Quantity("128Mi".into()));
        }
        assert!(pod.init_containers.as_ref().expect("init")[0].resources.is_none());
    }

    #[test]
    fn images_come_from_config() {
        let mut config = OperatorConfig::default();
        config.images.sqlite = "registry.local/sqlite3:3.45".into();
        config.images.litestream = "registry.local/litestream:0.3".into();

        let db = database("orders", SqliteDatabaseSpec::default());
        let deploy = build_deployment(&db, &config);
        let pod = pod(&deploy);

        assert_eq!(
            pod.init_containers.as_ref().expect("init")[0].image.as_deref(),
            Some("registry.local/sqlite3:3.45")
        );
        assert_eq!(
            container(pod, "litestream").and_then(|c| c.image.as_deref()),
            Some("registry.local/litestream:0.3")
        );
    }

    #[test]
    fn deployment_is_deterministic() {
        let db = database(
            "orders",
            SqliteDatabaseSpec {
                sqlite_rest: Some(api_spec()),
                ..Default::default()
            },
        );
        let config = OperatorConfig::default();
        assert_eq!(build_deployment(&db, &config), build_deployment(&db, &config));
    }
}
