//! Service and Ingress exposing the sqlite-rest API.

use super::{ingress_name, object_meta, selector_labels, service_name};
use crate::config::OperatorConfig;
use crate::crd::{IngressSpec, SqliteDatabase, SqliteRestSpec, defaults::DEFAULT_REST_PORT};
use crate::error::{OperatorError, OperatorResult};
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec as KubeIngressSpec, IngressTLS, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use std::collections::BTreeMap;

/// Annotation naming the cert-manager ClusterIssuer for TLS Ingresses.
pub const CERT_ISSUER_ANNOTATION: &str = "cert-manager.io/cluster-issuer";

/// Build the ClusterIP Service in front of the sqlite-rest sidecar.
pub fn build_service(db: &SqliteDatabase, rest: &SqliteRestSpec) -> Service {
    let mut ports = vec![service_port("http", rest.port)];
    if let Some(port) = rest.metrics_port() {
        ports.push(service_port("metrics", port));
    }

    Service {
        metadata: object_meta(db, service_name(&db.name_any())),
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(selector_labels(&db.name_any())),
            ports: Some(ports),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn service_port(name: &str, port: i32) -> ServicePort {
    ServicePort {
        name: Some(name.to_string()),
        port,
        target_port: Some(IntOrString::Int(port)),
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }
}

/// Build the Ingress routing `host` to the API Service.
///
/// Fails with a precondition error when no host is configured. TLS is only
/// set up when it is enabled and a certificate Secret is named.
pub fn build_ingress(
    db: &SqliteDatabase,
    ingress: &IngressSpec,
    config: &OperatorConfig,
) -> OperatorResult<Ingress> {
    let name = db.name_any();
    let host = ingress
        .host
        .as_deref()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| {
            OperatorError::Precondition(format!(
                "ingress host is required when ingress is enabled for SqliteDatabase {}",
                name
            ))
        })?;

    let port = db
        .spec
        .sqlite_rest
        .as_ref()
        .map(|r| r.port)
        .unwrap_or(DEFAULT_REST_PORT);

    let tls_secret = ingress
        .tls
        .as_ref()
        .filter(|t| t.enabled)
        .and_then(|t| t.secret_name.clone());

    let mut metadata = object_meta(db, ingress_name(&name));
    if tls_secret.is_some() {
        metadata.annotations = Some(BTreeMap::from([(
            CERT_ISSUER_ANNOTATION.to_string(),
            config.cert_issuer.clone(),
        )]));
    }

    let rule = IngressRule {
        host: Some(host.to_string()),
        http: Some(HTTPIngressRuleValue {
            paths: vec![HTTPIngressPath {
                path: Some("/".to_string()),
                path_type: "Prefix".to_string(),
                backend: IngressBackend {
                    service: Some(IngressServiceBackend {
                        name: service_name(&name),
                        port: Some(ServiceBackendPort {
                            number: Some(port),
                            ..Default::default()
                        }),
                    }),
                    ..Default::default()
                },
            }],
        }),
    };

    Ok(Ingress {
        metadata,
        spec: Some(KubeIngressSpec {
            rules: Some(vec![rule]),
            tls: tls_secret.map(|secret| {
                vec![IngressTLS {
                    hosts: Some(vec![host.to_string()]),
                    secret_name: Some(secret),
                }]
            }),
            ..Default::default()
        }),
        ..Default::default()
    })
}
