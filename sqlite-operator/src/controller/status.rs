//! Status derivation for SqliteDatabase.
//!
//! Status is recomputed from scratch on every reconcile from the observed
//! Deployment. The only state carried over from the previous status is the
//! Ready condition's transition time and the observed generation.

use crate::config::OperatorConfig;
use crate::crd::{
    ConditionStatus, DatabaseCondition, DatabasePhase, EndpointsStatus, SqliteDatabase,
    SqliteDatabaseStatus,
};
use crate::error::OperatorError;
use crate::resources::service_name;
use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1::Deployment;
use kube::ResourceExt;

/// Type of the readiness condition.
pub const READY_CONDITION: &str = "Ready";

/// What the controller saw when it looked up the Deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkloadObservation {
    /// The Deployment does not exist.
    NotFound,
    /// The lookup failed for a reason other than not-found.
    LookupFailed(String),
    /// The Deployment exists with this many ready replicas.
    Found {
        /// Ready replica count.
        ready_replicas: i32,
    },
}

impl WorkloadObservation {
    /// Classify the result of a Deployment lookup.
    pub fn from_lookup(result: Result<Option<Deployment>, OperatorError>) -> Self {
        match result {
            Ok(None) => Self::NotFound,
            Ok(Some(deployment)) => Self::Found {
                ready_replicas: deployment
                    .status
                    .and_then(|s| s.ready_replicas)
                    .unwrap_or(0),
            },
            Err(e) => Self::LookupFailed(e.to_string()),
        }
    }
}

/// Derive the status of `db` from the observed Deployment.
pub fn derive_status(
    db: &SqliteDatabase,
    observation: &WorkloadObservation,
    config: &OperatorConfig,
    now: DateTime<Utc>,
) -> SqliteDatabaseStatus {
    let (phase, message, replicas) = match observation {
        WorkloadObservation::NotFound => (DatabasePhase::Pending, "Deployment not found".to_string(), 0),
        WorkloadObservation::LookupFailed(err) => (
            DatabasePhase::Failed,
            format!("Failed to get deployment: {}", err),
            0,
        ),
        WorkloadObservation::Found { ready_replicas } if *ready_replicas > 0 => (
            DatabasePhase::Running,
            "Database is running successfully".to_string(),
            *ready_replicas,
        ),
        WorkloadObservation::Found { ready_replicas } => (
            DatabasePhase::Pending,
            "Deployment is starting".to_string(),
            *ready_replicas,
        ),
    };

    let endpoints = if phase == DatabasePhase::Running {
        endpoints(db, config)
    } else {
        None
    };

    let (condition_status, reason) = if phase == DatabasePhase::Running {
        (ConditionStatus::True, "ReconciliationSucceeded")
    } else {
        (ConditionStatus::False, "ReconciliationInProgress")
    };

    build_status(db, phase, message, replicas, endpoints, condition_status, reason, now)
}

/// Status recorded when reconciliation stops on an invalid spec.
pub fn failed_status(
    db: &SqliteDatabase,
    error: &OperatorError,
    now: DateTime<Utc>,
) -> SqliteDatabaseStatus {
    build_status(
        db,
        DatabasePhase::Failed,
        error.to_string(),
        0,
        None,
        ConditionStatus::False,
        "ReconciliationFailed",
        now,
    )
}

#[allow(clippy::too_many_arguments)]
fn build_status(
    db: &SqliteDatabase,
    phase: DatabasePhase,
    message: String,
    replicas: i32,
    endpoints: Option<EndpointsStatus>,
    condition_status: ConditionStatus,
    reason: &str,
    now: DateTime<Utc>,
) -> SqliteDatabaseStatus {
    let previous = db.status.as_ref();
    let condition = DatabaseCondition {
        condition_type: READY_CONDITION.to_string(),
        status: condition_status,
        reason: reason.to_string(),
        message: message.clone(),
        last_transition_time: transition_time(previous, condition_status, now),
    };

    let mut conditions: Vec<DatabaseCondition> = previous
        .map(|s| s.conditions.clone())
        .unwrap_or_default();
    match conditions
        .iter_mut()
        .find(|c| c.condition_type == READY_CONDITION)
    {
        Some(existing) => *existing = condition,
        None => conditions.push(condition),
    }

    SqliteDatabaseStatus {
        phase,
        message: Some(message),
        replicas,
        endpoints,
        conditions,
        observed_generation: previous
            .and_then(|s| s.observed_generation)
            .max(db.metadata.generation),
    }
}

fn transition_time(
    previous: Option<&SqliteDatabaseStatus>,
    status: ConditionStatus,
    now: DateTime<Utc>,
) -> String {
    previous
        .and_then(|s| s.condition(READY_CONDITION))
        .filter(|c| c.status == status)
        .map(|c| c.last_transition_time.clone())
        .unwrap_or_else(|| now.to_rfc3339())
}

fn endpoints(db: &SqliteDatabase, config: &OperatorConfig) -> Option<EndpointsStatus> {
    let rest = db.spec.rest_api()?;
    let host = format!(
        "{}.{}.{}",
        service_name(&db.name_any()),
        db.namespace().unwrap_or_default(),
        config.cluster_domain
    );

    Some(EndpointsStatus {
        rest: Some(format!("http://{}:{}", host, rest.port)),
        metrics: rest
            .metrics_port()
            .map(|port| format!("http://{}:{}", host, port)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{MetricsSpec, SqliteDatabaseSpec, SqliteRestSpec};
    use crate::resources::fixtures::database;
    use chrono::TimeZone;
    use k8s_openapi::api::apps::v1::DeploymentStatus;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0)
            .single()
            .expect("valid timestamp")
    }

    fn with_api() -> SqliteDatabase {
        database(
            "orders",
            SqliteDatabaseSpec {
                sqlite_rest: Some(SqliteRestSpec {
                    enabled: true,
                    port: 8080,
                    auth_secret: None,
                    allowed_tables: vec![],
                    metrics: Some(MetricsSpec {
                        enabled: true,
                        port: 8081,
                    }),
                }),
                ..Default::default()
            },
        )
    }

    #[test]
    fn missing_deployment_is_pending() {
        let db = database("orders", SqliteDatabaseSpec::default());
        let status = derive_status(
            &db,
            &WorkloadObservation::NotFound,
            &OperatorConfig::default(),
            at(0),
        );

        assert_eq!(status.phase, DatabasePhase::Pending);
        assert_eq!(status.message.as_deref(), Some("Deployment not found"));
        assert_eq!(status.replicas, 0);
        assert!(status.endpoints.is_none());

        let ready = status.condition(READY_CONDITION).expect("ready condition");
        assert_eq!(ready.status, ConditionStatus::False);
        assert_eq!(ready.reason, "ReconciliationInProgress");
        assert_eq!(ready.message, "Deployment not found");
    }

    #[test]
    fn lookup_failure_is_failed() {
        let db = database("orders", SqliteDatabaseSpec::default());
        let status = derive_status(
            &db,
            &WorkloadObservation::LookupFailed("connection refused".into()),
            &OperatorConfig::default(),
            at(0),
        );

        assert_eq!(status.phase, DatabasePhase::Failed);
        assert_eq!(
            status.message.as_deref(),
            Some("Failed to get deployment: connection refused")
        );
    }

    #[test]
    fn ready_deployment_is_running_with_endpoints() {
        let status = derive_status(
            &with_api(),
            &WorkloadObservation::Found { ready_replicas: 1 },
            &OperatorConfig::default(),
            at(0),
        );

        assert_eq!(status.phase, DatabasePhase::Running);
        assert_eq!(status.replicas, 1);
        assert_eq!(
            status.message.as_deref(),
            Some("Database is running successfully")
        );

        let endpoints = status.endpoints.as_ref().expect("endpoints");
        assert_eq!(
            endpoints.rest.as_deref(),
            Some("http://orders-service.default.svc.cluster.local:8080")
        );
        assert_eq!(
            endpoints.metrics.as_deref(),
            Some("http://orders-service.default.svc.cluster.local:8081")
        );

        let ready = status.condition(READY_CONDITION).expect("ready condition");
        assert_eq!(ready.status, ConditionStatus::True);
        assert_eq!(ready.reason, "ReconciliationSucceeded");
    }

    #[test]
    fn running_without_api_has_no_endpoints() {
        let db = database("orders", SqliteDatabaseSpec::default());
        let status = derive_status(
            &db,
            &WorkloadObservation::Found { ready_replicas: 2 },
            &OperatorConfig::default(),
            at(0),
        );
        assert_eq!(status.phase, DatabasePhase::Running);
        assert!(status.endpoints.is_none());
    }

    #[test]
    fn unready_deployment_is_starting() {
        let status = derive_status(
            &with_api(),
            &WorkloadObservation::Found { ready_replicas: 0 },
            &OperatorConfig::default(),
            at(0),
        );
        assert_eq!(status.phase, DatabasePhase::Pending);
        assert_eq!(status.message.as_deref(), Some("Deployment is starting"));
        assert!(status.endpoints.is_none());
    }

    #[test]
    fn endpoints_use_configured_cluster_domain() {
        let config = OperatorConfig::default().with_cluster_domain("svc.example.internal");
        let status = derive_status(
            &with_api(),
            &WorkloadObservation::Found { ready_replicas: 1 },
            &config,
            at(0),
        );
        assert_eq!(
            status.endpoints.and_then(|e| e.rest).as_deref(),
            Some("http://orders-service.default.svc.example.internal:8080")
        );
    }

    #[test]
    fn transition_time_changes_only_on_flip() {
        let config = OperatorConfig::default();
        let mut db = with_api();

        let first = derive_status(&db, &WorkloadObservation::NotFound, &config, at(0));
        db.status = Some(first.clone());

        let second = derive_status(
            &db,
            &WorkloadObservation::Found { ready_replicas: 0 },
            &config,
            at(10),
        );
        assert_eq!(
            second.condition(READY_CONDITION).map(|c| &c.last_transition_time),
            first.condition(READY_CONDITION).map(|c| &c.last_transition_time)
        );
        assert_eq!(second.conditions.len(), 1);
        db.status = Some(second);

        let third = derive_status(
            &db,
            &WorkloadObservation::Found { ready_replicas: 1 },
            &config,
            at(20),
        );
        assert_eq!(
            third
                .condition(READY_CONDITION)
                .map(|c| c.last_transition_time.clone()),
            Some(at(20).to_rfc3339())
        );
    }

    #[test]
    fn other_conditions_are_preserved() {
        let mut db = with_api();
        db.status = Some(SqliteDatabaseStatus {
            conditions: vec![DatabaseCondition {
                condition_type: "Replicating".into(),
                status: ConditionStatus::True,
                reason: "Healthy".into(),
                message: String::new(),
                last_transition_time: at(0).to_rfc3339(),
            }],
            ..Default::default()
        });

        let status = derive_status(
            &db,
            &WorkloadObservation::NotFound,
            &OperatorConfig::default(),
            at(5),
        );
        assert_eq!(status.conditions.len(), 2);
        assert!(status.condition("Replicating").is_some());
    }

    #[test]
    fn observed_generation_never_moves_backwards() {
        let mut db = with_api();
        db.metadata.generation = Some(3);
        db.status = Some(SqliteDatabaseStatus {
            observed_generation: Some(5),
            ..Default::default()
        });

        let status = derive_status(
            &db,
            &WorkloadObservation::NotFound,
            &OperatorConfig::default(),
            at(0),
        );
        assert_eq!(status.observed_generation, Some(5));

        db.metadata.generation = Some(6);
        let status = derive_status(
            &db,
            &WorkloadObservation::NotFound,
            &OperatorConfig::default(),
            at(0),
        );
        assert_eq!(status.observed_generation, Some(6));
    }

    #[test]
    fn precondition_failure_status() {
        let db = with_api();
        let err = OperatorError::Precondition("ingress host is required".into());
        let status = failed_status(&db, &err, at(0));

        assert_eq!(status.phase, DatabasePhase::Failed);
        assert_eq!(
            status.message.as_deref(),
            Some("Precondition failed: ingress host is required")
        );
        let ready = status.condition(READY_CONDITION).expect("ready condition");
        assert_eq!(ready.status, ConditionStatus::False);
        assert_eq!(ready.reason, "ReconciliationFailed");
    }

    #[test]
    fn lookup_result_is_classified() {
        assert_eq!(
            WorkloadObservation::from_lookup(Ok(None)),
            WorkloadObservation::NotFound
        );

        let deployment = Deployment {
            status: Some(DeploymentStatus {
                ready_replicas: Some(1),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(
            WorkloadObservation::from_lookup(Ok(Some(deployment))),
            WorkloadObservation::Found { ready_replicas: 1 }
        );
        assert_eq!(
            WorkloadObservation::from_lookup(Ok(Some(Deployment::default()))),
            WorkloadObservation::Found { ready_replicas: 0 }
        );
        assert!(matches!(
            WorkloadObservation::from_lookup(Err(OperatorError::ApiError("boom".into()))),
            WorkloadObservation::LookupFailed(_)
        ));
    }
}
