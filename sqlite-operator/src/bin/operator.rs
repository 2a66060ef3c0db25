//! SQLite Kubernetes Operator binary.
//!
//! This binary runs the operator, which manages SqliteDatabase custom
//! resources in a Kubernetes cluster.

use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use kube::runtime::Controller;
use kube::runtime::controller::Action;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Api, Client, CustomResourceExt, ResourceExt};
use sqlite_operator::config::OperatorConfig;
use sqlite_operator::controller::{ControllerContext, DatabaseController, error_policy};
use sqlite_operator::crd::SqliteDatabase;
use sqlite_operator::error::OperatorError;
use sqlite_operator::store::KubeStore;
use sqlite_operator::telemetry::{LogConfig, init_tracing};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Check for CRD generation mode
    if std::env::args().any(|arg| arg == "--generate-crds") {
        generate_crds()?;
        return Ok(());
    }

    init_tracing(&LogConfig::from_env())?;

    tracing::info!("Starting SQLite Kubernetes Operator");

    let config = OperatorConfig::from_env();
    tracing::info!(
        cluster_domain = %config.cluster_domain,
        resync_secs = config.resync_interval.as_secs(),
        "Loaded operator configuration"
    );

    // Connect to Kubernetes
    let client = Client::try_default().await?;
    tracing::info!("Connected to Kubernetes cluster");

    let ctx = Arc::new(ControllerContext::new(KubeStore::new(client.clone()), config));
    run_database_controller(client, ctx).await
}

/// Run the SqliteDatabase controller.
async fn run_database_controller(
    client: Client,
    ctx: Arc<ControllerContext<KubeStore>>,
) -> anyhow::Result<()> {
    tracing::info!("Starting SqliteDatabase controller");

    let databases: Api<SqliteDatabase> = Api::all(client.clone());
    let deployments: Api<Deployment> = Api::all(client);
    let controller = DatabaseController::new(ctx.clone());

    Controller::new(databases, WatcherConfig::default())
        .owns(deployments, WatcherConfig::default())
        .shutdown_on_signal()
        .run(
            move |db, _ctx| {
                let controller = controller.clone();
                async move {
                    let namespace = db.namespace().ok_or_else(|| {
                        OperatorError::InvalidConfig("SqliteDatabase must be namespaced".into())
                    })?;
                    let action = controller.reconcile(&namespace, &db.name_any()).await?;
                    Ok::<Action, OperatorError>(action.into())
                }
            },
            error_policy,
            ctx,
        )
        .for_each(|result| async move {
            match result {
                Ok((obj, action)) => {
                    tracing::debug!(
                        name = %obj.name,
                        namespace = ?obj.namespace,
                        ?action,
                        "Reconciled database"
                    );
                }
                Err(e) => {
                    tracing::error!(error = %e, "Database controller stream error");
                }
            }
        })
        .await;

    Ok(())
}

/// Generate CRD YAML.
fn generate_crds() -> anyhow::Result<()> {
    println!("---");
    println!("{}", serde_yaml::to_string(&SqliteDatabase::crd())?);
    Ok(())
}
