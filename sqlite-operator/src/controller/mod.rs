//! Kubernetes controller for SqliteDatabase resources.
//!
//! - [`DatabaseController`]: the reconcile orchestrator
//! - [`ensure`]: create-or-update convergence of one dependent object
//! - [`derive_status`]: status computed from the observed Deployment
//!
//! # Usage with kube-runtime
//!
//! The controller runtime requires both a reconcile function and an error policy:
//!
//! ```ignore
//! use sqlite_operator::controller::{DatabaseController, error_policy};
//!
//! Controller::new(databases, watcher_config)
//!     .run(|db, ctx| async move {
//!         let controller = DatabaseController::new(ctx.clone());
//!         controller.reconcile(&db.namespace().unwrap_or_default(), &db.name_any()).await
//!     }, error_policy, context)
//!     .for_each(|_| futures::future::ready(()))
//!     .await;
//! ```

mod converge;
mod database;
mod status;

pub use converge::{EnsureOutcome, ensure, set_controller_reference};
pub use database::DatabaseController;
pub use status::{READY_CONDITION, WorkloadObservation, derive_status, failed_status};

use crate::config::OperatorConfig;
use crate::crd::SqliteDatabase;
use crate::error::OperatorError;
use crate::store::KubeStore;
use std::sync::Arc;
use std::time::Duration;

/// Shared context for controllers.
pub struct ControllerContext<S = KubeStore> {
    /// Object store.
    pub store: S,
    /// Operator configuration.
    pub config: OperatorConfig,
}

impl<S> ControllerContext<S> {
    /// Create a new controller context.
    pub fn new(store: S, config: OperatorConfig) -> Self {
        Self { store, config }
    }
}

/// Result type for reconciliation actions.
#[derive(Debug)]
pub enum ReconcileAction {
    /// Requeue after the specified duration.
    Requeue(Duration),
    /// Don't requeue (reconciliation complete).
    Done,
}

impl From<ReconcileAction> for kube::runtime::controller::Action {
    fn from(action: ReconcileAction) -> Self {
        match action {
            ReconcileAction::Requeue(duration) => Self::requeue(duration),
            ReconcileAction::Done => Self::await_change(),
        }
    }
}

/// Handle errors during reconciliation.
pub fn error_policy<S>(
    _db: Arc<SqliteDatabase>,
    error: &OperatorError,
    ctx: Arc<ControllerContext<S>>,
) -> kube::runtime::controller::Action {
    tracing::error!(error = %error, "Reconciliation error");
    kube::runtime::controller::Action::requeue(ctx.config.error_requeue)
}
