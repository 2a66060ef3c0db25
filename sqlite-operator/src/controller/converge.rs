//! Create-or-update convergence of dependent objects.

use crate::crd::SqliteDatabase;
use crate::error::{OperatorError, OperatorResult};
use crate::store::{ObjectStore, StoredObject};
use kube::{Resource, ResourceExt};

/// What [`ensure`] did to the live object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// The object did not exist and was created.
    Created,
    /// The object existed and was written back after mutation.
    Updated,
    /// The object existed and mutation changed nothing.
    Unchanged,
}

/// Converge one dependent object.
///
/// If no object with the desired name exists, `mutate` is applied to `desired`
/// and the result is created. Otherwise `mutate` is applied to the live object,
/// which is replaced only if that changed it. Concurrent writers are detected
/// by the store through the live object's resource version.
pub async fn ensure<S, K, F>(store: &S, desired: K, mutate: F) -> OperatorResult<EnsureOutcome>
where
    S: ObjectStore,
    K: StoredObject,
    F: FnOnce(&mut K) -> OperatorResult<()>,
{
    let kind = K::kind(&()).to_string();
    let name = desired.name_any();
    let namespace = desired.namespace().ok_or_else(|| {
        OperatorError::InvalidConfig(format!("{} {} has no namespace", kind, name))
    })?;

    match store.get::<K>(&namespace, &name).await? {
        None => {
            let mut object = desired;
            mutate(&mut object)?;
            store.create(&namespace, &object).await?;
            tracing::info!(kind = %kind, name = %name, namespace = %namespace, "Created");
            Ok(EnsureOutcome::Created)
        }
        Some(live) => {
            let mut object = live.clone();
            mutate(&mut object)?;
            if serde_json::to_value(&object)? == serde_json::to_value(&live)? {
                tracing::debug!(kind = %kind, name = %name, namespace = %namespace, "Up to date");
                return Ok(EnsureOutcome::Unchanged);
            }

            store.replace(&namespace, &object).await?;
            tracing::info!(kind = %kind, name = %name, namespace = %namespace, "Updated");
            Ok(EnsureOutcome::Updated)
        }
    }
}

/// Make `owner` the controller of `object`.
///
/// A reference with the owner's UID is refreshed in place. If another
/// controller reference is present the object belongs to someone else and an
/// ownership conflict is returned.
pub fn set_controller_reference<K: Resource<DynamicType = ()>>(
    owner: &SqliteDatabase,
    object: &mut K,
) -> OperatorResult<()> {
    let owner_ref = owner.controller_owner_ref(&()).ok_or_else(|| {
        OperatorError::InvalidConfig(format!(
            "SqliteDatabase {} has no uid to own dependents",
            owner.name_any()
        ))
    })?;

    let kind = K::kind(&()).to_string();
    let name = object.meta().name.clone().unwrap_or_default();
    let refs = object
        .meta_mut()
        .owner_references
        .get_or_insert_with(Vec::new);

    if let Some(existing) = refs.iter_mut().find(|r| r.uid == owner_ref.uid) {
        *existing = owner_ref;
        return Ok(());
    }

    if let Some(other) = refs.iter().find(|r| r.controller == Some(true)) {
        return Err(OperatorError::OwnershipConflict {
            kind,
            name,
            owner: format!("{}/{}", other.kind, other.name),
        });
    }

    refs.push(owner_ref);
    Ok(())
}
