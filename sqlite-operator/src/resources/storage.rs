//! PersistentVolumeClaim holding the database file.

use super::{object_meta, storage_claim_name};
use crate::crd::SqliteDatabase;
use k8s_openapi::api::core::v1::{
    PersistentVolumeClaim, PersistentVolumeClaimSpec, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::ResourceExt;
use std::collections::BTreeMap;

/// Build the PersistentVolumeClaim for a database.
pub fn build_storage_claim(db: &SqliteDatabase) -> PersistentVolumeClaim {
    let storage = &db.spec.database.storage;

    PersistentVolumeClaim {
        metadata: object_meta(db, storage_claim_name(&db.name_any())),
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec![storage.access_mode().as_str().to_string()]),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(storage.size().to_string()),
                )])),
                ..Default::default()
            }),
            storage_class_name: storage.storage_class.clone(),
            ..Default::default()
        }),
        ..Default::default()
    }
}
