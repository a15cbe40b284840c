// zfs_management/clones.rs
// Clone operations: create, promote, inspect, list, destroy

use super::driver::{open_dataset, property_tree, Properties, ZfsDriver};
use super::helpers::{validate_dataset_name, validate_name, validate_snapshot_name};
use super::props::{self, PropClass, PROPERTY_BUFFER_SIZE};
use super::types::{CloneInfo, DatasetType, TypeMask};
use crate::backend::{Backend, DatasetObject};
use crate::errors::{op, Result, ZfsError};
use tracing::{debug, info};

/// Origin snapshot of `ds`, or None when it is not a clone.
///
/// A failed lookup and an empty value both mean "not a clone".
fn origin_of<D: DatasetObject>(ds: &D) -> Option<String> {
    let def = props::lookup(PropClass::Dataset, "origin")?;
    let mut buf = vec![0u8; PROPERTY_BUFFER_SIZE];
    match ds.get_prop(def, &mut buf) {
        Ok(_) => {
            let origin = props::buffer_str(&buf);
            (!origin.is_empty() && origin != "-").then_some(origin)
        }
        Err(failure) => {
            debug!(dataset = %ds.name(), code = failure.code, "no origin");
            None
        }
    }
}

/// Names of the clones of snapshot `ds`, sorted
fn clone_names<D: DatasetObject>(ds: &D, op: &'static str) -> Result<Vec<String>> {
    let tree = ds
        .clones()
        .map_err(|f| ZfsError::from_backend(op, &ds.name(), f))?;
    let mut names: Vec<String> = tree
        .map(|t| t.iter().map(|(name, _)| name.to_string()).collect())
        .unwrap_or_default();
    names.sort();
    Ok(names)
}

impl<B: Backend> ZfsDriver<B> {
    /// Clone `snapshot` into the new dataset `clone`.
    ///
    /// The snapshot is opened first; failing to open it ends the call.
    pub fn create_clone(&self, snapshot: &str, clone: &str, props: &Properties) -> Result<()> {
        validate_snapshot_name(op::CREATE_CLONE, snapshot)?;
        validate_dataset_name(op::CREATE_CLONE, clone)?;
        let tree = property_tree(op::CREATE_CLONE, props)?;
        self.with_backend(op::CREATE_CLONE, |backend| {
            let snap = open_dataset(backend, op::CREATE_CLONE, snapshot, TypeMask::SNAPSHOT)?;
            debug!(op = op::CREATE_CLONE, snapshot, clone, "cloning snapshot");
            snap.clone_to(clone, tree.as_ref())
                .map_err(|f| ZfsError::from_backend(op::CREATE_CLONE, clone, f))?;
            info!(snapshot, clone, "clone created");
            Ok(())
        })
    }

    /// Promote a clone so it no longer depends on its origin
    pub fn promote_clone(&self, clone: &str) -> Result<()> {
        validate_dataset_name(op::PROMOTE_CLONE, clone)?;
        self.with_backend(op::PROMOTE_CLONE, |backend| {
            let mask = TypeMask::FILESYSTEM | TypeMask::VOLUME;
            let mut ds = open_dataset(backend, op::PROMOTE_CLONE, clone, mask)?;
            if origin_of(&ds).is_none() {
                return Err(ZfsError::invalid(op::PROMOTE_CLONE, clone, "dataset is not a clone"));
            }
            debug!(op = op::PROMOTE_CLONE, clone, "promoting clone");
            ds.promote()
                .map_err(|f| ZfsError::from_backend(op::PROMOTE_CLONE, clone, f))?;
            info!(clone, "clone promoted");
            Ok(())
        })
    }

    /// Clone relationships of any dataset. For a snapshot, `clone_count` and
    /// `dependents` list the datasets cloned from it.
    pub fn get_clone_info(&self, name: &str) -> Result<CloneInfo> {
        validate_name(op::GET_CLONE_INFO, name)?;
        self.with_backend(op::GET_CLONE_INFO, |backend| {
            let ds = open_dataset(backend, op::GET_CLONE_INFO, name, TypeMask::DATASET)?;
            let origin = origin_of(&ds);
            let dependents = if ds.kind() == DatasetType::Snapshot {
                clone_names(&ds, op::GET_CLONE_INFO)?
            } else {
                Vec::new()
            };
            Ok(CloneInfo {
                name: name.to_string(),
                is_clone: origin.is_some(),
                origin: origin.unwrap_or_default(),
                clone_count: dependents.len() as u64,
                dependents,
            })
        })
    }

    /// Datasets cloned from `snapshot`, sorted by name
    pub fn list_clones(&self, snapshot: &str) -> Result<Vec<String>> {
        validate_snapshot_name(op::LIST_CLONES, snapshot)?;
        self.with_backend(op::LIST_CLONES, |backend| {
            let snap = open_dataset(backend, op::LIST_CLONES, snapshot, TypeMask::SNAPSHOT)?;
            clone_names(&snap, op::LIST_CLONES)
        })
    }

    /// Destroy a clone. Without `force` the target must have an origin.
    pub fn destroy_clone(&self, clone: &str, force: bool) -> Result<()> {
        validate_dataset_name(op::DESTROY_CLONE, clone)?;
        self.with_backend(op::DESTROY_CLONE, |backend| {
            let mask = TypeMask::FILESYSTEM | TypeMask::VOLUME;
            let ds = open_dataset(backend, op::DESTROY_CLONE, clone, mask)?;
            if !force && origin_of(&ds).is_none() {
                return Err(ZfsError::invalid(op::DESTROY_CLONE, clone, "dataset is not a clone"));
            }
            debug!(op = op::DESTROY_CLONE, clone, force, "destroying clone");
            ds.destroy(false)
                .map_err(|f| ZfsError::from_backend(op::DESTROY_CLONE, clone, f))?;
            info!(clone, "clone destroyed");
            Ok(())
        })
    }
}
