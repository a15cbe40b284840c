// zfs_management/snapshots.rs
// Snapshot operations: list, create, destroy, rollback

use super::driver::{open_dataset, property_tree, Properties, ZfsDriver};
use super::helpers::{split_snapshot, validate_dataset_name, validate_snapshot_name};
use super::iter::describe;
use super::types::{DatasetInfo, TypeMask};
use crate::backend::{Backend, DatasetObject, Visit};
use crate::errors::{op, Result, ZfsError};
use tracing::{debug, info};

/// Full snapshot name for a rollback target given bare or qualified
fn rollback_target(dataset: &str, snapshot: &str) -> Result<String> {
    match split_snapshot(snapshot) {
        Some((owner, _)) => {
            if owner != dataset {
                return Err(ZfsError::invalid(
                    op::ROLLBACK,
                    snapshot,
                    format!("snapshot does not belong to '{}'", dataset),
                ));
            }
            validate_snapshot_name(op::ROLLBACK, snapshot)?;
            Ok(snapshot.to_string())
        }
        None if snapshot.is_empty() => Err(ZfsError::invalid(
            op::ROLLBACK,
            dataset,
            "snapshot name must not be empty",
        )),
        None => Ok(format!("{}@{}", dataset, snapshot)),
    }
}

impl<B: Backend> ZfsDriver<B> {
    /// Snapshots of one dataset, oldest first
    pub fn list_snapshots(&self, dataset: &str) -> Result<Vec<DatasetInfo>> {
        validate_dataset_name(op::LIST_SNAPSHOTS, dataset)?;
        self.with_backend(op::LIST_SNAPSHOTS, |backend| {
            let mask = TypeMask::FILESYSTEM | TypeMask::VOLUME;
            let ds = open_dataset(backend, op::LIST_SNAPSHOTS, dataset, mask)?;
            debug!(op = op::LIST_SNAPSHOTS, dataset, "iterating snapshots");
            let mut snapshots = Vec::new();
            ds.iter_snapshots(&mut |snap| {
                snapshots.push(describe(&snap));
                Visit::Continue
            })
            .map_err(|f| ZfsError::from_backend(op::LIST_SNAPSHOTS, dataset, f))?;
            Ok(snapshots)
        })
    }

    /// Create `dataset@snap`; `recursive` snapshots every descendant under the
    /// same name atomically
    pub fn create_snapshot(&self, name: &str, recursive: bool, props: &Properties) -> Result<()> {
        let (dataset, snap) = validate_snapshot_name(op::CREATE_SNAPSHOT, name)?;
        let tree = property_tree(op::CREATE_SNAPSHOT, props)?;
        self.with_backend(op::CREATE_SNAPSHOT, |backend| {
            debug!(
                op = op::CREATE_SNAPSHOT,
                dataset,
                snapshot = snap,
                recursive,
                "creating snapshot"
            );
            backend
                .snapshot(name, recursive, tree.as_ref())
                .map_err(|f| ZfsError::from_backend(op::CREATE_SNAPSHOT, name, f))?;
            info!(snapshot = name, recursive, "snapshot created");
            Ok(())
        })
    }

    pub fn destroy_snapshot(&self, name: &str) -> Result<()> {
        validate_snapshot_name(op::DESTROY_SNAPSHOT, name)?;
        self.with_backend(op::DESTROY_SNAPSHOT, |backend| {
            let snap = open_dataset(backend, op::DESTROY_SNAPSHOT, name, TypeMask::SNAPSHOT)?;
            debug!(op = op::DESTROY_SNAPSHOT, snapshot = name, "destroying snapshot");
            snap.destroy(false)
                .map_err(|f| ZfsError::from_backend(op::DESTROY_SNAPSHOT, name, f))?;
            info!(snapshot = name, "snapshot destroyed");
            Ok(())
        })
    }

    /// Roll `dataset` back to `snapshot` (bare name or `dataset@snap`).
    ///
    /// Without `force` the backend refuses when newer snapshots exist; with it
    /// they are destroyed as part of the rollback.
    pub fn rollback(&self, dataset: &str, snapshot: &str, force: bool) -> Result<()> {
        validate_dataset_name(op::ROLLBACK, dataset)?;
        let target = rollback_target(dataset, snapshot)?;
        self.with_backend(op::ROLLBACK, |backend| {
            let mask = TypeMask::FILESYSTEM | TypeMask::VOLUME;
            let mut ds = open_dataset(backend, op::ROLLBACK, dataset, mask)?;
            let snap = open_dataset(backend, op::ROLLBACK, &target, TypeMask::SNAPSHOT)?;
            debug!(op = op::ROLLBACK, dataset, snapshot = %target, force, "rolling back");
            ds.rollback(&snap, force)
                .map_err(|f| ZfsError::from_backend(op::ROLLBACK, dataset, f))?;
            info!(dataset, snapshot = %target, "rolled back");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::is_invalid_argument;

    /// Test: bare and qualified rollback targets resolve to the same name
    #[test]
    fn test_rollback_target_forms() {
        assert_eq!(rollback_target("tank/data", "s1").unwrap(), "tank/data@s1");
        assert_eq!(rollback_target("tank/data", "tank/data@s1").unwrap(), "tank/data@s1");
    }

    /// Test: a snapshot of another dataset is rejected before any backend call
    #[test]
    fn test_rollback_target_foreign_snapshot() {
        let err = rollback_target("tank/data", "tank/other@s1").unwrap_err();
        assert!(is_invalid_argument(&err));
        assert!(is_invalid_argument(&rollback_target("tank/data", "").unwrap_err()));
    }
}
