// zfs_management/datasets.rs
// Dataset operations: list, get, create, destroy, properties

use super::driver::{open_dataset, property_tree, Properties, ZfsDriver};
use super::helpers::{depth, is_valid_property_name, validate_dataset_name, validate_name};
use super::iter::{describe, walk_all, walk_from, Collector};
use super::props::{self, PropClass};
use super::types::{DatasetInfo, DatasetType, PropertyInfo, TypeMask};
use crate::backend::{Backend, DatasetObject};
use crate::errors::{op, Result, ZfsError};
use std::collections::HashMap;
use tracing::{debug, info};

impl<B: Backend> ZfsDriver<B> {
    /// Every dataset reachable from the pool roots, snapshots included when
    /// `recursive`
    pub fn list_datasets(&self, recursive: bool) -> Result<Vec<DatasetInfo>> {
        self.collect_all(recursive, None)
    }

    pub fn list_datasets_by_type(
        &self,
        kind: DatasetType,
        recursive: bool,
    ) -> Result<Vec<DatasetInfo>> {
        self.collect_all(recursive, Some(kind))
    }

    fn collect_all(
        &self,
        recursive: bool,
        filter: Option<DatasetType>,
    ) -> Result<Vec<DatasetInfo>> {
        self.with_backend(op::LIST_DATASETS, |backend| {
            debug!(op = op::LIST_DATASETS, recursive, filter = ?filter, "walking datasets");
            let mut collector = Collector::new();
            walk_all(backend, op::LIST_DATASETS, recursive, &mut collector)?;
            Ok(collector.finish(filter))
        })
    }

    /// The pool's root filesystem, and everything below it when `recursive`
    pub fn list_datasets_in_pool(&self, pool: &str, recursive: bool) -> Result<Vec<DatasetInfo>> {
        validate_dataset_name(op::LIST_DATASETS, pool)?;
        self.with_backend(op::LIST_DATASETS, |backend| {
            let root = open_dataset(backend, op::LIST_DATASETS, pool, TypeMask::FILESYSTEM)?;
            let mut collector = Collector::new();
            walk_from(root, op::LIST_DATASETS, recursive, &mut collector)?;
            Ok(collector.finish(None))
        })
    }

    pub fn get_dataset(&self, name: &str) -> Result<DatasetInfo> {
        validate_name(op::GET_DATASET, name)?;
        self.with_backend(op::GET_DATASET, |backend| {
            let ds = open_dataset(backend, op::GET_DATASET, name, TypeMask::DATASET)?;
            Ok(describe(&ds))
        })
    }

    /// Create a filesystem or volume. Volumes need a `volsize` property; the
    /// backend rejects them without one.
    pub fn create_dataset(&self, name: &str, kind: DatasetType, props: &Properties) -> Result<()> {
        validate_dataset_name(op::CREATE_DATASET, name)?;
        if !matches!(kind, DatasetType::Filesystem | DatasetType::Volume) {
            return Err(ZfsError::invalid(
                op::CREATE_DATASET,
                name,
                format!("cannot create a {} with create_dataset", kind),
            ));
        }
        if !name.contains('/') {
            return Err(ZfsError::invalid(
                op::CREATE_DATASET,
                name,
                "a pool's root filesystem is created with the pool",
            ));
        }
        let tree = property_tree(op::CREATE_DATASET, props)?;
        self.with_backend(op::CREATE_DATASET, |backend| {
            debug!(op = op::CREATE_DATASET, dataset = name, kind = %kind, "creating dataset");
            backend
                .create_dataset(name, kind, tree.as_ref())
                .map_err(|f| ZfsError::from_backend(op::CREATE_DATASET, name, f))?;
            info!(dataset = name, kind = %kind, "dataset created");
            Ok(())
        })
    }

    /// Destroy a filesystem or volume; `recursive` takes children, snapshots
    /// and their descendants with it, deepest first
    pub fn destroy_dataset(&self, name: &str, recursive: bool) -> Result<()> {
        validate_dataset_name(op::DESTROY_DATASET, name)?;
        self.with_backend(op::DESTROY_DATASET, |backend| {
            let mask = TypeMask::FILESYSTEM | TypeMask::VOLUME;
            let root = open_dataset(backend, op::DESTROY_DATASET, name, mask)?;
            if !recursive {
                debug!(op = op::DESTROY_DATASET, dataset = name, "destroying dataset");
                root.destroy(false)
                    .map_err(|f| ZfsError::from_backend(op::DESTROY_DATASET, name, f))?;
                info!(dataset = name, "dataset destroyed");
                return Ok(());
            }

            let mut collector = Collector::new();
            walk_from(root, op::DESTROY_DATASET, true, &mut collector)?;
            let mut doomed = collector.finish(None);
            doomed.sort_by(|a, b| {
                depth(&b.name)
                    .cmp(&depth(&a.name))
                    .then_with(|| a.name.cmp(&b.name))
            });

            for target in &doomed {
                let handle =
                    open_dataset(backend, op::DESTROY_DATASET, &target.name, target.kind.mask())?;
                debug!(op = op::DESTROY_DATASET, dataset = %target.name, "destroying dataset");
                handle
                    .destroy(false)
                    .map_err(|f| ZfsError::from_backend(op::DESTROY_DATASET, &target.name, f))?;
            }
            info!(dataset = name, count = doomed.len(), "dataset tree destroyed");
            Ok(())
        })
    }

    /// Requested dataset properties; empty `names` means all of them.
    ///
    /// Unknown names and values the backend cannot produce are left out.
    pub fn get_dataset_properties(
        &self,
        name: &str,
        names: &[&str],
    ) -> Result<HashMap<String, PropertyInfo>> {
        validate_name(op::GET_DATASET_PROPS, name)?;
        self.with_backend(op::GET_DATASET_PROPS, |backend| {
            let ds = open_dataset(backend, op::GET_DATASET_PROPS, name, TypeMask::DATASET)?;
            Ok(props::get_properties(PropClass::Dataset, name, names, |def, buf| {
                ds.get_prop(def, buf)
            }))
        })
    }

    pub fn set_dataset_property(&self, name: &str, prop: &str, value: &str) -> Result<()> {
        validate_name(op::SET_DATASET_PROP, name)?;
        if !is_valid_property_name(prop) {
            return Err(ZfsError::invalid(op::SET_DATASET_PROP, prop, "invalid property name"));
        }
        self.with_backend(op::SET_DATASET_PROP, |backend| {
            let mut ds = open_dataset(backend, op::SET_DATASET_PROP, name, TypeMask::DATASET)?;
            debug!(op = op::SET_DATASET_PROP, dataset = name, property = prop, "setting property");
            ds.set_prop(prop, value)
                .map_err(|f| ZfsError::from_backend(op::SET_DATASET_PROP, name, f))?;
            info!(dataset = name, property = prop, value, "dataset property set");
            Ok(())
        })
    }
}
