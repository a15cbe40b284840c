// zfs_management/pools.rs
// Pool operations: list, get, properties, create, destroy, import, export

use super::driver::{open_pool, ZfsDriver};
use super::helpers::{is_valid_property_name, validate_dataset_name, validate_device_path};
use super::props::{self, PropClass, PROPERTY_BUFFER_SIZE};
use super::types::{
    CreatePoolOptions, ExportOptions, ImportOptions, PoolHealth, PoolInfo, PropertyInfo,
};
use super::vdev::{build_root, build_stripe_root, VdevSpec};
use crate::backend::{Backend, PoolObject, Visit};
use crate::errors::{op, ErrorKind, Result, ZfsError};
use crate::nvlist::NvList;
use std::collections::HashMap;
use tracing::{debug, info};

/// History message recorded by destroy/export when the caller gives none
const HISTORY_MESSAGE: &str = "zfs-driver";

/// Health read through the "health" property; Unknown when unavailable
pub(crate) fn pool_health<P: PoolObject>(pool: &P) -> PoolHealth {
    let Some(def) = props::lookup(PropClass::Pool, "health") else {
        return PoolHealth::Unknown;
    };
    let mut buf = vec![0u8; PROPERTY_BUFFER_SIZE];
    match pool.get_prop(def, &mut buf) {
        Ok(_) => PoolHealth::from_name(&props::buffer_str(&buf)),
        Err(failure) => {
            debug!(pool = %pool.name(), code = failure.code, "health unavailable");
            PoolHealth::Unknown
        }
    }
}

fn pool_info<P: PoolObject>(pool: &P) -> PoolInfo {
    PoolInfo {
        name: pool.name(),
        guid: pool.guid(),
        health: pool_health(pool),
        state: pool.state(),
    }
}

fn pool_property_tree(options: &CreatePoolOptions) -> Result<(Option<NvList>, Option<NvList>)> {
    let mut pool_props = options.properties.clone();
    if let Some(root) = &options.alt_root {
        pool_props.insert("altroot".to_string(), root.clone());
    }
    let props = super::driver::property_tree(op::CREATE_POOL, &pool_props)?;
    let fs_props = super::driver::property_tree(op::CREATE_POOL, &options.fs_properties)?;
    Ok((props, fs_props))
}

impl<B: Backend> ZfsDriver<B> {
    pub fn list_pools(&self) -> Result<Vec<PoolInfo>> {
        self.with_backend(op::LIST_POOLS, |backend| {
            debug!(op = op::LIST_POOLS, "iterating pools");
            let mut pools = Vec::new();
            backend
                .iter_pools(&mut |pool| {
                    pools.push(pool_info(&pool));
                    Visit::Continue
                })
                .map_err(|f| ZfsError::from_backend(op::LIST_POOLS, "", f))?;
            pools.sort_by(|a: &PoolInfo, b: &PoolInfo| a.name.cmp(&b.name));
            Ok(pools)
        })
    }

    pub fn get_pool(&self, name: &str) -> Result<PoolInfo> {
        validate_dataset_name(op::GET_POOL, name)?;
        self.with_backend(op::GET_POOL, |backend| {
            let pool = open_pool(backend, op::GET_POOL, name)?;
            Ok(pool_info(&pool))
        })
    }

    /// Requested pool properties; empty `names` means all of them
    pub fn get_pool_properties(
        &self,
        pool: &str,
        names: &[&str],
    ) -> Result<HashMap<String, PropertyInfo>> {
        validate_dataset_name(op::GET_POOL_PROPS, pool)?;
        self.with_backend(op::GET_POOL_PROPS, |backend| {
            let handle = open_pool(backend, op::GET_POOL_PROPS, pool)?;
            Ok(props::get_properties(PropClass::Pool, pool, names, |def, buf| {
                handle.get_prop(def, buf)
            }))
        })
    }

    pub fn set_pool_property(&self, pool: &str, name: &str, value: &str) -> Result<()> {
        validate_dataset_name(op::SET_POOL_PROP, pool)?;
        if !is_valid_property_name(name) {
            return Err(ZfsError::invalid(op::SET_POOL_PROP, name, "invalid property name"));
        }
        self.with_backend(op::SET_POOL_PROP, |backend| {
            let mut handle = open_pool(backend, op::SET_POOL_PROP, pool)?;
            debug!(op = op::SET_POOL_PROP, pool, property = name, "setting property");
            handle
                .set_prop(name, value)
                .map_err(|f| ZfsError::from_backend(op::SET_POOL_PROP, pool, f))?;
            info!(pool, property = name, value, "pool property set");
            Ok(())
        })
    }

    /// Create a pool striped over `devices`
    pub fn create_pool(
        &self,
        name: &str,
        devices: &[String],
        options: &CreatePoolOptions,
    ) -> Result<()> {
        validate_dataset_name(op::CREATE_POOL, name)?;
        if devices.is_empty() {
            return Err(ZfsError::invalid(op::CREATE_POOL, name, "at least one device is required"));
        }
        for device in devices {
            validate_device_path(op::CREATE_POOL, device)?;
        }
        let nvroot = build_stripe_root(devices)
            .map_err(|e| ZfsError::wrap(op::CREATE_POOL, Some(name), e))?;
        self.create_pool_from_tree(name, &nvroot, options)
    }

    /// Create a pool from a full topology (mirrors, raidz, log, spare, cache)
    pub fn create_pool_with_vdevs(
        &self,
        name: &str,
        vdevs: &[VdevSpec],
        options: &CreatePoolOptions,
    ) -> Result<()> {
        validate_dataset_name(op::CREATE_POOL, name)?;
        let nvroot = build_root(vdevs).map_err(|e| ZfsError::wrap(op::CREATE_POOL, Some(name), e))?;
        self.create_pool_from_tree(name, &nvroot, options)
    }

    fn create_pool_from_tree(
        &self,
        name: &str,
        nvroot: &NvList,
        options: &CreatePoolOptions,
    ) -> Result<()> {
        let (props, fs_props) = pool_property_tree(options)?;
        self.with_backend(op::CREATE_POOL, |backend| {
            debug!(op = op::CREATE_POOL, pool = name, "creating pool");
            backend
                .create_pool(name, nvroot, props.as_ref(), fs_props.as_ref())
                .map_err(|f| ZfsError::from_backend(op::CREATE_POOL, name, f))?;
            info!(pool = name, "pool created");
            Ok(())
        })
    }

    pub fn destroy_pool(&self, name: &str) -> Result<()> {
        validate_dataset_name(op::DESTROY_POOL, name)?;
        self.with_backend(op::DESTROY_POOL, |backend| {
            let pool = open_pool(backend, op::DESTROY_POOL, name)?;
            debug!(op = op::DESTROY_POOL, pool = name, "destroying pool");
            pool.destroy(HISTORY_MESSAGE)
                .map_err(|f| ZfsError::from_backend(op::DESTROY_POOL, name, f))?;
            info!(pool = name, "pool destroyed");
            Ok(())
        })
    }

    /// Import a pool the backend already knows as exported
    pub fn import_pool(&self, name: &str, options: &ImportOptions) -> Result<()> {
        validate_dataset_name(op::IMPORT_POOL, name)?;
        if let Some(new_name) = &options.new_name {
            validate_dataset_name(op::IMPORT_POOL, new_name)?;
            if new_name.contains('/') {
                return Err(ZfsError::invalid(
                    op::IMPORT_POOL,
                    new_name,
                    "pool names cannot contain '/'",
                ));
            }
        }
        self.with_backend(op::IMPORT_POOL, |backend| {
            debug!(op = op::IMPORT_POOL, pool = name, "importing pool");
            backend
                .import_pool(name, options)
                .map_err(|f| ZfsError::from_backend(op::IMPORT_POOL, name, f))?;
            info!(pool = name, new_name = ?options.new_name, "pool imported");
            Ok(())
        })
    }

    pub fn export_pool(&self, name: &str, options: &ExportOptions) -> Result<()> {
        validate_dataset_name(op::EXPORT_POOL, name)?;
        self.with_backend(op::EXPORT_POOL, |backend| {
            let pool = open_pool(backend, op::EXPORT_POOL, name)?;
            let message = options.message.as_deref().unwrap_or(HISTORY_MESSAGE);
            debug!(op = op::EXPORT_POOL, pool = name, force = options.force, "exporting pool");
            pool.export(options.force, message).map_err(|f| {
                let err = ZfsError::from_backend(op::EXPORT_POOL, name, f);
                if err.kind == ErrorKind::Busy && !options.force {
                    ZfsError { detail: format!("{} (retry with force)", err.detail), ..err }
                } else {
                    err
                }
            })?;
            info!(pool = name, "pool exported");
            Ok(())
        })
    }
}
