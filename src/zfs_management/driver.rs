// zfs_management/driver.rs
// Driver contract and the session-backed implementation shared by all backends

use super::helpers::is_valid_property_name;
use super::session::Session;
use super::types::{
    CloneInfo, CreatePoolOptions, DatasetInfo, DatasetType, ExportOptions, ImportOptions,
    PoolInfo, PropertyInfo, RuntimeInfo, ScrubStatus, TypeMask, VdevOnlineFlags, VdevState,
};
use super::vdev::VdevSpec;
use crate::backend::{Backend, BackendKind};
use crate::config::DriverSettings;
use crate::errors::{op, Result, ZfsError};
use crate::nvlist::NvList;
use std::collections::HashMap;

/// String properties passed on create/clone/snapshot
pub type Properties = HashMap<String, String>;

/// Operation contract, independent of the backend behind it.
///
/// Every call is synchronous. Implementations serialize backend access, so a
/// `Driver` can be shared between threads; after [`Driver::close`] every call
/// fails with a Closed error.
pub trait Driver: Send + Sync {
    /// Release the backend connection; repeated calls are no-ops
    fn close(&self);
    fn is_closed(&self) -> bool;
    fn runtime_info(&self) -> Result<RuntimeInfo>;

    // pools
    fn list_pools(&self) -> Result<Vec<PoolInfo>>;
    fn get_pool(&self, name: &str) -> Result<PoolInfo>;
    fn get_pool_properties(
        &self,
        pool: &str,
        names: &[&str],
    ) -> Result<HashMap<String, PropertyInfo>>;
    fn set_pool_property(&self, pool: &str, name: &str, value: &str) -> Result<()>;
    fn create_pool(
        &self,
        name: &str,
        devices: &[String],
        options: &CreatePoolOptions,
    ) -> Result<()>;
    fn create_pool_with_vdevs(
        &self,
        name: &str,
        vdevs: &[VdevSpec],
        options: &CreatePoolOptions,
    ) -> Result<()>;
    fn destroy_pool(&self, name: &str) -> Result<()>;
    fn import_pool(&self, name: &str, options: &ImportOptions) -> Result<()>;
    fn export_pool(&self, name: &str, options: &ExportOptions) -> Result<()>;

    // datasets
    fn list_datasets(&self, recursive: bool) -> Result<Vec<DatasetInfo>>;
    fn list_datasets_by_type(&self, kind: DatasetType, recursive: bool) -> Result<Vec<DatasetInfo>>;
    fn list_datasets_in_pool(&self, pool: &str, recursive: bool) -> Result<Vec<DatasetInfo>>;
    fn get_dataset(&self, name: &str) -> Result<DatasetInfo>;
    fn create_dataset(&self, name: &str, kind: DatasetType, props: &Properties) -> Result<()>;
    fn destroy_dataset(&self, name: &str, recursive: bool) -> Result<()>;
    fn get_dataset_properties(
        &self,
        name: &str,
        names: &[&str],
    ) -> Result<HashMap<String, PropertyInfo>>;
    fn set_dataset_property(&self, name: &str, prop: &str, value: &str) -> Result<()>;

    // snapshots
    fn list_snapshots(&self, dataset: &str) -> Result<Vec<DatasetInfo>>;
    fn create_snapshot(&self, name: &str, recursive: bool, props: &Properties) -> Result<()>;
    fn destroy_snapshot(&self, name: &str) -> Result<()>;
    fn rollback(&self, dataset: &str, snapshot: &str, force: bool) -> Result<()>;

    // clones
    fn create_clone(&self, snapshot: &str, clone: &str, props: &Properties) -> Result<()>;
    fn promote_clone(&self, clone: &str) -> Result<()>;
    fn get_clone_info(&self, name: &str) -> Result<CloneInfo>;
    fn list_clones(&self, snapshot: &str) -> Result<Vec<String>>;
    fn destroy_clone(&self, clone: &str, force: bool) -> Result<()>;

    // vdevs
    fn add_vdev(&self, pool: &str, spec: &VdevSpec) -> Result<()>;
    fn attach_vdev(&self, pool: &str, device: &str, new_device: &str) -> Result<()>;
    fn detach_vdev(&self, pool: &str, device: &str) -> Result<()>;
    fn replace_vdev(&self, pool: &str, old_device: &str, new_device: &str) -> Result<()>;
    fn remove_vdev(&self, pool: &str, device: &str) -> Result<()>;
    fn online_vdev(&self, pool: &str, device: &str, flags: VdevOnlineFlags) -> Result<VdevState>;
    fn offline_vdev(&self, pool: &str, device: &str, temporary: bool) -> Result<()>;
    fn clear_vdev(&self, pool: &str, device: Option<&str>) -> Result<()>;

    // scrub
    fn start_scrub(&self, pool: &str) -> Result<()>;
    fn pause_scrub(&self, pool: &str) -> Result<()>;
    fn stop_scrub(&self, pool: &str) -> Result<()>;
    fn scrub_status(&self, pool: &str) -> Result<ScrubStatus>;

    // capabilities
    fn supports_feature(&self, name: &str) -> Result<bool>;
    fn list_available_features(&self) -> Result<Vec<String>>;
    fn list_supported_compression(&self) -> Result<Vec<String>>;
    fn backend_version(&self) -> Result<String>;
}

// ============================================================================
// Session-backed driver
// ============================================================================

/// Driver over any [`Backend`]; operations live in the sibling modules
pub struct ZfsDriver<B: Backend> {
    session: Session<B>,
}

impl<B: Backend> ZfsDriver<B> {
    pub fn new(backend: B) -> Self {
        ZfsDriver {
            session: Session::new(backend),
        }
    }

    /// Run `f` against the live backend
    pub(crate) fn with_backend<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&mut B) -> Result<T>,
    {
        self.session.with_session(op, f)
    }

    pub fn close(&self) {
        self.session.close();
    }

    pub fn is_closed(&self) -> bool {
        !self.session.is_live()
    }

    pub fn runtime_info(&self) -> Result<RuntimeInfo> {
        self.with_backend(op::RUNTIME_INFO, |backend| {
            let zfs_version = backend
                .version()
                .map_err(|f| {
                    ZfsError::from_backend(op::RUNTIME_INFO, backend.implementation(), f)
                })?;
            Ok(RuntimeInfo {
                implementation: backend.implementation().to_string(),
                zfs_version,
                os: std::env::consts::OS.to_string(),
                arch: std::env::consts::ARCH.to_string(),
                crate_version: env!("CARGO_PKG_VERSION").to_string(),
            })
        })
    }
}

// ============================================================================
// Scoped handle acquisition
// ============================================================================

pub(crate) fn open_pool<B: Backend>(
    backend: &mut B,
    op: &'static str,
    name: &str,
) -> Result<B::Pool> {
    tracing::debug!(op, pool = name, "opening pool handle");
    backend
        .open_pool(name)
        .map_err(|f| ZfsError::from_backend(op, name, f))
}

pub(crate) fn open_dataset<B: Backend>(
    backend: &mut B,
    op: &'static str,
    name: &str,
    mask: TypeMask,
) -> Result<B::Dataset> {
    tracing::debug!(op, dataset = name, "opening dataset handle");
    backend
        .open_dataset(name, mask)
        .map_err(|f| ZfsError::from_backend(op, name, f))
}

/// Property tree for a create call; None when there is nothing to pass
pub(crate) fn property_tree(op: &'static str, props: &Properties) -> Result<Option<NvList>> {
    if props.is_empty() {
        return Ok(None);
    }
    if let Some(bad) = props.keys().find(|k| !is_valid_property_name(k)) {
        return Err(ZfsError::invalid(op, bad, "invalid property name"));
    }
    let mut sorted: Vec<(&String, &String)> = props.iter().collect();
    sorted.sort();
    NvList::from_strings(sorted).map(Some)
}

// ============================================================================
// Contract implementation
// ============================================================================

impl<B: Backend> Driver for ZfsDriver<B> {
    fn close(&self) {
        ZfsDriver::close(self)
    }
    fn is_closed(&self) -> bool {
        ZfsDriver::is_closed(self)
    }
    fn runtime_info(&self) -> Result<RuntimeInfo> {
        ZfsDriver::runtime_info(self)
    }

    fn list_pools(&self) -> Result<Vec<PoolInfo>> {
        ZfsDriver::list_pools(self)
    }
    fn get_pool(&self, name: &str) -> Result<PoolInfo> {
        ZfsDriver::get_pool(self, name)
    }
    fn get_pool_properties(
        &self,
        pool: &str,
        names: &[&str],
    ) -> Result<HashMap<String, PropertyInfo>> {
        ZfsDriver::get_pool_properties(self, pool, names)
    }
    fn set_pool_property(&self, pool: &str, name: &str, value: &str) -> Result<()> {
        ZfsDriver::set_pool_property(self, pool, name, value)
    }
    fn create_pool(
        &self,
        name: &str,
        devices: &[String],
        options: &CreatePoolOptions,
    ) -> Result<()> {
        ZfsDriver::create_pool(self, name, devices, options)
    }
    fn create_pool_with_vdevs(
        &self,
        name: &str,
        vdevs: &[VdevSpec],
        options: &CreatePoolOptions,
    ) -> Result<()> {
        ZfsDriver::create_pool_with_vdevs(self, name, vdevs, options)
    }
    fn destroy_pool(&self, name: &str) -> Result<()> {
        ZfsDriver::destroy_pool(self, name)
    }
    fn import_pool(&self, name: &str, options: &ImportOptions) -> Result<()> {
        ZfsDriver::import_pool(self, name, options)
    }
    fn export_pool(&self, name: &str, options: &ExportOptions) -> Result<()> {
        ZfsDriver::export_pool(self, name, options)
    }

    fn list_datasets(&self, recursive: bool) -> Result<Vec<DatasetInfo>> {
        ZfsDriver::list_datasets(self, recursive)
    }
    fn list_datasets_by_type(
        &self,
        kind: DatasetType,
        recursive: bool,
    ) -> Result<Vec<DatasetInfo>> {
        ZfsDriver::list_datasets_by_type(self, kind, recursive)
    }
    fn list_datasets_in_pool(&self, pool: &str, recursive: bool) -> Result<Vec<DatasetInfo>> {
        ZfsDriver::list_datasets_in_pool(self, pool, recursive)
    }
    fn get_dataset(&self, name: &str) -> Result<DatasetInfo> {
        ZfsDriver::get_dataset(self, name)
    }
    fn create_dataset(&self, name: &str, kind: DatasetType, props: &Properties) -> Result<()> {
        ZfsDriver::create_dataset(self, name, kind, props)
    }
    fn destroy_dataset(&self, name: &str, recursive: bool) -> Result<()> {
        ZfsDriver::destroy_dataset(self, name, recursive)
    }
    fn get_dataset_properties(
        &self,
        name: &str,
        names: &[&str],
    ) -> Result<HashMap<String, PropertyInfo>> {
        ZfsDriver::get_dataset_properties(self, name, names)
    }
    fn set_dataset_property(&self, name: &str, prop: &str, value: &str) -> Result<()> {
        ZfsDriver::set_dataset_property(self, name, prop, value)
    }

    fn list_snapshots(&self, dataset: &str) -> Result<Vec<DatasetInfo>> {
        ZfsDriver::list_snapshots(self, dataset)
    }
    fn create_snapshot(&self, name: &str, recursive: bool, props: &Properties) -> Result<()> {
        ZfsDriver::create_snapshot(self, name, recursive, props)
    }
    fn destroy_snapshot(&self, name: &str) -> Result<()> {
        ZfsDriver::destroy_snapshot(self, name)
    }
    fn rollback(&self, dataset: &str, snapshot: &str, force: bool) -> Result<()> {
        ZfsDriver::rollback(self, dataset, snapshot, force)
    }

    fn create_clone(&self, snapshot: &str, clone: &str, props: &Properties) -> Result<()> {
        ZfsDriver::create_clone(self, snapshot, clone, props)
    }
    fn promote_clone(&self, clone: &str) -> Result<()> {
        ZfsDriver::promote_clone(self, clone)
    }
    fn get_clone_info(&self, name: &str) -> Result<CloneInfo> {
        ZfsDriver::get_clone_info(self, name)
    }
    fn list_clones(&self, snapshot: &str) -> Result<Vec<String>> {
        ZfsDriver::list_clones(self, snapshot)
    }
    fn destroy_clone(&self, clone: &str, force: bool) -> Result<()> {
        ZfsDriver::destroy_clone(self, clone, force)
    }

    fn add_vdev(&self, pool: &str, spec: &VdevSpec) -> Result<()> {
        ZfsDriver::add_vdev(self, pool, spec)
    }
    fn attach_vdev(&self, pool: &str, device: &str, new_device: &str) -> Result<()> {
        ZfsDriver::attach_vdev(self, pool, device, new_device)
    }
    fn detach_vdev(&self, pool: &str, device: &str) -> Result<()> {
        ZfsDriver::detach_vdev(self, pool, device)
    }
    fn replace_vdev(&self, pool: &str, old_device: &str, new_device: &str) -> Result<()> {
        ZfsDriver::replace_vdev(self, pool, old_device, new_device)
    }
    fn remove_vdev(&self, pool: &str, device: &str) -> Result<()> {
        ZfsDriver::remove_vdev(self, pool, device)
    }
    fn online_vdev(&self, pool: &str, device: &str, flags: VdevOnlineFlags) -> Result<VdevState> {
        ZfsDriver::online_vdev(self, pool, device, flags)
    }
    fn offline_vdev(&self, pool: &str, device: &str, temporary: bool) -> Result<()> {
        ZfsDriver::offline_vdev(self, pool, device, temporary)
    }
    fn clear_vdev(&self, pool: &str, device: Option<&str>) -> Result<()> {
        ZfsDriver::clear_vdev(self, pool, device)
    }

    fn start_scrub(&self, pool: &str) -> Result<()> {
        ZfsDriver::start_scrub(self, pool)
    }
    fn pause_scrub(&self, pool: &str) -> Result<()> {
        ZfsDriver::pause_scrub(self, pool)
    }
    fn stop_scrub(&self, pool: &str) -> Result<()> {
        ZfsDriver::stop_scrub(self, pool)
    }
    fn scrub_status(&self, pool: &str) -> Result<ScrubStatus> {
        ZfsDriver::scrub_status(self, pool)
    }

    fn supports_feature(&self, name: &str) -> Result<bool> {
        ZfsDriver::supports_feature(self, name)
    }
    fn list_available_features(&self) -> Result<Vec<String>> {
        ZfsDriver::list_available_features(self)
    }
    fn list_supported_compression(&self) -> Result<Vec<String>> {
        ZfsDriver::list_supported_compression(self)
    }
    fn backend_version(&self) -> Result<String> {
        ZfsDriver::backend_version(self)
    }
}

// ============================================================================
// Construction from settings
// ============================================================================

/// Open the configured backend and wrap it in a driver.
///
/// Failure to acquire the backend connection fails construction; no partially
/// initialized driver is returned.
pub fn open_driver(settings: &DriverSettings) -> Result<Box<dyn Driver>> {
    tracing::debug!(backend = ?settings.backend, "opening driver");
    let driver: Box<dyn Driver> = match settings.backend {
        BackendKind::Mock => Box::new(ZfsDriver::new(crate::backend::mock::MockBackend::new())),
        BackendKind::Ioctl => {
            let backend = crate::backend::ioctl::IoctlBackend::open()
                .map_err(|f| ZfsError::from_backend(op::OPEN_SESSION, "ioctl", f))?;
            Box::new(ZfsDriver::new(backend))
        }
        BackendKind::Libzfs => open_libzfs()?,
    };
    Ok(driver)
}

#[cfg(feature = "libzfs")]
fn open_libzfs() -> Result<Box<dyn Driver>> {
    let backend = crate::backend::libzfs::LibzfsBackend::new()
        .map_err(|f| ZfsError::from_backend(op::OPEN_SESSION, "libzfs", f))?;
    Ok(Box::new(ZfsDriver::new(backend)))
}

#[cfg(not(feature = "libzfs"))]
fn open_libzfs() -> Result<Box<dyn Driver>> {
    Err(ZfsError::not_supported(
        op::OPEN_SESSION,
        "built without the `libzfs` feature",
    )
    .with_resource("libzfs"))
}
