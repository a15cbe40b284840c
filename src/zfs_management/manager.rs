// zfs_management/manager.rs
// ZfsManager: async facade running driver calls on the blocking pool

use super::driver::{Driver, Properties};
use super::types::{
    CloneInfo, CreatePoolOptions, DatasetInfo, DatasetType, ExportOptions, ImportOptions,
    PoolInfo, PropertyInfo, RuntimeInfo, ScrubStatus, VdevOnlineFlags, VdevState,
};
use super::vdev::VdevSpec;
use crate::config::DriverSettings;
use crate::errors::{op, Result, ZfsError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Async interface over a shared [`Driver`].
///
/// Each call runs on tokio's blocking pool. Cancellation and the optional
/// deadline are checked right before the driver is entered: a call already
/// inside the backend always runs to completion.
#[derive(Clone)]
pub struct ZfsManager {
    driver: Arc<dyn Driver>,
    cancel: CancellationToken,
    timeout: Option<Duration>,
}

impl ZfsManager {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        ZfsManager {
            driver,
            cancel: CancellationToken::new(),
            timeout: None,
        }
    }

    /// Open the configured backend and wrap it
    pub fn from_settings(settings: &DriverSettings) -> Result<Self> {
        let driver: Arc<dyn Driver> = Arc::from(super::driver::open_driver(settings)?);
        Ok(ZfsManager::new(driver).with_timeout(settings.call_timeout()))
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Share `token`; cancelling it refuses every call not yet issued
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    /// Run `f` against the driver on the blocking pool
    pub async fn call<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn Driver) -> Result<T> + Send + 'static,
    {
        if self.cancel.is_cancelled() {
            return Err(ZfsError::cancelled(op, "cancelled before issuance"));
        }
        let deadline = self.timeout.map(|t| Instant::now() + t);
        let driver = Arc::clone(&self.driver);
        let cancel = self.cancel.clone();

        let task = tokio::task::spawn_blocking(move || {
            if cancel.is_cancelled() {
                return Err(ZfsError::cancelled(op, "cancelled before issuance"));
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(ZfsError::cancelled(op, "deadline passed before issuance"));
            }
            f(driver.as_ref())
        });
        match task.await {
            Ok(result) => result,
            Err(e) => Err(ZfsError::wrap(op, None, e)),
        }
    }

    pub async fn close(&self) {
        let driver = Arc::clone(&self.driver);
        if let Err(e) = tokio::task::spawn_blocking(move || driver.close()).await {
            tracing::warn!("close task failed: {}", e);
        }
    }

    pub async fn runtime_info(&self) -> Result<RuntimeInfo> {
        self.call(op::RUNTIME_INFO, |d| d.runtime_info()).await
    }

    // =========================================================================
    // Pools
    // =========================================================================

    pub async fn list_pools(&self) -> Result<Vec<PoolInfo>> {
        self.call(op::LIST_POOLS, |d| d.list_pools()).await
    }

    pub async fn get_pool(&self, name: &str) -> Result<PoolInfo> {
        let name = name.to_string();
        self.call(op::GET_POOL, move |d| d.get_pool(&name)).await
    }

    pub async fn get_pool_properties(
        &self,
        pool: &str,
        names: &[&str],
    ) -> Result<HashMap<String, PropertyInfo>> {
        let pool = pool.to_string();
        let names: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        self.call(op::GET_POOL_PROPS, move |d| {
            let names: Vec<&str> = names.iter().map(String::as_str).collect();
            d.get_pool_properties(&pool, &names)
        })
        .await
    }

    pub async fn set_pool_property(&self, pool: &str, name: &str, value: &str) -> Result<()> {
        let (pool, name, value) = (pool.to_string(), name.to_string(), value.to_string());
        self.call(op::SET_POOL_PROP, move |d| d.set_pool_property(&pool, &name, &value))
            .await
    }

    pub async fn create_pool(
        &self,
        name: &str,
        devices: Vec<String>,
        options: CreatePoolOptions,
    ) -> Result<()> {
        let name = name.to_string();
        self.call(op::CREATE_POOL, move |d| d.create_pool(&name, &devices, &options))
            .await
    }

    pub async fn create_pool_with_vdevs(
        &self,
        name: &str,
        vdevs: Vec<VdevSpec>,
        options: CreatePoolOptions,
    ) -> Result<()> {
        let name = name.to_string();
        self.call(op::CREATE_POOL, move |d| d.create_pool_with_vdevs(&name, &vdevs, &options))
            .await
    }

    pub async fn destroy_pool(&self, name: &str) -> Result<()> {
        let name = name.to_string();
        self.call(op::DESTROY_POOL, move |d| d.destroy_pool(&name)).await
    }

    pub async fn import_pool(&self, name: &str, options: ImportOptions) -> Result<()> {
        let name = name.to_string();
        self.call(op::IMPORT_POOL, move |d| d.import_pool(&name, &options)).await
    }

    pub async fn export_pool(&self, name: &str, options: ExportOptions) -> Result<()> {
        let name = name.to_string();
        self.call(op::EXPORT_POOL, move |d| d.export_pool(&name, &options)).await
    }

    // =========================================================================
    // Datasets
    // =========================================================================

    pub async fn list_datasets(&self, recursive: bool) -> Result<Vec<DatasetInfo>> {
        self.call(op::LIST_DATASETS, move |d| d.list_datasets(recursive)).await
    }

    pub async fn list_datasets_by_type(
        &self,
        kind: DatasetType,
        recursive: bool,
    ) -> Result<Vec<DatasetInfo>> {
        self.call(op::LIST_DATASETS, move |d| d.list_datasets_by_type(kind, recursive))
            .await
    }

    pub async fn list_datasets_in_pool(
        &self,
        pool: &str,
        recursive: bool,
    ) -> Result<Vec<DatasetInfo>> {
        let pool = pool.to_string();
        self.call(op::LIST_DATASETS, move |d| d.list_datasets_in_pool(&pool, recursive))
            .await
    }

    pub async fn get_dataset(&self, name: &str) -> Result<DatasetInfo> {
        let name = name.to_string();
        self.call(op::GET_DATASET, move |d| d.get_dataset(&name)).await
    }

    pub async fn create_dataset(
        &self,
        name: &str,
        kind: DatasetType,
        props: Properties,
    ) -> Result<()> {
        let name = name.to_string();
        self.call(op::CREATE_DATASET, move |d| d.create_dataset(&name, kind, &props))
            .await
    }

    pub async fn destroy_dataset(&self, name: &str, recursive: bool) -> Result<()> {
        let name = name.to_string();
        self.call(op::DESTROY_DATASET, move |d| d.destroy_dataset(&name, recursive))
            .await
    }

    pub async fn get_dataset_properties(
        &self,
        name: &str,
        names: &[&str],
    ) -> Result<HashMap<String, PropertyInfo>> {
        let name = name.to_string();
        let names: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        self.call(op::GET_DATASET_PROPS, move |d| {
            let names: Vec<&str> = names.iter().map(String::as_str).collect();
            d.get_dataset_properties(&name, &names)
        })
        .await
    }

    pub async fn set_dataset_property(&self, name: &str, prop: &str, value: &str) -> Result<()> {
        let (name, prop, value) = (name.to_string(), prop.to_string(), value.to_string());
        self.call(op::SET_DATASET_PROP, move |d| d.set_dataset_property(&name, &prop, &value))
            .await
    }

    // =========================================================================
    // Snapshots and clones
    // =========================================================================

    pub async fn list_snapshots(&self, dataset: &str) -> Result<Vec<DatasetInfo>> {
        let dataset = dataset.to_string();
        self.call(op::LIST_SNAPSHOTS, move |d| d.list_snapshots(&dataset)).await
    }

    pub async fn create_snapshot(
        &self,
        name: &str,
        recursive: bool,
        props: Properties,
    ) -> Result<()> {
        let name = name.to_string();
        self.call(op::CREATE_SNAPSHOT, move |d| d.create_snapshot(&name, recursive, &props))
            .await
    }

    pub async fn destroy_snapshot(&self, name: &str) -> Result<()> {
        let name = name.to_string();
        self.call(op::DESTROY_SNAPSHOT, move |d| d.destroy_snapshot(&name)).await
    }

    pub async fn rollback(&self, dataset: &str, snapshot: &str, force: bool) -> Result<()> {
        let (dataset, snapshot) = (dataset.to_string(), snapshot.to_string());
        self.call(op::ROLLBACK, move |d| d.rollback(&dataset, &snapshot, force)).await
    }

    pub async fn create_clone(&self, snapshot: &str, clone: &str, props: Properties) -> Result<()> {
        let (snapshot, clone) = (snapshot.to_string(), clone.to_string());
        self.call(op::CREATE_CLONE, move |d| d.create_clone(&snapshot, &clone, &props))
            .await
    }

    pub async fn promote_clone(&self, clone: &str) -> Result<()> {
        let clone = clone.to_string();
        self.call(op::PROMOTE_CLONE, move |d| d.promote_clone(&clone)).await
    }

    pub async fn get_clone_info(&self, name: &str) -> Result<CloneInfo> {
        let name = name.to_string();
        self.call(op::GET_CLONE_INFO, move |d| d.get_clone_info(&name)).await
    }

    pub async fn list_clones(&self, snapshot: &str) -> Result<Vec<String>> {
        let snapshot = snapshot.to_string();
        self.call(op::LIST_CLONES, move |d| d.list_clones(&snapshot)).await
    }

    pub async fn destroy_clone(&self, clone: &str, force: bool) -> Result<()> {
        let clone = clone.to_string();
        self.call(op::DESTROY_CLONE, move |d| d.destroy_clone(&clone, force)).await
    }

    // =========================================================================
    // Vdevs and scrub
    // =========================================================================

    pub async fn add_vdev(&self, pool: &str, spec: VdevSpec) -> Result<()> {
        let pool = pool.to_string();
        self.call(op::ADD_VDEV, move |d| d.add_vdev(&pool, &spec)).await
    }

    pub async fn attach_vdev(&self, pool: &str, device: &str, new_device: &str) -> Result<()> {
        let (pool, device, new_device) =
            (pool.to_string(), device.to_string(), new_device.to_string());
        self.call(op::ATTACH_VDEV, move |d| d.attach_vdev(&pool, &device, &new_device))
            .await
    }

    pub async fn detach_vdev(&self, pool: &str, device: &str) -> Result<()> {
        let (pool, device) = (pool.to_string(), device.to_string());
        self.call(op::DETACH_VDEV, move |d| d.detach_vdev(&pool, &device)).await
    }

    pub async fn replace_vdev(&self, pool: &str, old_device: &str, new_device: &str) -> Result<()> {
        let (pool, old, new) = (pool.to_string(), old_device.to_string(), new_device.to_string());
        self.call(op::REPLACE_VDEV, move |d| d.replace_vdev(&pool, &old, &new)).await
    }

    pub async fn remove_vdev(&self, pool: &str, device: &str) -> Result<()> {
        let (pool, device) = (pool.to_string(), device.to_string());
        self.call(op::REMOVE_VDEV, move |d| d.remove_vdev(&pool, &device)).await
    }

    pub async fn online_vdev(
        &self,
        pool: &str,
        device: &str,
        flags: VdevOnlineFlags,
    ) -> Result<VdevState> {
        let (pool, device) = (pool.to_string(), device.to_string());
        self.call(op::ONLINE_VDEV, move |d| d.online_vdev(&pool, &device, flags)).await
    }

    pub async fn offline_vdev(&self, pool: &str, device: &str, temporary: bool) -> Result<()> {
        let (pool, device) = (pool.to_string(), device.to_string());
        self.call(op::OFFLINE_VDEV, move |d| d.offline_vdev(&pool, &device, temporary))
            .await
    }

    pub async fn clear_vdev(&self, pool: &str, device: Option<&str>) -> Result<()> {
        let pool = pool.to_string();
        let device = device.map(str::to_string);
        self.call(op::CLEAR_VDEV, move |d| d.clear_vdev(&pool, device.as_deref()))
            .await
    }

    pub async fn start_scrub(&self, pool: &str) -> Result<()> {
        let pool = pool.to_string();
        self.call(op::START_SCRUB, move |d| d.start_scrub(&pool)).await
    }

    pub async fn pause_scrub(&self, pool: &str) -> Result<()> {
        let pool = pool.to_string();
        self.call(op::PAUSE_SCRUB, move |d| d.pause_scrub(&pool)).await
    }

    pub async fn stop_scrub(&self, pool: &str) -> Result<()> {
        let pool = pool.to_string();
        self.call(op::STOP_SCRUB, move |d| d.stop_scrub(&pool)).await
    }

    pub async fn scrub_status(&self, pool: &str) -> Result<ScrubStatus> {
        let pool = pool.to_string();
        self.call(op::SCRUB_STATUS, move |d| d.scrub_status(&pool)).await
    }

    // =========================================================================
    // Capabilities
    // =========================================================================

    pub async fn supports_feature(&self, name: &str) -> Result<bool> {
        let name = name.to_string();
        self.call(op::SUPPORTS_FEATURE, move |d| d.supports_feature(&name)).await
    }

    pub async fn list_available_features(&self) -> Result<Vec<String>> {
        self.call(op::LIST_FEATURES, |d| d.list_available_features()).await
    }

    pub async fn list_supported_compression(&self) -> Result<Vec<String>> {
        self.call(op::LIST_COMPRESSION, |d| d.list_supported_compression()).await
    }

    pub async fn backend_version(&self) -> Result<String> {
        self.call(op::BACKEND_VERSION, |d| d.backend_version()).await
    }
}
