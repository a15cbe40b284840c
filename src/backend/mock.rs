// backend/mock.rs
// In-memory backend for tests and hosts without ZFS

use super::{fill_buffer, Backend, BackendResult, DatasetObject, PoolObject, Visit};
use crate::errors::BackendFailure;
use crate::nvlist::{NvList, NvValue};
use crate::zfs_management::helpers::{is_within, pool_of, split_snapshot};
use crate::zfs_management::props::PropDef;
use crate::zfs_management::types::{
    DatasetType, ImportOptions, PoolState, PropSource, ScrubCommand, TypeMask, VdevOnlineFlags,
    VdevState,
};
use crate::zfs_management::vdev::{
    leaf_paths, ZPOOL_CONFIG_CHILDREN, ZPOOL_CONFIG_L2CACHE, ZPOOL_CONFIG_SPARES,
    ZPOOL_CONFIG_TYPE, VDEV_TYPE_ROOT,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Dataset properties the backend computes and never lets callers set
const READONLY_DATASET_PROPS: &[&str] = &[
    "type",
    "creation",
    "used",
    "available",
    "referenced",
    "compressratio",
    "mounted",
    "origin",
    "createtxg",
    "name",
    "guid",
    "numclones",
    "clones",
    "written",
    "logicalused",
    "logicalreferenced",
    "usedbysnapshots",
    "usedbydataset",
    "usedbychildren",
    "usedbyrefreservation",
    "refcompressratio",
    "userrefs",
    "defer_destroy",
];

/// Dataset properties that are not inherited from the parent
const LOCAL_ONLY_DATASET_PROPS: &[&str] = &[
    "quota",
    "reservation",
    "refquota",
    "refreservation",
    "volsize",
    "volblocksize",
];

const READONLY_POOL_PROPS: &[&str] = &[
    "name",
    "size",
    "capacity",
    "health",
    "guid",
    "free",
    "allocated",
    "expandsize",
    "freeing",
    "fragmentation",
    "leaked",
    "checkpoint",
];

type Props = BTreeMap<String, (String, PropSource)>;

#[derive(Debug, Clone)]
struct MockPool {
    guid: u64,
    state: PoolState,
    health: String,
    props: Props,
    vdevs: NvList,
    devices: BTreeMap<String, VdevState>,
    busy: bool,
    scan_stats: Option<Vec<u64>>,
}

#[derive(Debug, Clone)]
struct MockDataset {
    kind: DatasetType,
    guid: u64,
    txg: u64,
    origin: Option<String>,
    props: Props,
}

#[derive(Debug, Default)]
struct MockState {
    pools: BTreeMap<String, MockPool>,
    datasets: BTreeMap<String, MockDataset>,
    next_guid: u64,
    txg: u64,
    version: String,
    open_handles: usize,
    releases: usize,
    failures: HashMap<String, i32>,
    calls: Vec<String>,
}

type Shared = Arc<Mutex<MockState>>;

fn lock(shared: &Shared) -> MutexGuard<'_, MockState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

fn enoent(what: &str) -> BackendFailure {
    BackendFailure::new(libc::ENOENT, format!("{}: no such pool or dataset", what))
}

fn root_tree() -> NvList {
    let mut root = NvList::new();
    // keys are fresh, these cannot collide
    let _ = root.add_string(ZPOOL_CONFIG_TYPE, VDEV_TYPE_ROOT);
    let _ = root.add_list_array(ZPOOL_CONFIG_CHILDREN, Vec::new());
    root
}

fn props_from(nvl: Option<&NvList>) -> Props {
    let mut props = Props::new();
    if let Some(nvl) = nvl {
        for (key, value) in nvl.iter() {
            let text = match value {
                NvValue::String(s) => s.clone(),
                NvValue::Uint64(v) => v.to_string(),
                NvValue::Boolean(b) => if *b { "on" } else { "off" }.to_string(),
                _ => continue,
            };
            props.insert(key.to_string(), (text, PropSource::Local));
        }
    }
    props
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl MockState {
    /// Record the call and consume an injected failure for it, if any
    fn check(&mut self, op: &str) -> BackendResult<()> {
        self.calls.push(op.to_string());
        match self.failures.remove(op) {
            Some(code) => Err(BackendFailure::errno(code)),
            None => Ok(()),
        }
    }

    fn guid(&mut self) -> u64 {
        self.next_guid += 1;
        self.next_guid
    }

    fn txg(&mut self) -> u64 {
        self.txg += 1;
        self.txg
    }

    fn pool_live(&self, name: &str) -> bool {
        self.pools
            .get(pool_of(name))
            .is_some_and(|p| p.state == PoolState::Active)
    }

    fn pool(&mut self, name: &str) -> BackendResult<&mut MockPool> {
        self.pools
            .get_mut(name)
            .filter(|p| p.state == PoolState::Active)
            .ok_or_else(|| enoent(name))
    }

    fn dataset(&self, name: &str) -> BackendResult<&MockDataset> {
        if !self.pool_live(name) {
            return Err(enoent(name));
        }
        self.datasets.get(name).ok_or_else(|| enoent(name))
    }

    fn insert_dataset(
        &mut self,
        name: &str,
        kind: DatasetType,
        props: Props,
        origin: Option<String>,
    ) -> u64 {
        let guid = self.guid();
        let txg = self.txg();
        self.datasets.insert(
            name.to_string(),
            MockDataset {
                kind,
                guid,
                txg,
                origin,
                props,
            },
        );
        guid
    }

    fn clones_of(&self, snapshot: &str) -> Vec<String> {
        self.datasets
            .iter()
            .filter(|(_, ds)| ds.origin.as_deref() == Some(snapshot))
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn snapshots_of(&self, dataset: &str) -> Vec<(String, u64)> {
        let prefix = format!("{}@", dataset);
        self.datasets
            .iter()
            .filter(|(name, _)| name.starts_with(&prefix))
            .map(|(name, ds)| (name.clone(), ds.txg))
            .collect()
    }

    /// Local value, else the nearest ancestor's value as inherited
    fn resolve_prop(&self, name: &str, prop: &str) -> Option<(String, PropSource)> {
        let ds = self.datasets.get(name)?;
        if let Some(found) = ds.props.get(prop) {
            return Some(found.clone());
        }
        if LOCAL_ONLY_DATASET_PROPS.contains(&prop) || READONLY_DATASET_PROPS.contains(&prop) {
            return None;
        }
        let mut current = match split_snapshot(name) {
            Some((parent, _)) => parent,
            None => name,
        };
        if current != name {
            if let Some((value, _)) = self.datasets.get(current).and_then(|d| d.props.get(prop)) {
                return Some((value.clone(), PropSource::Inherited));
            }
        }
        while let Some((parent, _)) = current.rsplit_once('/') {
            if let Some((value, _)) = self.datasets.get(parent).and_then(|d| d.props.get(prop)) {
                return Some((value.clone(), PropSource::Inherited));
            }
            current = parent;
        }
        None
    }

    fn rename_tree(&mut self, from: &str, to: &str) {
        let moved: Vec<String> = self
            .datasets
            .keys()
            .filter(|name| is_within(name, from))
            .cloned()
            .collect();
        for old in moved {
            if let Some(ds) = self.datasets.remove(&old) {
                let new = format!("{}{}", to, &old[from.len()..]);
                self.datasets.insert(new, ds);
            }
        }
    }
}

// ============================================================================
// Backend
// ============================================================================

/// In-memory stand-in for a ZFS host.
///
/// Mirrors the native primitives closely enough to exercise the driver:
/// `iter_children` also reports snapshots, errors come back as errno codes,
/// and every handle is counted while open. Use [`MockBackend::probe`] to seed
/// state, inject failures and inspect what happened after the backend has been
/// moved into a driver.
pub struct MockBackend {
    shared: Shared,
}

/// Shared view of a [`MockBackend`]'s state
#[derive(Clone)]
pub struct MockProbe {
    shared: Shared,
}

impl Default for MockBackend {
    fn default() -> Self {
        MockBackend::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        let state = MockState {
            next_guid: 1000,
            version: "zfs-2.2.0-mock".to_string(),
            ..MockState::default()
        };
        MockBackend {
            shared: Arc::new(Mutex::new(state)),
        }
    }

    pub fn probe(&self) -> MockProbe {
        MockProbe {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Add an ONLINE, ACTIVE pool with its root filesystem
    pub fn with_pool(self, name: &str, guid: u64) -> Self {
        self.probe().add_pool(name, guid, "ONLINE", PoolState::Active);
        self
    }

    pub fn add_dataset(&self, name: &str, kind: DatasetType) -> u64 {
        self.probe().add_dataset(name, kind)
    }

    pub fn set_prop(&self, dataset: &str, prop: &str, value: &str) {
        self.probe().set_prop(dataset, prop, value)
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        lock(&self.shared).releases += 1;
        debug!("Mock: backend released");
    }
}

impl MockProbe {
    pub fn add_pool(&self, name: &str, guid: u64, health: &str, state: PoolState) {
        let mut st = lock(&self.shared);
        st.pools.insert(
            name.to_string(),
            MockPool {
                guid,
                state,
                health: health.to_string(),
                props: Props::new(),
                vdevs: root_tree(),
                devices: BTreeMap::new(),
                busy: false,
                scan_stats: None,
            },
        );
        st.insert_dataset(name, DatasetType::Filesystem, Props::new(), None);
    }

    /// Add a top-level disk to a pool's vdev tree
    pub fn add_device(&self, pool: &str, path: &str) {
        let mut st = lock(&self.shared);
        if let Some(p) = st.pools.get_mut(pool) {
            let mut leaf = NvList::new();
            let _ = leaf.add_string(ZPOOL_CONFIG_TYPE, "disk");
            let _ = leaf.add_string("path", path);
            if let Some(children) = p.vdevs.lookup_list_array_mut(ZPOOL_CONFIG_CHILDREN) {
                children.push(leaf);
            }
            p.devices.insert(path.to_string(), VdevState::Healthy);
        }
    }

    pub fn add_dataset(&self, name: &str, kind: DatasetType) -> u64 {
        lock(&self.shared).insert_dataset(name, kind, Props::new(), None)
    }

    /// Seed a property; computed statistics report a default source
    pub fn set_prop(&self, dataset: &str, prop: &str, value: &str) {
        let source = if READONLY_DATASET_PROPS.contains(&prop) {
            PropSource::Default
        } else {
            PropSource::Local
        };
        let mut st = lock(&self.shared);
        if let Some(ds) = st.datasets.get_mut(dataset) {
            ds.props.insert(prop.to_string(), (value.to_string(), source));
        }
    }

    pub fn set_pool_prop(&self, pool: &str, prop: &str, value: &str) {
        let mut st = lock(&self.shared);
        if let Some(p) = st.pools.get_mut(pool) {
            p.props.insert(prop.to_string(), (value.to_string(), PropSource::Local));
        }
    }

    pub fn set_health(&self, pool: &str, health: &str) {
        if let Some(p) = lock(&self.shared).pools.get_mut(pool) {
            p.health = health.to_string();
        }
    }

    /// Busy pools refuse export without force, and destroy
    pub fn set_busy(&self, pool: &str, busy: bool) {
        if let Some(p) = lock(&self.shared).pools.get_mut(pool) {
            p.busy = busy;
        }
    }

    pub fn set_version(&self, version: &str) {
        lock(&self.shared).version = version.to_string();
    }

    /// Make the next call of `op` fail with `code`
    pub fn fail_next(&self, op: &str, code: i32) {
        lock(&self.shared).failures.insert(op.to_string(), code);
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.shared).calls.clone()
    }

    pub fn releases(&self) -> usize {
        lock(&self.shared).releases
    }

    pub fn open_handles(&self) -> usize {
        lock(&self.shared).open_handles
    }

    pub fn has_dataset(&self, name: &str) -> bool {
        lock(&self.shared).datasets.contains_key(name)
    }

    pub fn has_pool(&self, name: &str) -> bool {
        lock(&self.shared).pools.contains_key(name)
    }

    pub fn pool_state(&self, name: &str) -> Option<PoolState> {
        lock(&self.shared).pools.get(name).map(|p| p.state)
    }

    pub fn origin(&self, name: &str) -> Option<String> {
        lock(&self.shared).datasets.get(name).and_then(|d| d.origin.clone())
    }

    pub fn local_prop(&self, name: &str, prop: &str) -> Option<String> {
        let st = lock(&self.shared);
        let ds = st.datasets.get(name)?;
        ds.props.get(prop).map(|(v, _)| v.clone())
    }

    pub fn pool_prop(&self, pool: &str, prop: &str) -> Option<String> {
        let st = lock(&self.shared);
        st.pools.get(pool)?.props.get(prop).map(|(v, _)| v.clone())
    }

    pub fn vdev_tree(&self, pool: &str) -> Option<NvList> {
        lock(&self.shared).pools.get(pool).map(|p| p.vdevs.clone())
    }

    pub fn devices(&self, pool: &str) -> Vec<(String, VdevState)> {
        lock(&self.shared)
            .pools
            .get(pool)
            .map(|p| p.devices.iter().map(|(k, v)| (k.clone(), *v)).collect())
            .unwrap_or_default()
    }
}

impl Backend for MockBackend {
    type Pool = MockPoolHandle;
    type Dataset = MockDatasetHandle;

    fn implementation(&self) -> &'static str {
        "mock"
    }

    fn version(&self) -> BackendResult<String> {
        let mut st = lock(&self.shared);
        st.check("version")?;
        Ok(st.version.clone())
    }

    fn open_pool(&mut self, name: &str) -> BackendResult<MockPoolHandle> {
        {
            let mut st = lock(&self.shared);
            st.check("open_pool")?;
            st.pool(name)?;
        }
        Ok(MockPoolHandle::open(&self.shared, name))
    }

    fn open_dataset(&mut self, name: &str, mask: TypeMask) -> BackendResult<MockDatasetHandle> {
        {
            let mut st = lock(&self.shared);
            st.check("open_dataset")?;
            let ds = st.dataset(name)?;
            if !mask.contains(ds.kind) {
                return Err(enoent(name));
            }
        }
        Ok(MockDatasetHandle::open(&self.shared, name))
    }

    fn iter_pools(
        &mut self,
        visit: &mut dyn FnMut(MockPoolHandle) -> Visit,
    ) -> BackendResult<Visit> {
        let names: Vec<String> = {
            let mut st = lock(&self.shared);
            st.check("iter_pools")?;
            st.pools
                .iter()
                .filter(|(_, p)| p.state == PoolState::Active)
                .map(|(name, _)| name.clone())
                .collect()
        };
        for name in names {
            if visit(MockPoolHandle::open(&self.shared, &name)) == Visit::Abort {
                return Ok(Visit::Abort);
            }
        }
        Ok(Visit::Continue)
    }

    fn iter_root_datasets(
        &mut self,
        visit: &mut dyn FnMut(MockDatasetHandle) -> Visit,
    ) -> BackendResult<Visit> {
        let names: Vec<String> = {
            let mut st = lock(&self.shared);
            st.check("iter_root_datasets")?;
            st.datasets
                .keys()
                .filter(|name| !name.contains(['/', '@']) && st.pool_live(name))
                .cloned()
                .collect()
        };
        visit_all(&self.shared, names, visit)
    }

    fn create_pool(
        &mut self,
        name: &str,
        nvroot: &NvList,
        props: Option<&NvList>,
        fs_props: Option<&NvList>,
    ) -> BackendResult<()> {
        let mut st = lock(&self.shared);
        st.check("create_pool")?;
        if st.pools.contains_key(name) {
            return Err(BackendFailure::new(
                libc::EEXIST,
                format!("pool '{}' already exists", name),
            ));
        }
        let is_root = nvroot.lookup_string(ZPOOL_CONFIG_TYPE).ok() == Some(VDEV_TYPE_ROOT);
        let has_children = nvroot
            .lookup_list_array(ZPOOL_CONFIG_CHILDREN)
            .is_ok_and(|c| !c.is_empty());
        if !is_root || !has_children {
            return Err(BackendFailure::new(libc::EINVAL, "invalid vdev specification"));
        }

        let guid = st.guid();
        let devices = leaf_paths(nvroot)
            .into_iter()
            .map(|p| (p, VdevState::Healthy))
            .collect();
        st.pools.insert(
            name.to_string(),
            MockPool {
                guid,
                state: PoolState::Active,
                health: "ONLINE".to_string(),
                props: props_from(props),
                vdevs: nvroot.clone(),
                devices,
                busy: false,
                scan_stats: None,
            },
        );
        st.insert_dataset(name, DatasetType::Filesystem, props_from(fs_props), None);
        debug!("Mock: created pool {}", name);
        Ok(())
    }

    fn import_pool(&mut self, name: &str, options: &ImportOptions) -> BackendResult<()> {
        let mut st = lock(&self.shared);
        st.check("import_pool")?;
        let importable = st.pools.get(name).is_some_and(|p| {
            p.state == PoolState::Exported || (options.destroyed && p.state == PoolState::Destroyed)
        });
        if !importable {
            return Err(BackendFailure::new(
                libc::ENOENT,
                format!("no importable pool named '{}'", name),
            ));
        }

        let target = options.new_name.clone().unwrap_or_else(|| name.to_string());
        if target != name {
            if st.pools.contains_key(&target) {
                return Err(BackendFailure::new(
                    libc::EEXIST,
                    format!("pool '{}' already exists", target),
                ));
            }
            if let Some(pool) = st.pools.remove(name) {
                st.pools.insert(target.clone(), pool);
            }
            st.rename_tree(name, &target);
        }
        if let Some(pool) = st.pools.get_mut(&target) {
            pool.state = PoolState::Active;
            if let Some(root) = &options.alt_root {
                pool.props
                    .insert("altroot".to_string(), (root.clone(), PropSource::Local));
            }
        }
        debug!("Mock: imported pool {} as {}", name, target);
        Ok(())
    }

    fn create_dataset(
        &mut self,
        name: &str,
        kind: DatasetType,
        props: Option<&NvList>,
    ) -> BackendResult<()> {
        let mut st = lock(&self.shared);
        st.check("create_dataset")?;
        if !matches!(kind, DatasetType::Filesystem | DatasetType::Volume) {
            return Err(BackendFailure::new(
                libc::EINVAL,
                "only filesystems and volumes can be created",
            ));
        }
        if st.datasets.contains_key(name) {
            return Err(BackendFailure::new(
                libc::EEXIST,
                format!("dataset '{}' already exists", name),
            ));
        }
        let parent = name.rsplit_once('/').map(|(p, _)| p).ok_or_else(|| enoent(name))?;
        if st.dataset(parent)?.kind != DatasetType::Filesystem {
            return Err(BackendFailure::new(libc::EINVAL, "parent is not a filesystem"));
        }
        if kind == DatasetType::Volume && !props.is_some_and(|p| p.contains_key("volsize")) {
            return Err(BackendFailure::new(libc::EINVAL, "volume size must be specified"));
        }
        st.insert_dataset(name, kind, props_from(props), None);
        debug!("Mock: created {} {}", kind, name);
        Ok(())
    }

    fn snapshot(
        &mut self,
        name: &str,
        recursive: bool,
        props: Option<&NvList>,
    ) -> BackendResult<()> {
        let mut st = lock(&self.shared);
        st.check("snapshot")?;
        let (dataset, snap) = split_snapshot(name)
            .ok_or_else(|| BackendFailure::new(libc::EINVAL, "missing '@' in snapshot name"))?;
        if st.dataset(dataset)?.kind == DatasetType::Snapshot {
            return Err(BackendFailure::new(libc::EINVAL, "cannot snapshot a snapshot"));
        }

        let mut targets = vec![dataset.to_string()];
        if recursive {
            targets.extend(
                st.datasets
                    .iter()
                    .filter(|(n, d)| {
                        d.kind != DatasetType::Snapshot
                            && n.as_str() != dataset
                            && is_within(n, dataset)
                    })
                    .map(|(n, _)| n.clone()),
            );
        }
        let names: Vec<String> = targets.iter().map(|t| format!("{}@{}", t, snap)).collect();
        if let Some(existing) = names.iter().find(|n| st.datasets.contains_key(n.as_str())) {
            return Err(BackendFailure::new(
                libc::EEXIST,
                format!("snapshot '{}' already exists", existing),
            ));
        }
        for snap_name in &names {
            st.insert_dataset(snap_name, DatasetType::Snapshot, props_from(props), None);
        }
        debug!("Mock: created {} snapshot(s) named @{}", names.len(), snap);
        Ok(())
    }
}

fn visit_all(
    shared: &Shared,
    names: Vec<String>,
    visit: &mut dyn FnMut(MockDatasetHandle) -> Visit,
) -> BackendResult<Visit> {
    for name in names {
        if visit(MockDatasetHandle::open(shared, &name)) == Visit::Abort {
            return Ok(Visit::Abort);
        }
    }
    Ok(Visit::Continue)
}

// ============================================================================
// Pool handle
// ============================================================================

pub struct MockPoolHandle {
    shared: Shared,
    name: String,
}

impl MockPoolHandle {
    fn open(shared: &Shared, name: &str) -> Self {
        lock(shared).open_handles += 1;
        MockPoolHandle {
            shared: Arc::clone(shared),
            name: name.to_string(),
        }
    }

    fn with_pool<T>(
        &self,
        op: &str,
        f: impl FnOnce(&mut MockPool) -> BackendResult<T>,
    ) -> BackendResult<T> {
        let mut st = lock(&self.shared);
        st.check(op)?;
        f(st.pool(&self.name)?)
    }
}

impl Drop for MockPoolHandle {
    fn drop(&mut self) {
        let mut st = lock(&self.shared);
        st.open_handles = st.open_handles.saturating_sub(1);
    }
}

fn device_missing(device: &str) -> BackendFailure {
    BackendFailure::new(libc::ENOENT, format!("no such device in pool: {}", device))
}

impl PoolObject for MockPoolHandle {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn guid(&self) -> u64 {
        lock(&self.shared).pools.get(&self.name).map_or(0, |p| p.guid)
    }

    fn state(&self) -> PoolState {
        lock(&self.shared)
            .pools
            .get(&self.name)
            .map_or(PoolState::Unknown, |p| p.state)
    }

    fn get_prop(&self, prop: &PropDef, buf: &mut [u8]) -> BackendResult<PropSource> {
        let name = self.name.clone();
        self.with_pool("pool_get_prop", |pool| {
            let (value, source) = match prop.name {
                "name" => (name, PropSource::Default),
                "guid" => (pool.guid.to_string(), PropSource::Default),
                "health" => (pool.health.clone(), PropSource::Default),
                other => pool.props.get(other).cloned().ok_or_else(|| {
                    BackendFailure::new(libc::ENOENT, format!("property '{}' has no value", other))
                })?,
            };
            fill_buffer(buf, &value)?;
            Ok(source)
        })
    }

    fn set_prop(&mut self, name: &str, value: &str) -> BackendResult<()> {
        self.with_pool("pool_set_prop", |pool| {
            if READONLY_POOL_PROPS.contains(&name) {
                return Err(BackendFailure::new(libc::EINVAL, format!("'{}' is readonly", name)));
            }
            pool.props
                .insert(name.to_string(), (value.to_string(), PropSource::Local));
            Ok(())
        })
    }

    fn config(&self) -> BackendResult<NvList> {
        let name = self.name.clone();
        self.with_pool("pool_config", |pool| {
            let mut vdev_tree = pool.vdevs.clone();
            if let Some(stats) = &pool.scan_stats {
                vdev_tree.add_uint64_array("scan_stats", stats.clone()).map_err(|e| {
                    BackendFailure::new(libc::EINVAL, e.to_string())
                })?;
            }
            let mut config = NvList::new();
            let built = config
                .add_string("name", name)
                .and_then(|_| config.add_uint64("pool_guid", pool.guid))
                .and_then(|_| config.add_list("vdev_tree", vdev_tree));
            built.map_err(|e| BackendFailure::new(libc::EINVAL, e.to_string()))?;
            Ok(config)
        })
    }

    fn destroy(self, _message: &str) -> BackendResult<()> {
        let mut st = lock(&self.shared);
        st.check("destroy_pool")?;
        if st.pool(&self.name)?.busy {
            return Err(BackendFailure::new(libc::EBUSY, "pool is busy"));
        }
        st.pools.remove(&self.name);
        let pool = self.name.clone();
        st.datasets.retain(|name, _| !is_within(name, &pool));
        debug!("Mock: destroyed pool {}", pool);
        Ok(())
    }

    fn export(self, force: bool, _message: &str) -> BackendResult<()> {
        let mut st = lock(&self.shared);
        st.check("export_pool")?;
        let pool = st.pool(&self.name)?;
        if pool.busy && !force {
            return Err(BackendFailure::new(libc::EBUSY, "pool is busy"));
        }
        pool.state = PoolState::Exported;
        debug!("Mock: exported pool {}", self.name);
        Ok(())
    }

    fn add_vdevs(&mut self, nvroot: &NvList) -> BackendResult<()> {
        self.with_pool("pool_add", |pool| {
            let invalid =
                |e: crate::errors::ZfsError| BackendFailure::new(libc::EINVAL, e.to_string());
            for key in [ZPOOL_CONFIG_CHILDREN, ZPOOL_CONFIG_SPARES, ZPOOL_CONFIG_L2CACHE] {
                let Ok(added) = nvroot.lookup_list_array(key) else {
                    continue;
                };
                match pool.vdevs.lookup_list_array_mut(key) {
                    Some(existing) => existing.extend(added.iter().cloned()),
                    None => pool.vdevs.add_list_array(key, added.to_vec()).map_err(invalid)?,
                }
            }
            for path in leaf_paths(nvroot) {
                pool.devices.insert(path, VdevState::Healthy);
            }
            Ok(())
        })
    }

    fn attach(&mut self, old: &str, nvroot: &NvList, replacing: bool) -> BackendResult<()> {
        self.with_pool("pool_attach", |pool| {
            if !pool.devices.contains_key(old) {
                return Err(device_missing(old));
            }
            let new_paths = leaf_paths(nvroot);
            if new_paths.is_empty() {
                return Err(BackendFailure::new(libc::EINVAL, "no new device given"));
            }
            if let Some(in_use) = new_paths.iter().find(|p| pool.devices.contains_key(p.as_str())) {
                return Err(BackendFailure::new(
                    libc::EBUSY,
                    format!("{} is part of the pool", in_use),
                ));
            }
            for path in new_paths {
                pool.devices.insert(path, VdevState::Healthy);
            }
            if replacing {
                pool.devices.remove(old);
            }
            Ok(())
        })
    }

    fn detach(&mut self, device: &str) -> BackendResult<()> {
        self.with_pool("pool_detach", |pool| {
            pool.devices.remove(device).map(|_| ()).ok_or_else(|| device_missing(device))
        })
    }

    fn remove(&mut self, device: &str) -> BackendResult<()> {
        self.with_pool("pool_remove", |pool| {
            pool.devices.remove(device).map(|_| ()).ok_or_else(|| device_missing(device))
        })
    }

    fn online(&mut self, device: &str, flags: VdevOnlineFlags) -> BackendResult<VdevState> {
        self.with_pool("pool_online", |pool| {
            let state = pool.devices.get_mut(device).ok_or_else(|| device_missing(device))?;
            *state = if flags.contains(VdevOnlineFlags::FORCE_FAULT) {
                VdevState::Faulted
            } else {
                VdevState::Healthy
            };
            Ok(*state)
        })
    }

    fn offline(&mut self, device: &str, _temporary: bool) -> BackendResult<()> {
        self.with_pool("pool_offline", |pool| {
            let state = pool.devices.get_mut(device).ok_or_else(|| device_missing(device))?;
            *state = VdevState::Offline;
            Ok(())
        })
    }

    fn clear(&mut self, device: Option<&str>) -> BackendResult<()> {
        self.with_pool("pool_clear", |pool| {
            match device {
                Some(device) => {
                    let state = pool.devices.get_mut(device).ok_or_else(|| device_missing(device))?;
                    if *state == VdevState::Faulted {
                        *state = VdevState::Healthy;
                    }
                }
                None => {
                    for state in pool.devices.values_mut() {
                        if *state == VdevState::Faulted {
                            *state = VdevState::Healthy;
                        }
                    }
                }
            }
            Ok(())
        })
    }

    fn scan(&mut self, command: ScrubCommand) -> BackendResult<()> {
        self.with_pool("pool_scan", |pool| {
            let scanning = pool.scan_stats.as_ref().is_some_and(|s| s.get(1) == Some(&1));
            match command {
                ScrubCommand::Start => {
                    // func, state, start, end, to_examine, examined, skipped, processed, errors
                    pool.scan_stats = Some(vec![1, 1, now(), 0, 1 << 30, 0, 0, 0, 0]);
                }
                ScrubCommand::Pause | ScrubCommand::Stop if !scanning => {
                    return Err(BackendFailure::new(libc::ENOENT, "there is no active scrub"));
                }
                ScrubCommand::Pause => {}
                ScrubCommand::Stop => {
                    if let Some(stats) = pool.scan_stats.as_mut() {
                        stats[1] = 3;
                        stats[3] = now();
                    }
                }
            }
            Ok(())
        })
    }
}

// ============================================================================
// Dataset handle
// ============================================================================

pub struct MockDatasetHandle {
    shared: Shared,
    name: String,
}

impl MockDatasetHandle {
    fn open(shared: &Shared, name: &str) -> Self {
        lock(shared).open_handles += 1;
        MockDatasetHandle {
            shared: Arc::clone(shared),
            name: name.to_string(),
        }
    }
}

impl Drop for MockDatasetHandle {
    fn drop(&mut self) {
        let mut st = lock(&self.shared);
        st.open_handles = st.open_handles.saturating_sub(1);
    }
}

impl DatasetObject for MockDatasetHandle {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn guid(&self) -> u64 {
        lock(&self.shared).datasets.get(&self.name).map_or(0, |d| d.guid)
    }

    fn kind(&self) -> DatasetType {
        lock(&self.shared)
            .datasets
            .get(&self.name)
            .map_or(DatasetType::Filesystem, |d| d.kind)
    }

    fn get_prop(&self, prop: &PropDef, buf: &mut [u8]) -> BackendResult<PropSource> {
        let mut st = lock(&self.shared);
        st.check("dataset_get_prop")?;
        let ds = st.dataset(&self.name)?;
        let computed = match prop.name {
            "name" => Some(self.name.clone()),
            "type" => Some(ds.kind.as_str().to_string()),
            "guid" => Some(ds.guid.to_string()),
            "createtxg" => Some(ds.txg.to_string()),
            "origin" => match &ds.origin {
                Some(origin) => Some(origin.clone()),
                None => return Err(BackendFailure::new(libc::ENOENT, "not a clone")),
            },
            "clones" if ds.kind == DatasetType::Snapshot => {
                Some(st.clones_of(&self.name).join(","))
            }
            "numclones" if ds.kind == DatasetType::Snapshot => {
                Some(st.clones_of(&self.name).len().to_string())
            }
            _ => None,
        };
        let (value, source) = match computed {
            Some(value) => (value, PropSource::Default),
            None => st.resolve_prop(&self.name, prop.name).ok_or_else(|| {
                BackendFailure::new(libc::ENOENT, format!("property '{}' has no value", prop.name))
            })?,
        };
        fill_buffer(buf, &value)?;
        Ok(source)
    }

    fn set_prop(&mut self, name: &str, value: &str) -> BackendResult<()> {
        let mut st = lock(&self.shared);
        st.check("dataset_set_prop")?;
        st.dataset(&self.name)?;
        if READONLY_DATASET_PROPS.contains(&name) {
            return Err(BackendFailure::new(libc::EINVAL, format!("'{}' is readonly", name)));
        }
        if let Some(ds) = st.datasets.get_mut(&self.name) {
            ds.props
                .insert(name.to_string(), (value.to_string(), PropSource::Local));
        }
        Ok(())
    }

    fn iter_children(&self, visit: &mut dyn FnMut(Self) -> Visit) -> BackendResult<Visit> {
        let names: Vec<String> = {
            let mut st = lock(&self.shared);
            st.check("iter_children")?;
            st.dataset(&self.name)?;
            let child_prefix = format!("{}/", self.name);
            let snap_prefix = format!("{}@", self.name);
            st.datasets
                .keys()
                .filter(|name| {
                    name.strip_prefix(&child_prefix)
                        .is_some_and(|rest| !rest.contains(['/', '@']))
                        || name.starts_with(&snap_prefix)
                })
                .cloned()
                .collect()
        };
        visit_all(&self.shared, names, visit)
    }

    fn iter_snapshots(&self, visit: &mut dyn FnMut(Self) -> Visit) -> BackendResult<Visit> {
        let names: Vec<String> = {
            let mut st = lock(&self.shared);
            st.check("iter_snapshots")?;
            st.dataset(&self.name)?;
            let mut snaps = st.snapshots_of(&self.name);
            snaps.sort_by_key(|(_, txg)| *txg);
            snaps.into_iter().map(|(name, _)| name).collect()
        };
        visit_all(&self.shared, names, visit)
    }

    fn destroy(self, _defer: bool) -> BackendResult<()> {
        let mut st = lock(&self.shared);
        st.check("destroy_dataset")?;
        st.dataset(&self.name)?;
        let has_dependents = st
            .datasets
            .keys()
            .any(|name| name != &self.name && is_within(name, &self.name));
        if has_dependents {
            return Err(BackendFailure::new(libc::EBUSY, "dataset has children or snapshots"));
        }
        if !st.clones_of(&self.name).is_empty() {
            return Err(BackendFailure::new(libc::EBUSY, "snapshot has dependent clones"));
        }
        st.datasets.remove(&self.name);
        debug!("Mock: destroyed {}", self.name);
        Ok(())
    }

    fn clone_to(&self, target: &str, props: Option<&NvList>) -> BackendResult<()> {
        let mut st = lock(&self.shared);
        st.check("clone")?;
        if st.dataset(&self.name)?.kind != DatasetType::Snapshot {
            return Err(BackendFailure::new(libc::EINVAL, "clone source must be a snapshot"));
        }
        if st.datasets.contains_key(target) {
            return Err(BackendFailure::new(
                libc::EEXIST,
                format!("dataset '{}' already exists", target),
            ));
        }
        let parent = target.rsplit_once('/').map(|(p, _)| p).ok_or_else(|| enoent(target))?;
        st.dataset(parent)?;
        let source = split_snapshot(&self.name).map_or("", |(ds, _)| ds);
        let kind = st.datasets.get(source).map_or(DatasetType::Filesystem, |d| d.kind);
        st.insert_dataset(target, kind, props_from(props), Some(self.name.clone()));
        debug!("Mock: cloned {} to {}", self.name, target);
        Ok(())
    }

    fn promote(&mut self) -> BackendResult<()> {
        let mut st = lock(&self.shared);
        st.check("promote")?;
        let origin = st
            .dataset(&self.name)?
            .origin
            .clone()
            .ok_or_else(|| BackendFailure::new(libc::EINVAL, "not a cloned filesystem"))?;
        let (source, _) = split_snapshot(&origin)
            .ok_or_else(|| BackendFailure::new(libc::EINVAL, "malformed origin"))?;
        let source = source.to_string();
        let origin_txg = st.datasets.get(&origin).map_or(0, |d| d.txg);

        // snapshots up to and including the origin move to the promoted clone
        let moved: Vec<String> = st
            .snapshots_of(&source)
            .into_iter()
            .filter(|(_, txg)| *txg <= origin_txg)
            .map(|(name, _)| name)
            .collect();
        for old in moved {
            let snap = split_snapshot(&old).map_or("", |(_, s)| s).to_string();
            let new = format!("{}@{}", self.name, snap);
            if let Some(ds) = st.datasets.remove(&old) {
                st.datasets.insert(new.clone(), ds);
            }
            for ds in st.datasets.values_mut() {
                if ds.origin.as_deref() == Some(old.as_str()) {
                    ds.origin = Some(new.clone());
                }
            }
        }
        if let Some(ds) = st.datasets.get_mut(&self.name) {
            ds.origin = None;
        }
        debug!("Mock: promoted {}", self.name);
        Ok(())
    }

    fn rollback(&mut self, snapshot: &Self, force: bool) -> BackendResult<()> {
        let mut st = lock(&self.shared);
        st.check("rollback")?;
        st.dataset(&self.name)?;
        let target_txg = st.dataset(&snapshot.name)?.txg;
        if split_snapshot(&snapshot.name).map(|(ds, _)| ds) != Some(self.name.as_str()) {
            return Err(BackendFailure::new(libc::EINVAL, "snapshot does not belong to dataset"));
        }
        let later: Vec<String> = st
            .snapshots_of(&self.name)
            .into_iter()
            .filter(|(_, txg)| *txg > target_txg)
            .map(|(name, _)| name)
            .collect();
        if !later.is_empty() && !force {
            return Err(BackendFailure::new(
                libc::EEXIST,
                format!("more recent snapshots exist: {}", later.join(", ")),
            ));
        }
        if later.iter().any(|s| !st.clones_of(s).is_empty()) {
            return Err(BackendFailure::new(libc::EBUSY, "a more recent snapshot has clones"));
        }
        for name in &later {
            st.datasets.remove(name);
        }
        debug!("Mock: rolled back {} to {}", self.name, snapshot.name);
        Ok(())
    }

    fn clones(&self) -> BackendResult<Option<NvList>> {
        let mut st = lock(&self.shared);
        st.check("clones")?;
        if st.dataset(&self.name)?.kind != DatasetType::Snapshot {
            return Ok(None);
        }
        let mut nvl = NvList::new();
        for clone in st.clones_of(&self.name) {
            nvl.add_boolean(&clone, true)
                .map_err(|e| BackendFailure::new(libc::EINVAL, e.to_string()))?;
        }
        Ok(Some(nvl))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test: handles are counted while open and released on drop
    #[test]
    fn test_handle_accounting() {
        let mut backend = MockBackend::new().with_pool("tank", 42);
        let probe = backend.probe();
        {
            let _pool = backend.open_pool("tank").unwrap();
            let _ds = backend.open_dataset("tank", TypeMask::DATASET).unwrap();
            assert_eq!(probe.open_handles(), 2);
        }
        assert_eq!(probe.open_handles(), 0);
    }

    /// Test: injected failures fire once
    #[test]
    fn test_fail_next_is_consumed() {
        let mut backend = MockBackend::new().with_pool("tank", 42);
        backend.probe().fail_next("open_pool", libc::EIO);
        assert_eq!(backend.open_pool("tank").err().map(|f| f.code), Some(libc::EIO));
        assert!(backend.open_pool("tank").is_ok());
    }

    /// Test: inherited values report the inherited source
    #[test]
    fn test_inherited_property() {
        let backend = MockBackend::new().with_pool("tank", 42);
        backend.add_dataset("tank/data", DatasetType::Filesystem);
        backend.set_prop("tank", "compression", "lz4");

        let st = lock(&backend.shared);
        assert_eq!(
            st.resolve_prop("tank/data", "compression"),
            Some(("lz4".to_string(), PropSource::Inherited))
        );
        assert_eq!(st.resolve_prop("tank/data", "quota"), None);
    }

    /// Test: exported pools disappear from lookups
    #[test]
    fn test_exported_pool_is_invisible() {
        let mut backend = MockBackend::new().with_pool("tank", 42);
        let pool = backend.open_pool("tank").unwrap();
        pool.export(false, "test").unwrap();
        assert!(backend.open_pool("tank").is_err());
        assert!(backend.open_dataset("tank", TypeMask::DATASET).is_err());
    }
}
