// zfs_management/vdev.rs
// Vdev tree builder plus add, attach, detach, replace, remove, online, offline, clear

use super::driver::{open_pool, ZfsDriver};
use super::helpers::{validate_dataset_name, validate_device_path};
use super::types::{VdevOnlineFlags, VdevState};
use crate::backend::{Backend, BackendResult, PoolObject};
use crate::errors::{op, ErrorKind, Result, ZfsError};
use crate::nvlist::NvList;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// Reference: /usr/include/libzfs/sys/fs/zfs.h
pub const ZPOOL_CONFIG_TYPE: &str = "type";
pub const ZPOOL_CONFIG_PATH: &str = "path";
pub const ZPOOL_CONFIG_CHILDREN: &str = "children";
pub const ZPOOL_CONFIG_NPARITY: &str = "nparity";
pub const ZPOOL_CONFIG_IS_LOG: &str = "is_log";
pub const ZPOOL_CONFIG_SPARES: &str = "spares";
pub const ZPOOL_CONFIG_L2CACHE: &str = "l2cache";

pub const VDEV_TYPE_ROOT: &str = "root";
pub const VDEV_TYPE_DISK: &str = "disk";
pub const VDEV_TYPE_MIRROR: &str = "mirror";
pub const VDEV_TYPE_RAIDZ: &str = "raidz";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VdevType {
    Disk,
    Mirror,
    RaidZ1,
    RaidZ2,
    RaidZ3,
    /// Plain stripe: every device becomes its own top-level vdev
    Stripe,
    Log,
    Spare,
    Cache,
}

impl VdevType {
    /// Minimum device count; disk takes exactly one
    pub fn min_devices(self) -> usize {
        match self {
            VdevType::Disk => 1,
            VdevType::Mirror => 2,
            VdevType::RaidZ1 => 3,
            VdevType::RaidZ2 => 4,
            VdevType::RaidZ3 => 5,
            VdevType::Stripe | VdevType::Log | VdevType::Spare | VdevType::Cache => 1,
        }
    }

    fn nparity(self) -> Option<u64> {
        match self {
            VdevType::RaidZ1 => Some(1),
            VdevType::RaidZ2 => Some(2),
            VdevType::RaidZ3 => Some(3),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VdevType::Disk => "disk",
            VdevType::Mirror => "mirror",
            VdevType::RaidZ1 => "raidz1",
            VdevType::RaidZ2 => "raidz2",
            VdevType::RaidZ3 => "raidz3",
            VdevType::Stripe => "stripe",
            VdevType::Log => "log",
            VdevType::Spare => "spare",
            VdevType::Cache => "cache",
        }
    }
}

impl fmt::Display for VdevType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VdevType {
    type Err = ZfsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "disk" => Ok(VdevType::Disk),
            "mirror" => Ok(VdevType::Mirror),
            "raidz" | "raidz1" => Ok(VdevType::RaidZ1),
            "raidz2" => Ok(VdevType::RaidZ2),
            "raidz3" => Ok(VdevType::RaidZ3),
            "stripe" | "root" => Ok(VdevType::Stripe),
            "log" => Ok(VdevType::Log),
            "spare" => Ok(VdevType::Spare),
            "cache" => Ok(VdevType::Cache),
            other => Err(ZfsError::invalid(op::BUILD_VDEV, other, "unknown vdev type")),
        }
    }
}

/// Requested vdev: a type and its devices, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VdevSpec {
    pub vdev_type: VdevType,
    pub devices: Vec<String>,
}

impl VdevSpec {
    pub fn new<I, S>(vdev_type: VdevType, devices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        VdevSpec {
            vdev_type,
            devices: devices.into_iter().map(Into::into).collect(),
        }
    }

    pub fn disk(path: impl Into<String>) -> Self {
        VdevSpec::new(VdevType::Disk, [path.into()])
    }

    pub fn mirror<I, S>(devices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        VdevSpec::new(VdevType::Mirror, devices)
    }
}

// ============================================================================
// Builders
// ============================================================================

fn check_count(spec: &VdevSpec) -> Result<()> {
    let count = spec.devices.len();
    let min = spec.vdev_type.min_devices();
    let ok = match spec.vdev_type {
        VdevType::Disk => count == 1,
        _ => count >= min,
    };
    if ok {
        return Ok(());
    }
    let detail = match spec.vdev_type {
        VdevType::Disk => format!("vdev type 'disk' requires exactly 1 device, got {}", count),
        other => format!(
            "vdev type '{}' requires at least {} devices, got {}",
            other, min, count
        ),
    };
    Err(ZfsError::new(op::BUILD_VDEV, ErrorKind::InvalidArgument, detail)
        .with_resource(spec.vdev_type.as_str())
        .with_errno(libc::EINVAL))
}

/// Leaf `{type: disk, path}` for one device
pub fn build_disk(path: &str) -> Result<NvList> {
    validate_device_path(op::BUILD_VDEV, path)?;
    let mut nvl = NvList::new();
    nvl.add_string(ZPOOL_CONFIG_TYPE, VDEV_TYPE_DISK)?;
    nvl.add_string(ZPOOL_CONFIG_PATH, path)?;
    Ok(nvl)
}

fn build_leaves(devices: &[String]) -> Result<Vec<NvList>> {
    devices.iter().map(|d| build_disk(d)).collect()
}

fn build_parent(vdev_type: &str, nparity: Option<u64>, children: Vec<NvList>) -> Result<NvList> {
    let mut nvl = NvList::new();
    nvl.add_string(ZPOOL_CONFIG_TYPE, vdev_type)?;
    if let Some(parity) = nparity {
        nvl.add_uint64(ZPOOL_CONFIG_NPARITY, parity)?;
    }
    nvl.add_list_array(ZPOOL_CONFIG_CHILDREN, children)?;
    Ok(nvl)
}

/// Build the nvlist for one vdev.
///
/// Disk yields a leaf. Mirror and raidz yield a parent whose `children` holds
/// one leaf per device. Stripe yields a `root` parent. Log, spare and cache
/// with a single device yield a leaf, otherwise a mirror.
pub fn build(spec: &VdevSpec) -> Result<NvList> {
    check_count(spec)?;
    match spec.vdev_type {
        VdevType::Disk => build_disk(&spec.devices[0]),
        VdevType::Mirror => build_parent(VDEV_TYPE_MIRROR, None, build_leaves(&spec.devices)?),
        VdevType::RaidZ1 | VdevType::RaidZ2 | VdevType::RaidZ3 => build_parent(
            VDEV_TYPE_RAIDZ,
            spec.vdev_type.nparity(),
            build_leaves(&spec.devices)?,
        ),
        VdevType::Stripe => build_parent(VDEV_TYPE_ROOT, None, build_leaves(&spec.devices)?),
        VdevType::Log | VdevType::Spare | VdevType::Cache => {
            if spec.devices.len() == 1 {
                build_disk(&spec.devices[0])
            } else {
                build_parent(VDEV_TYPE_MIRROR, None, build_leaves(&spec.devices)?)
            }
        }
    }
}

/// Wrap vdev specs into the root tree handed to pool create and add.
///
/// Data vdevs and logs land in `children` (logs flagged `is_log`); stripes
/// contribute one top-level disk per device. Spares and cache devices go to
/// `spares` and `l2cache` as plain leaves.
pub fn build_root(specs: &[VdevSpec]) -> Result<NvList> {
    if specs.is_empty() {
        return Err(ZfsError::invalid(
            op::BUILD_VDEV,
            VDEV_TYPE_ROOT,
            "at least one vdev is required",
        ));
    }

    let mut children = Vec::new();
    let mut spares = Vec::new();
    let mut l2cache = Vec::new();

    for spec in specs {
        match spec.vdev_type {
            VdevType::Stripe => {
                check_count(spec)?;
                children.extend(build_leaves(&spec.devices)?);
            }
            VdevType::Spare => {
                check_count(spec)?;
                spares.extend(build_leaves(&spec.devices)?);
            }
            VdevType::Cache => {
                check_count(spec)?;
                l2cache.extend(build_leaves(&spec.devices)?);
            }
            VdevType::Log => {
                let mut log = build(spec)?;
                log.add_uint64(ZPOOL_CONFIG_IS_LOG, 1)?;
                children.push(log);
            }
            _ => children.push(build(spec)?),
        }
    }

    let mut root = NvList::new();
    root.add_string(ZPOOL_CONFIG_TYPE, VDEV_TYPE_ROOT)?;
    root.add_list_array(ZPOOL_CONFIG_CHILDREN, children)?;
    if !spares.is_empty() {
        root.add_list_array(ZPOOL_CONFIG_SPARES, spares)?;
    }
    if !l2cache.is_empty() {
        root.add_list_array(ZPOOL_CONFIG_L2CACHE, l2cache)?;
    }
    Ok(root)
}

/// Root tree for a flat device list: each device is a top-level disk
pub fn build_stripe_root(devices: &[String]) -> Result<NvList> {
    if devices.is_empty() {
        return Err(ZfsError::invalid(
            op::BUILD_VDEV,
            VDEV_TYPE_ROOT,
            "at least one device is required",
        ));
    }
    build_root(&[VdevSpec::new(VdevType::Stripe, devices.iter().cloned())])
}

/// Every leaf device path in a vdev tree, depth-first
pub fn leaf_paths(tree: &NvList) -> Vec<String> {
    let mut paths = Vec::new();
    collect_paths(tree, &mut paths);
    paths
}

fn collect_paths(tree: &NvList, out: &mut Vec<String>) {
    if let Ok(path) = tree.lookup_string(ZPOOL_CONFIG_PATH) {
        out.push(path.to_string());
    }
    for key in [ZPOOL_CONFIG_CHILDREN, ZPOOL_CONFIG_SPARES, ZPOOL_CONFIG_L2CACHE] {
        if let Ok(children) = tree.lookup_list_array(key) {
            for child in children {
                collect_paths(child, out);
            }
        }
    }
}

// ============================================================================
// Vdev operations
// ============================================================================

/// Devices already in a pool may be named by path or by vdev guid
fn check_member(op: &'static str, device: &str) -> Result<()> {
    if device.is_empty() || device.contains('\0') {
        return Err(ZfsError::invalid(op, device, "device name must be non-empty and plain"));
    }
    Ok(())
}

impl<B: Backend> ZfsDriver<B> {
    /// Add a top-level vdev (or log, spare, cache devices) to a pool
    pub fn add_vdev(&self, pool: &str, spec: &VdevSpec) -> Result<()> {
        validate_dataset_name(op::ADD_VDEV, pool)?;
        let nvroot = build_root(std::slice::from_ref(spec))
            .map_err(|e| ZfsError::wrap(op::ADD_VDEV, Some(pool), e))?;
        self.with_backend(op::ADD_VDEV, |backend| {
            let mut handle = open_pool(backend, op::ADD_VDEV, pool)?;
            debug!(op = op::ADD_VDEV, pool, vdev_type = %spec.vdev_type, "adding vdev");
            handle
                .add_vdevs(&nvroot)
                .map_err(|f| ZfsError::from_backend(op::ADD_VDEV, pool, f))?;
            info!(pool, vdev_type = %spec.vdev_type, devices = spec.devices.len(), "vdev added");
            Ok(())
        })
    }

    fn attach_device(
        &self,
        op: &'static str,
        pool: &str,
        device: &str,
        new_device: &str,
        replacing: bool,
    ) -> Result<()> {
        validate_dataset_name(op, pool)?;
        check_member(op, device)?;
        validate_device_path(op, new_device)?;
        let nvroot = build_root(&[VdevSpec::disk(new_device)])
            .map_err(|e| ZfsError::wrap(op, Some(pool), e))?;
        self.with_backend(op, |backend| {
            let mut handle = open_pool(backend, op, pool)?;
            debug!(op, pool, device, new_device, replacing, "attaching device");
            handle
                .attach(device, &nvroot, replacing)
                .map_err(|f| ZfsError::from_backend(op, pool, f))?;
            info!(pool, device, new_device, replacing, "device attached");
            Ok(())
        })
    }

    /// Attach `new_device` alongside `device`, turning it into (or growing) a mirror
    pub fn attach_vdev(&self, pool: &str, device: &str, new_device: &str) -> Result<()> {
        self.attach_device(op::ATTACH_VDEV, pool, device, new_device, false)
    }

    /// Replace `old_device` with `new_device`; the old one leaves after resilver
    pub fn replace_vdev(&self, pool: &str, old_device: &str, new_device: &str) -> Result<()> {
        self.attach_device(op::REPLACE_VDEV, pool, old_device, new_device, true)
    }

    fn device_op<T, F>(&self, op: &'static str, pool: &str, device: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut B::Pool) -> BackendResult<T>,
    {
        validate_dataset_name(op, pool)?;
        check_member(op, device)?;
        self.with_backend(op, |backend| {
            let mut handle = open_pool(backend, op, pool)?;
            debug!(op, pool, device, "issuing device operation");
            let out = f(&mut handle).map_err(|failure| ZfsError::from_backend(op, pool, failure))?;
            info!(op, pool, device, "device operation done");
            Ok(out)
        })
    }

    /// Detach a device from a mirror
    pub fn detach_vdev(&self, pool: &str, device: &str) -> Result<()> {
        self.device_op(op::DETACH_VDEV, pool, device, |handle| handle.detach(device))
    }

    /// Remove a top-level vdev, spare or cache device
    pub fn remove_vdev(&self, pool: &str, device: &str) -> Result<()> {
        self.device_op(op::REMOVE_VDEV, pool, device, |handle| handle.remove(device))
    }

    /// Bring a device online; returns the state the device ended up in
    pub fn online_vdev(
        &self,
        pool: &str,
        device: &str,
        flags: VdevOnlineFlags,
    ) -> Result<VdevState> {
        self.device_op(op::ONLINE_VDEV, pool, device, |handle| handle.online(device, flags))
    }

    /// Take a device offline; `temporary` does not persist across reboots
    pub fn offline_vdev(&self, pool: &str, device: &str, temporary: bool) -> Result<()> {
        self.device_op(op::OFFLINE_VDEV, pool, device, |handle| handle.offline(device, temporary))
    }

    /// Clear error counters of one device, or of the whole pool when `device` is None
    pub fn clear_vdev(&self, pool: &str, device: Option<&str>) -> Result<()> {
        validate_dataset_name(op::CLEAR_VDEV, pool)?;
        if let Some(device) = device {
            check_member(op::CLEAR_VDEV, device)?;
        }
        self.with_backend(op::CLEAR_VDEV, |backend| {
            let mut handle = open_pool(backend, op::CLEAR_VDEV, pool)?;
            debug!(op = op::CLEAR_VDEV, pool, device = ?device, "clearing errors");
            handle
                .clear(device)
                .map_err(|f| ZfsError::from_backend(op::CLEAR_VDEV, pool, f))?;
            info!(pool, device = ?device, "errors cleared");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::is_invalid_argument;

    fn devices(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("/dev/da{}", i)).collect()
    }

    /// Test: every type fails below its minimum with InvalidArgument
    #[test]
    fn test_minimum_device_counts() {
        let cases = [
            (VdevType::Mirror, 1),
            (VdevType::RaidZ1, 2),
            (VdevType::RaidZ2, 3),
            (VdevType::RaidZ3, 4),
        ];
        for (vdev_type, count) in cases {
            let err = build(&VdevSpec::new(vdev_type, devices(count))).unwrap_err();
            assert!(is_invalid_argument(&err), "{} with {}", vdev_type, count);
        }
        assert!(build(&VdevSpec::new(VdevType::Disk, devices(0))).is_err());
        assert!(build(&VdevSpec::new(VdevType::Disk, devices(2))).is_err());
    }

    /// Test: children length equals the device count at and above the minimum
    #[test]
    fn test_children_match_device_count() {
        for (vdev_type, count) in [
            (VdevType::Mirror, 2),
            (VdevType::Mirror, 3),
            (VdevType::RaidZ1, 3),
            (VdevType::RaidZ2, 4),
            (VdevType::RaidZ3, 6),
            (VdevType::Stripe, 2),
        ] {
            let nvl = build(&VdevSpec::new(vdev_type, devices(count))).unwrap();
            let children = nvl.lookup_list_array(ZPOOL_CONFIG_CHILDREN).unwrap();
            assert_eq!(children.len(), count, "{}", vdev_type);
            for (child, path) in children.iter().zip(devices(count)) {
                assert_eq!(child.lookup_string(ZPOOL_CONFIG_TYPE).unwrap(), "disk");
                assert_eq!(child.lookup_string(ZPOOL_CONFIG_PATH).unwrap(), path);
            }
        }
    }

    /// Test: raidz parents carry type raidz and the parity level
    #[test]
    fn test_raidz_nparity() {
        let nvl = build(&VdevSpec::new(VdevType::RaidZ2, devices(4))).unwrap();
        assert_eq!(nvl.lookup_string(ZPOOL_CONFIG_TYPE).unwrap(), "raidz");
        assert_eq!(nvl.lookup_uint64(ZPOOL_CONFIG_NPARITY).unwrap(), 2);
    }

    /// Test: a bad path after valid ones fails the whole build
    #[test]
    fn test_bad_path_fails_build() {
        let spec = VdevSpec::mirror(["/dev/da0", "/dev/da1", "da2"]);
        assert!(is_invalid_argument(&build(&spec).unwrap_err()));
    }

    /// Test: root tree sorts logs, spares and cache into their slots
    #[test]
    fn test_build_root_layout() {
        let root = build_root(&[
            VdevSpec::mirror(["/dev/da0", "/dev/da1"]),
            VdevSpec::new(VdevType::Log, ["/dev/nvd0"]),
            VdevSpec::new(VdevType::Spare, ["/dev/da2", "/dev/da3"]),
            VdevSpec::new(VdevType::Cache, ["/dev/nvd1"]),
        ])
        .unwrap();

        assert_eq!(root.lookup_string(ZPOOL_CONFIG_TYPE).unwrap(), "root");
        let children = root.lookup_list_array(ZPOOL_CONFIG_CHILDREN).unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[1].lookup_uint64(ZPOOL_CONFIG_IS_LOG).unwrap(), 1);
        assert_eq!(root.lookup_list_array(ZPOOL_CONFIG_SPARES).unwrap().len(), 2);
        assert_eq!(root.lookup_list_array(ZPOOL_CONFIG_L2CACHE).unwrap().len(), 1);
        assert_eq!(leaf_paths(&root).len(), 6);
    }

    /// Test: flat device lists become top-level disks, empty lists fail
    #[test]
    fn test_build_stripe_root() {
        let root = build_stripe_root(&devices(3)).unwrap();
        assert_eq!(root.lookup_list_array(ZPOOL_CONFIG_CHILDREN).unwrap().len(), 3);
        assert!(is_invalid_argument(&build_stripe_root(&[]).unwrap_err()));
    }

    /// Test: type names parse, including aliases
    #[test]
    fn test_vdev_type_from_str() {
        assert_eq!("raidz".parse::<VdevType>().unwrap(), VdevType::RaidZ1);
        assert_eq!("root".parse::<VdevType>().unwrap(), VdevType::Stripe);
        assert!("draid".parse::<VdevType>().is_err());
    }
}
