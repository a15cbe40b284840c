// backend/ioctl.rs
// Direct /dev/zfs backend: session open and version probe only

use super::{Backend, BackendResult, DatasetObject, PoolObject, Visit};
use crate::errors::BackendFailure;
use crate::nvlist::NvList;
use crate::zfs_management::props::PropDef;
use crate::zfs_management::types::{
    DatasetType, ImportOptions, PoolState, PropSource, ScrubCommand, TypeMask, VdevOnlineFlags,
    VdevState,
};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

pub const ZFS_DEVICE: &str = "/dev/zfs";
pub const ZFS_MODULE_VERSION: &str = "/sys/module/zfs/version";

/// Session over the ZFS control device.
///
/// Opening the device proves the kernel module is present and reachable.
/// Object operations need the kernel's packed nvlist ioctl protocol, which is
/// not implemented: every one of them fails with NotSupported.
pub struct IoctlBackend {
    _device: File,
    version_path: PathBuf,
}

impl IoctlBackend {
    pub fn open() -> BackendResult<Self> {
        IoctlBackend::open_at(Path::new(ZFS_DEVICE), Path::new(ZFS_MODULE_VERSION))
    }

    pub fn open_at(device: &Path, version_path: &Path) -> BackendResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(device)
            .map_err(|e| {
                BackendFailure::new(
                    e.raw_os_error().unwrap_or(libc::ENXIO),
                    format!("failed to open {}: {}", device.display(), e),
                )
            })?;
        tracing::debug!(device = %device.display(), "zfs control device opened");
        Ok(IoctlBackend {
            _device: file,
            version_path: version_path.to_path_buf(),
        })
    }
}

fn unsupported(what: &str) -> BackendFailure {
    BackendFailure::not_supported(what)
}

impl Backend for IoctlBackend {
    type Pool = IoctlPool;
    type Dataset = IoctlDataset;

    fn implementation(&self) -> &'static str {
        "ioctl"
    }

    fn version(&self) -> BackendResult<String> {
        let raw = std::fs::read_to_string(&self.version_path).map_err(|e| {
            BackendFailure::new(
                e.raw_os_error().unwrap_or(libc::ENOENT),
                format!("failed to read {}: {}", self.version_path.display(), e),
            )
        })?;
        Ok(format!("zfs-kmod-{}", raw.trim()))
    }

    fn open_pool(&mut self, _name: &str) -> BackendResult<IoctlPool> {
        Err(unsupported("opening pools"))
    }

    fn open_dataset(&mut self, _name: &str, _mask: TypeMask) -> BackendResult<IoctlDataset> {
        Err(unsupported("opening datasets"))
    }

    fn iter_pools(&mut self, _visit: &mut dyn FnMut(IoctlPool) -> Visit) -> BackendResult<Visit> {
        Err(unsupported("pool iteration"))
    }

    fn iter_root_datasets(
        &mut self,
        _visit: &mut dyn FnMut(IoctlDataset) -> Visit,
    ) -> BackendResult<Visit> {
        Err(unsupported("dataset iteration"))
    }

    fn create_pool(
        &mut self,
        _name: &str,
        _nvroot: &NvList,
        _props: Option<&NvList>,
        _fs_props: Option<&NvList>,
    ) -> BackendResult<()> {
        Err(unsupported("pool creation"))
    }

    fn import_pool(&mut self, _name: &str, _options: &ImportOptions) -> BackendResult<()> {
        Err(unsupported("pool import"))
    }

    fn create_dataset(
        &mut self,
        _name: &str,
        _kind: DatasetType,
        _props: Option<&NvList>,
    ) -> BackendResult<()> {
        Err(unsupported("dataset creation"))
    }

    fn snapshot(
        &mut self,
        _name: &str,
        _recursive: bool,
        _props: Option<&NvList>,
    ) -> BackendResult<()> {
        Err(unsupported("snapshots"))
    }
}

/// Never constructed: the backend cannot open pools
pub enum IoctlPool {}

/// Never constructed: the backend cannot open datasets
pub enum IoctlDataset {}

impl PoolObject for IoctlPool {
    fn name(&self) -> String {
        match *self {}
    }
    fn guid(&self) -> u64 {
        match *self {}
    }
    fn state(&self) -> PoolState {
        match *self {}
    }
    fn get_prop(&self, _prop: &PropDef, _buf: &mut [u8]) -> BackendResult<PropSource> {
        match *self {}
    }
    fn set_prop(&mut self, _name: &str, _value: &str) -> BackendResult<()> {
        match *self {}
    }
    fn config(&self) -> BackendResult<NvList> {
        match *self {}
    }
    fn destroy(self, _message: &str) -> BackendResult<()> {
        match self {}
    }
    fn export(self, _force: bool, _message: &str) -> BackendResult<()> {
        match self {}
    }
    fn add_vdevs(&mut self, _nvroot: &NvList) -> BackendResult<()> {
        match *self {}
    }
    fn attach(&mut self, _old: &str, _nvroot: &NvList, _replacing: bool) -> BackendResult<()> {
        match *self {}
    }
    fn detach(&mut self, _device: &str) -> BackendResult<()> {
        match *self {}
    }
    fn remove(&mut self, _device: &str) -> BackendResult<()> {
        match *self {}
    }
    fn online(&mut self, _device: &str, _flags: VdevOnlineFlags) -> BackendResult<VdevState> {
        match *self {}
    }
    fn offline(&mut self, _device: &str, _temporary: bool) -> BackendResult<()> {
        match *self {}
    }
    fn clear(&mut self, _device: Option<&str>) -> BackendResult<()> {
        match *self {}
    }
    fn scan(&mut self, _command: ScrubCommand) -> BackendResult<()> {
        match *self {}
    }
}

impl DatasetObject for IoctlDataset {
    fn name(&self) -> String {
        match *self {}
    }
    fn guid(&self) -> u64 {
        match *self {}
    }
    fn kind(&self) -> DatasetType {
        match *self {}
    }
    fn get_prop(&self, _prop: &PropDef, _buf: &mut [u8]) -> BackendResult<PropSource> {
        match *self {}
    }
    fn set_prop(&mut self, _name: &str, _value: &str) -> BackendResult<()> {
        match *self {}
    }
    fn iter_children(&self, _visit: &mut dyn FnMut(Self) -> Visit) -> BackendResult<Visit> {
        match *self {}
    }
    fn iter_snapshots(&self, _visit: &mut dyn FnMut(Self) -> Visit) -> BackendResult<Visit> {
        match *self {}
    }
    fn destroy(self, _defer: bool) -> BackendResult<()> {
        match self {}
    }
    fn clone_to(&self, _target: &str, _props: Option<&NvList>) -> BackendResult<()> {
        match *self {}
    }
    fn promote(&mut self) -> BackendResult<()> {
        match *self {}
    }
    fn rollback(&mut self, _snapshot: &Self, _force: bool) -> BackendResult<()> {
        match *self {}
    }
    fn clones(&self) -> BackendResult<Option<NvList>> {
        match *self {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Test: a missing control device is reported with its errno
    #[test]
    fn test_open_missing_device() {
        let dir = tempfile::tempdir().unwrap();
        let err = IoctlBackend::open_at(&dir.path().join("zfs"), &dir.path().join("version"))
            .err()
            .unwrap();
        assert_eq!(err.code, libc::ENOENT);
    }

    /// Test: the version comes from the module's sysfs entry
    #[test]
    fn test_version_from_module_file() {
        let dir = tempfile::tempdir().unwrap();
        let device = dir.path().join("zfs");
        std::fs::write(&device, b"").unwrap();
        let version = dir.path().join("version");
        let mut f = File::create(&version).unwrap();
        writeln!(f, "2.2.4-1").unwrap();

        let mut backend = IoctlBackend::open_at(&device, &version).unwrap();
        assert_eq!(backend.implementation(), "ioctl");
        assert_eq!(backend.version().unwrap(), "zfs-kmod-2.2.4-1");
        assert_eq!(backend.open_pool("tank").err().unwrap().code, libc::ENOTSUP);
    }
}
