// backend/mod.rs
// Capability set consumed from the storage backend
//
// Session-level primitives live on `Backend`; everything done through an open
// pool or dataset lives on the handle traits. Handles close when dropped, so an
// operation that opens one releases it on every exit path.

pub mod ioctl;
pub mod mock;

#[cfg(feature = "libzfs")]
pub mod libzfs;

use crate::errors::BackendFailure;
use crate::nvlist::NvList;
use crate::zfs_management::props::PropDef;
use crate::zfs_management::types::{
    DatasetType, ImportOptions, PoolState, PropSource, ScrubCommand, TypeMask, VdevOnlineFlags,
    VdevState,
};

pub type BackendResult<T> = std::result::Result<T, BackendFailure>;

/// Answer from an iteration callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Continue,
    Abort,
}

/// Open pool handle
pub trait PoolObject: Send + Sized {
    fn name(&self) -> String;
    fn guid(&self) -> u64;
    fn state(&self) -> PoolState;

    /// Read a property into `buf` (NUL terminated), returning its source
    fn get_prop(&self, prop: &PropDef, buf: &mut [u8]) -> BackendResult<PropSource>;
    fn set_prop(&mut self, name: &str, value: &str) -> BackendResult<()>;

    /// Current configuration tree (vdev_tree, scan_stats, ...)
    fn config(&self) -> BackendResult<NvList>;

    fn destroy(self, message: &str) -> BackendResult<()>;
    fn export(self, force: bool, message: &str) -> BackendResult<()>;

    fn add_vdevs(&mut self, nvroot: &NvList) -> BackendResult<()>;
    fn attach(&mut self, old: &str, nvroot: &NvList, replacing: bool) -> BackendResult<()>;
    fn detach(&mut self, device: &str) -> BackendResult<()>;
    fn remove(&mut self, device: &str) -> BackendResult<()>;
    fn online(&mut self, device: &str, flags: VdevOnlineFlags) -> BackendResult<VdevState>;
    fn offline(&mut self, device: &str, temporary: bool) -> BackendResult<()>;
    /// Clear error counters for one device, or the whole pool
    fn clear(&mut self, device: Option<&str>) -> BackendResult<()>;
    fn scan(&mut self, command: ScrubCommand) -> BackendResult<()>;
}

/// Open dataset handle (filesystem, volume or snapshot)
pub trait DatasetObject: Send + Sized {
    fn name(&self) -> String;
    fn guid(&self) -> u64;
    fn kind(&self) -> DatasetType;

    fn get_prop(&self, prop: &PropDef, buf: &mut [u8]) -> BackendResult<PropSource>;
    fn set_prop(&mut self, name: &str, value: &str) -> BackendResult<()>;

    /// Direct children; the native primitive also reports snapshots here
    fn iter_children(&self, visit: &mut dyn FnMut(Self) -> Visit) -> BackendResult<Visit>;
    fn iter_snapshots(&self, visit: &mut dyn FnMut(Self) -> Visit) -> BackendResult<Visit>;

    fn destroy(self, defer: bool) -> BackendResult<()>;
    /// Clone this snapshot to `target`
    fn clone_to(&self, target: &str, props: Option<&NvList>) -> BackendResult<()>;
    fn promote(&mut self) -> BackendResult<()>;
    fn rollback(&mut self, snapshot: &Self, force: bool) -> BackendResult<()>;
    /// Clones of this snapshot as a name -> boolean tree
    fn clones(&self) -> BackendResult<Option<NvList>>;
}

/// One live connection to the backend
pub trait Backend: Send {
    type Pool: PoolObject;
    type Dataset: DatasetObject;

    /// "libzfs", "ioctl" or "mock"
    fn implementation(&self) -> &'static str;
    fn version(&self) -> BackendResult<String>;

    fn open_pool(&mut self, name: &str) -> BackendResult<Self::Pool>;
    fn open_dataset(&mut self, name: &str, mask: TypeMask) -> BackendResult<Self::Dataset>;

    fn iter_pools(&mut self, visit: &mut dyn FnMut(Self::Pool) -> Visit) -> BackendResult<Visit>;
    fn iter_root_datasets(
        &mut self,
        visit: &mut dyn FnMut(Self::Dataset) -> Visit,
    ) -> BackendResult<Visit>;

    fn create_pool(
        &mut self,
        name: &str,
        nvroot: &NvList,
        props: Option<&NvList>,
        fs_props: Option<&NvList>,
    ) -> BackendResult<()>;
    fn import_pool(&mut self, name: &str, options: &ImportOptions) -> BackendResult<()>;

    fn create_dataset(
        &mut self,
        name: &str,
        kind: DatasetType,
        props: Option<&NvList>,
    ) -> BackendResult<()>;
    fn snapshot(&mut self, name: &str, recursive: bool, props: Option<&NvList>)
        -> BackendResult<()>;
}

/// Backend selected at construction time
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Libzfs,
    Ioctl,
    Mock,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Libzfs => "libzfs",
            BackendKind::Ioctl => "ioctl",
            BackendKind::Mock => "mock",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "libzfs" => Ok(BackendKind::Libzfs),
            "ioctl" => Ok(BackendKind::Ioctl),
            "mock" => Ok(BackendKind::Mock),
            other => Err(format!("unknown backend '{}'", other)),
        }
    }
}

/// Copy a value into a property buffer, NUL terminated
pub(crate) fn fill_buffer(buf: &mut [u8], value: &str) -> BackendResult<()> {
    let bytes = value.as_bytes();
    if bytes.len() >= buf.len() {
        return Err(BackendFailure::new(
            libc::ERANGE,
            format!("value of {} bytes does not fit in {} byte buffer", bytes.len(), buf.len()),
        ));
    }
    buf[..bytes.len()].copy_from_slice(bytes);
    buf[bytes.len()] = 0;
    Ok(())
}
