// lib.rs
// zfs_driver: backend-independent pool, dataset, snapshot, clone and vdev management

pub mod backend;
pub mod config;
pub mod errors;
pub mod nvlist;
pub mod zfs_management;

pub use backend::BackendKind;
pub use config::{load_settings, load_settings_with_notes, DriverSettings, Settings};
pub use errors::{ErrorKind, Result, ZfsError};
pub use nvlist::{NvList, NvValue};
pub use zfs_management::{
    open_driver, CloneInfo, CreatePoolOptions, DatasetInfo, DatasetType, Driver, ExportOptions,
    ImportOptions, PoolHealth, PoolInfo, PoolState, PropSource, PropValue, PropertyInfo,
    Properties, RuntimeInfo, ScanFunction, ScanState, ScrubStatus, TypeMask, VdevOnlineFlags,
    VdevSpec, VdevState, VdevType, ZfsDriver, ZfsManager,
};
