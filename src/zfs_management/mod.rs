// zfs_management/mod.rs
// Driver composition: contract, session, operations and the async facade

mod clones;
mod datasets;
pub mod driver;
pub mod features;
pub mod helpers;
pub mod iter;
mod manager;
mod pools;
pub mod props;
mod scrub;
pub mod session;
mod snapshots;
pub mod types;
pub mod vdev;

#[cfg(test)]
mod tests;

pub use driver::{open_driver, Driver, Properties, ZfsDriver};
pub use manager::ZfsManager;
pub use types::{
    CloneInfo, CreatePoolOptions, DatasetInfo, DatasetType, ExportOptions, ImportOptions,
    PoolHealth, PoolInfo, PoolState, PropSource, PropValue, PropertyInfo, RuntimeInfo,
    ScanFunction, ScanState, ScrubStatus, TypeMask, VdevOnlineFlags, VdevState,
};
pub use vdev::{VdevSpec, VdevType};
