// zfs_management/types.rs
// Value types returned by the driver and option structs it accepts

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

// ============================================================================
// Pools
// ============================================================================

/// Pool health as reported by the "health" property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PoolHealth {
    Online,
    Degraded,
    Faulted,
    Offline,
    Unavail,
    Removed,
    Unknown,
}

impl PoolHealth {
    pub fn from_name(name: &str) -> Self {
        match name.trim() {
            "ONLINE" => PoolHealth::Online,
            "DEGRADED" => PoolHealth::Degraded,
            "FAULTED" => PoolHealth::Faulted,
            "OFFLINE" => PoolHealth::Offline,
            "UNAVAIL" => PoolHealth::Unavail,
            "REMOVED" => PoolHealth::Removed,
            _ => PoolHealth::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PoolHealth::Online => "ONLINE",
            PoolHealth::Degraded => "DEGRADED",
            PoolHealth::Faulted => "FAULTED",
            PoolHealth::Offline => "OFFLINE",
            PoolHealth::Unavail => "UNAVAIL",
            PoolHealth::Removed => "REMOVED",
            PoolHealth::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for PoolHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// pool_state_t
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PoolState {
    Active,
    Exported,
    Destroyed,
    Spare,
    L2Cache,
    Uninitialized,
    Unavail,
    PotentiallyActive,
    Unknown,
}

impl PoolState {
    /// POOL_STATE_ACTIVE=0 .. POOL_STATE_POTENTIALLY_ACTIVE=7
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => PoolState::Active,
            1 => PoolState::Exported,
            2 => PoolState::Destroyed,
            3 => PoolState::Spare,
            4 => PoolState::L2Cache,
            5 => PoolState::Uninitialized,
            6 => PoolState::Unavail,
            7 => PoolState::PotentiallyActive,
            _ => PoolState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PoolState::Active => "ACTIVE",
            PoolState::Exported => "EXPORTED",
            PoolState::Destroyed => "DESTROYED",
            PoolState::Spare => "SPARE",
            PoolState::L2Cache => "L2CACHE",
            PoolState::Uninitialized => "UNINITIALIZED",
            PoolState::Unavail => "UNAVAIL",
            PoolState::PotentiallyActive => "POTENTIALLY_ACTIVE",
            PoolState::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for PoolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of one pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolInfo {
    pub name: String,
    pub guid: u64,
    pub health: PoolHealth,
    pub state: PoolState,
}

#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Import under a different name
    pub new_name: Option<String>,
    pub alt_root: Option<String>,
    pub force: bool,
    /// Allow importing a pool marked destroyed
    pub destroyed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    pub force: bool,
    /// History message recorded with the export
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CreatePoolOptions {
    /// Pool properties (ashift, autotrim, ...)
    pub properties: HashMap<String, String>,
    /// Properties for the pool's root filesystem
    pub fs_properties: HashMap<String, String>,
    pub alt_root: Option<String>,
}

// ============================================================================
// Datasets
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetType {
    Filesystem,
    Volume,
    Snapshot,
    Bookmark,
}

impl DatasetType {
    /// zfs_type_t value
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            1 => Some(DatasetType::Filesystem),
            2 => Some(DatasetType::Snapshot),
            4 => Some(DatasetType::Volume),
            16 => Some(DatasetType::Bookmark),
            _ => None,
        }
    }

    pub fn mask(self) -> TypeMask {
        match self {
            DatasetType::Filesystem => TypeMask::FILESYSTEM,
            DatasetType::Snapshot => TypeMask::SNAPSHOT,
            DatasetType::Volume => TypeMask::VOLUME,
            DatasetType::Bookmark => TypeMask::BOOKMARK,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetType::Filesystem => "filesystem",
            DatasetType::Volume => "volume",
            DatasetType::Snapshot => "snapshot",
            DatasetType::Bookmark => "bookmark",
        }
    }
}

impl fmt::Display for DatasetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatasetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "filesystem" => Ok(DatasetType::Filesystem),
            "volume" => Ok(DatasetType::Volume),
            "snapshot" => Ok(DatasetType::Snapshot),
            "bookmark" => Ok(DatasetType::Bookmark),
            other => Err(format!("unknown dataset type '{}'", other)),
        }
    }
}

/// zfs_type_t bit mask used when opening objects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeMask(pub i32);

impl TypeMask {
    pub const FILESYSTEM: TypeMask = TypeMask(1);
    pub const SNAPSHOT: TypeMask = TypeMask(2);
    pub const VOLUME: TypeMask = TypeMask(4);
    pub const POOL: TypeMask = TypeMask(8);
    pub const BOOKMARK: TypeMask = TypeMask(16);
    /// ZFS_TYPE_DATASET
    pub const DATASET: TypeMask = TypeMask(1 | 2 | 4);

    pub fn contains(self, kind: DatasetType) -> bool {
        self.0 & kind.mask().0 != 0
    }
}

impl BitOr for TypeMask {
    type Output = TypeMask;

    fn bitor(self, rhs: TypeMask) -> TypeMask {
        TypeMask(self.0 | rhs.0)
    }
}

/// Point-in-time view of one dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: DatasetType,
    pub guid: u64,
}

impl DatasetInfo {
    pub fn is_snapshot(&self) -> bool {
        self.kind == DatasetType::Snapshot
    }

    /// Pool the dataset lives in
    pub fn pool(&self) -> &str {
        super::helpers::pool_of(&self.name)
    }
}

// ============================================================================
// Properties
// ============================================================================

/// Where a property value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PropSource {
    Local,
    Inherited,
    Default,
    Temporary,
    Received,
}

impl PropSource {
    /// zprop_source_t: NONE=0x1 DEFAULT=0x2 TEMPORARY=0x4 LOCAL=0x8
    /// INHERITED=0x10 RECEIVED=0x20. Read-only statistics report NONE,
    /// which is folded into Default.
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0x4 => PropSource::Temporary,
            0x8 => PropSource::Local,
            0x10 => PropSource::Inherited,
            0x20 => PropSource::Received,
            _ => PropSource::Default,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PropSource::Local => "local",
            PropSource::Inherited => "inherited",
            PropSource::Default => "default",
            PropSource::Temporary => "temporary",
            PropSource::Received => "received",
        }
    }
}

impl fmt::Display for PropSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PropValue {
    String(String),
    Uint64(u64),
    Bool(bool),
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::String(s) => f.write_str(s),
            PropValue::Uint64(v) => write!(f, "{}", v),
            PropValue::Bool(true) => f.write_str("on"),
            PropValue::Bool(false) => f.write_str("off"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyInfo {
    pub name: String,
    pub value: PropValue,
    pub source: PropSource,
}

impl PropertyInfo {
    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            PropValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match &self.value {
            PropValue::Uint64(v) => Some(*v),
            PropValue::String(s) => s.parse().ok(),
            PropValue::Bool(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match &self.value {
            PropValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

// ============================================================================
// Clones
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CloneInfo {
    pub name: String,
    /// Origin snapshot, empty when the dataset is not a clone
    pub origin: String,
    pub is_clone: bool,
    /// Number of clones; only meaningful for snapshots
    pub clone_count: u64,
    pub dependents: Vec<String>,
}

// ============================================================================
// Vdevs
// ============================================================================

/// Flags accepted by online_vdev (ZFS_ONLINE_*)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VdevOnlineFlags(u32);

impl VdevOnlineFlags {
    pub const NONE: VdevOnlineFlags = VdevOnlineFlags(0);
    pub const CHECK_REMOVE: VdevOnlineFlags = VdevOnlineFlags(0x1);
    pub const UNSPARE: VdevOnlineFlags = VdevOnlineFlags(0x2);
    pub const FORCE_FAULT: VdevOnlineFlags = VdevOnlineFlags(0x4);
    pub const EXPAND: VdevOnlineFlags = VdevOnlineFlags(0x8);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: VdevOnlineFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for VdevOnlineFlags {
    type Output = VdevOnlineFlags;

    fn bitor(self, rhs: VdevOnlineFlags) -> VdevOnlineFlags {
        VdevOnlineFlags(self.0 | rhs.0)
    }
}

/// vdev_state_t
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VdevState {
    Unknown,
    Closed,
    Offline,
    Removed,
    CantOpen,
    Faulted,
    Degraded,
    Healthy,
}

impl VdevState {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            1 => VdevState::Closed,
            2 => VdevState::Offline,
            3 => VdevState::Removed,
            4 => VdevState::CantOpen,
            5 => VdevState::Faulted,
            6 => VdevState::Degraded,
            7 => VdevState::Healthy,
            _ => VdevState::Unknown,
        }
    }
}

// ============================================================================
// Scrub
// ============================================================================

/// dsl_scan_state_t
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanState {
    None,
    Scanning,
    Finished,
    Canceled,
    Unknown,
}

impl ScanState {
    /// DSS_NONE=0, DSS_SCANNING=1, DSS_FINISHED=2, DSS_CANCELED=3
    pub fn from_raw(raw: Option<u64>) -> Self {
        match raw {
            Some(0) => ScanState::None,
            Some(1) => ScanState::Scanning,
            Some(2) => ScanState::Finished,
            Some(3) => ScanState::Canceled,
            _ => ScanState::Unknown,
        }
    }
}

/// pool_scan_func_t
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanFunction {
    Scrub,
    Resilver,
    ErrorScrub,
}

impl ScanFunction {
    /// POOL_SCAN_NONE=0, POOL_SCAN_SCRUB=1, POOL_SCAN_RESILVER=2, POOL_SCAN_ERRORSCRUB=3
    pub fn from_raw(raw: Option<u64>) -> Option<Self> {
        match raw {
            Some(1) => Some(ScanFunction::Scrub),
            Some(2) => Some(ScanFunction::Resilver),
            Some(3) => Some(ScanFunction::ErrorScrub),
            _ => None,
        }
    }
}

/// Scrub control passed to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrubCommand {
    Start,
    Pause,
    Stop,
}

/// Scan progress decoded from pool_scan_stat_t
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScrubStatus {
    pub pool: String,
    pub health: PoolHealth,
    pub state: ScanState,
    pub function: Option<ScanFunction>,
    pub start_time: Option<u64>,
    pub end_time: Option<u64>,
    pub to_examine: Option<u64>,
    pub examined: Option<u64>,
    pub errors: Option<u64>,
}

// ============================================================================
// Runtime
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeInfo {
    /// "libzfs", "ioctl" or "mock"
    pub implementation: String,
    pub zfs_version: String,
    pub os: String,
    pub arch: String,
    pub crate_version: String,
}

impl fmt::Display for RuntimeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | {} | {}/{} | zfs_driver {}",
            self.implementation, self.zfs_version, self.os, self.arch, self.crate_version
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test: health strings map to variants, anything else is Unknown
    #[test]
    fn test_pool_health_from_name() {
        assert_eq!(PoolHealth::from_name("ONLINE"), PoolHealth::Online);
        assert_eq!(PoolHealth::from_name("DEGRADED"), PoolHealth::Degraded);
        assert_eq!(PoolHealth::from_name("SUSPENDED"), PoolHealth::Unknown);
    }

    /// Test: zprop_source_t bits map to sources
    #[test]
    fn test_prop_source_from_raw() {
        assert_eq!(PropSource::from_raw(0x8), PropSource::Local);
        assert_eq!(PropSource::from_raw(0x10), PropSource::Inherited);
        assert_eq!(PropSource::from_raw(0x20), PropSource::Received);
        assert_eq!(PropSource::from_raw(0x1), PropSource::Default);
        assert_eq!(PropSource::Inherited.to_string(), "inherited");
    }

    /// Test: type masks test membership by bit
    #[test]
    fn test_type_mask_contains() {
        let mask = TypeMask::FILESYSTEM | TypeMask::VOLUME;
        assert!(mask.contains(DatasetType::Volume));
        assert!(!mask.contains(DatasetType::Snapshot));
        assert!(TypeMask::DATASET.contains(DatasetType::Snapshot));
    }

    /// Test: online flags combine
    #[test]
    fn test_online_flags() {
        let flags = VdevOnlineFlags::EXPAND | VdevOnlineFlags::UNSPARE;
        assert_eq!(flags.bits(), 0xa);
        assert!(flags.contains(VdevOnlineFlags::EXPAND));
        assert!(!flags.contains(VdevOnlineFlags::FORCE_FAULT));
    }

    /// Test: property accessors follow the value variant
    #[test]
    fn test_property_accessors() {
        let prop = PropertyInfo {
            name: "used".to_string(),
            value: PropValue::Uint64(1024),
            source: PropSource::Default,
        };
        assert_eq!(prop.as_u64(), Some(1024));
        assert_eq!(prop.as_str(), None);
        assert_eq!(prop.value.to_string(), "1024");
    }
}
