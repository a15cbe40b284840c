// errors.rs
// Error taxonomy: errno / libzfs code mapping, structured errors, predicates

use serde::Serialize;
use std::error::Error as StdError;
use std::fmt;

pub type Result<T> = std::result::Result<T, ZfsError>;

/// Boxed cause carried by a [`ZfsError`]
pub type Cause = Box<dyn StdError + Send + Sync + 'static>;

// ============================================================================
// Error kinds
// ============================================================================

/// Closed set of failure classes callers branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    NotFound,
    PermissionDenied,
    AlreadyExists,
    Busy,
    InvalidArgument,
    NoSpace,
    IoError,
    ChecksumMismatch,
    NotSupported,
    NameTooLong,
    QuotaExceeded,
    NotEmpty,
    CrossDevice,
    /// The session was closed before the call
    Closed,
    /// The call was abandoned before it reached the backend
    Cancelled,
    /// Unmapped code, kept for diagnostics
    Unknown(i32),
}

impl ErrorKind {
    /// Symbolic code used in messages
    pub fn code(&self) -> String {
        let code = match self {
            ErrorKind::NotFound => "ENOENT",
            ErrorKind::PermissionDenied => "EPERM",
            ErrorKind::AlreadyExists => "EEXIST",
            ErrorKind::Busy => "EBUSY",
            ErrorKind::InvalidArgument => "EINVAL",
            ErrorKind::NoSpace => "ENOSPC",
            ErrorKind::IoError => "EIO",
            ErrorKind::ChecksumMismatch => "ECKSUM",
            ErrorKind::NotSupported => "ENOTSUP",
            ErrorKind::NameTooLong => "ENAMETOOLONG",
            ErrorKind::QuotaExceeded => "EDQUOT",
            ErrorKind::NotEmpty => "ENOTEMPTY",
            ErrorKind::CrossDevice => "EXDEV",
            ErrorKind::Closed => "CLOSED",
            ErrorKind::Cancelled => "CANCELLED",
            ErrorKind::Unknown(-1) => "UNKNOWN",
            ErrorKind::Unknown(code) => return format!("ERRNO_{}", code),
        };
        code.to_string()
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code())
    }
}

// ============================================================================
// Code tables
// ============================================================================

/// Checksum error as reported by the ZFS kernel module
#[cfg(target_os = "linux")]
pub const ECKSUM: i32 = libc::EBADE;
/// Checksum error as reported by the ZFS kernel module (EINTEGRITY)
#[cfg(not(target_os = "linux"))]
pub const ECKSUM: i32 = 97;

/// First libzfs `zfs_error_t` value; everything below is a plain errno
pub const EZFS_BASE: i32 = 2000;

/// Map an OS errno to its error kind
pub fn map_errno(code: i32) -> ErrorKind {
    match code {
        libc::ENOENT => ErrorKind::NotFound,
        libc::EPERM | libc::EACCES => ErrorKind::PermissionDenied,
        libc::EEXIST => ErrorKind::AlreadyExists,
        libc::EBUSY => ErrorKind::Busy,
        libc::EINVAL => ErrorKind::InvalidArgument,
        libc::ENOSPC => ErrorKind::NoSpace,
        libc::EIO => ErrorKind::IoError,
        ECKSUM => ErrorKind::ChecksumMismatch,
        libc::ENOTSUP => ErrorKind::NotSupported,
        libc::ENAMETOOLONG => ErrorKind::NameTooLong,
        libc::EDQUOT => ErrorKind::QuotaExceeded,
        libc::ENOTEMPTY => ErrorKind::NotEmpty,
        libc::EXDEV => ErrorKind::CrossDevice,
        other => ErrorKind::Unknown(other),
    }
}

/// Map a libzfs `EZFS_*` code to its error kind
/// Reference: /usr/include/libzfs/libzfs.h (zfs_error_t)
pub fn map_libzfs_error(code: i32) -> ErrorKind {
    match code {
        2001 | 2002 | 2003 | 2004 | 2006 | 2013 | 2016 | 2018 | 2021 | 2024 | 2036 | 2037
        | 2038 | 2040 | 2042 => ErrorKind::InvalidArgument,
        2000 | 2005 | 2012 | 2023 | 2032 => ErrorKind::NoSpace,
        2007 | 2020 => ErrorKind::Busy,
        2008 => ErrorKind::AlreadyExists,
        2009 | 2017 | 2022 | 2039 => ErrorKind::NotFound,
        2010 | 2014 | 2015 | 2019 | 2027 | 2028 | 2029 | 2030 | 2033 | 2034 => {
            ErrorKind::IoError
        }
        2011 | 2031 => ErrorKind::PermissionDenied,
        2025 => ErrorKind::CrossDevice,
        2026 | 2041 => ErrorKind::NotSupported,
        2043 => ErrorKind::NameTooLong,
        other => ErrorKind::Unknown(other),
    }
}

/// Map either kind of backend code
pub fn classify(code: i32) -> ErrorKind {
    if code >= EZFS_BASE {
        map_libzfs_error(code)
    } else {
        map_errno(code)
    }
}

// ============================================================================
// Backend failure
// ============================================================================

/// Raw failure reported by a backend primitive
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{description} (code {code})")]
pub struct BackendFailure {
    pub code: i32,
    pub description: String,
}

impl BackendFailure {
    pub fn new(code: i32, description: impl Into<String>) -> Self {
        BackendFailure {
            code,
            description: description.into(),
        }
    }

    /// Failure carrying a plain errno and its strerror text
    pub fn errno(code: i32) -> Self {
        let description = std::io::Error::from_raw_os_error(code).to_string();
        BackendFailure { code, description }
    }

    pub fn not_supported(what: &str) -> Self {
        BackendFailure::new(libc::ENOTSUP, format!("{} is not supported by this backend", what))
    }
}

// ============================================================================
// Structured error
// ============================================================================

fn fmt_resource(resource: &Option<String>) -> String {
    match resource {
        Some(name) => format!(" {}", name),
        None => String::new(),
    }
}

/// Structured error returned by every driver operation
#[derive(Debug, thiserror::Error)]
#[error("zfs {op}{}: {detail} ({kind})", fmt_resource(.resource))]
pub struct ZfsError {
    pub op: &'static str,
    pub resource: Option<String>,
    pub kind: ErrorKind,
    /// Raw backend or OS code, -1 when none applies
    pub errno: i32,
    pub detail: String,
    #[source]
    pub cause: Option<Cause>,
}

impl ZfsError {
    pub fn new(op: &'static str, kind: ErrorKind, detail: impl Into<String>) -> Self {
        let errno = match kind {
            ErrorKind::Unknown(code) => code,
            _ => -1,
        };
        ZfsError {
            op,
            resource: None,
            kind,
            errno,
            detail: detail.into(),
            cause: None,
        }
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn with_errno(mut self, errno: i32) -> Self {
        self.errno = errno;
        self
    }

    /// Convert a backend failure at the point of the call
    pub fn from_backend(op: &'static str, resource: &str, failure: BackendFailure) -> Self {
        ZfsError {
            op,
            resource: Some(resource.to_string()),
            kind: classify(failure.code),
            errno: failure.code,
            detail: failure.description.clone(),
            cause: Some(Box::new(failure)),
        }
    }

    pub fn invalid(op: &'static str, resource: &str, detail: impl Into<String>) -> Self {
        ZfsError::new(op, ErrorKind::InvalidArgument, detail)
            .with_resource(resource)
            .with_errno(libc::EINVAL)
    }

    pub fn not_supported(op: &'static str, detail: impl Into<String>) -> Self {
        ZfsError::new(op, ErrorKind::NotSupported, detail).with_errno(libc::ENOTSUP)
    }

    pub fn closed(op: &'static str) -> Self {
        ZfsError::new(op, ErrorKind::Closed, "driver closed")
    }

    pub fn cancelled(op: &'static str, detail: impl Into<String>) -> Self {
        ZfsError::new(op, ErrorKind::Cancelled, detail)
    }

    /// Re-home an error under a new operation and resource.
    ///
    /// If a `ZfsError` is anywhere in the cause chain its kind, code and detail
    /// are kept and the wrapped error becomes the source. Anything else becomes
    /// an `Unknown` error carrying the original message.
    pub fn wrap<E>(op: &'static str, resource: Option<&str>, err: E) -> Self
    where
        E: Into<Cause>,
    {
        let cause: Cause = err.into();
        let (kind, errno, detail) = match find(&*cause) {
            Some(inner) => (inner.kind, inner.errno, inner.detail.clone()),
            None => (ErrorKind::Unknown(-1), -1, cause.to_string()),
        };
        ZfsError {
            op,
            resource: resource.map(str::to_string),
            kind,
            errno,
            detail,
            cause: Some(cause),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

/// Errors match on (kind, operation), never on message text
impl PartialEq for ZfsError {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.op == other.op
    }
}

// ============================================================================
// Chain-aware predicates
// ============================================================================

/// First `ZfsError` found walking the `source()` chain
pub fn find<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a ZfsError> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(zfs) = e.downcast_ref::<ZfsError>() {
            return Some(zfs);
        }
        current = e.source();
    }
    None
}

/// Kind of the first `ZfsError` in the chain
pub fn kind_of(err: &(dyn StdError + 'static)) -> Option<ErrorKind> {
    find(err).map(|e| e.kind)
}

macro_rules! kind_predicate {
    ($($name:ident => $kind:ident),* $(,)?) => {
        $(
            pub fn $name(err: &(dyn StdError + 'static)) -> bool {
                kind_of(err) == Some(ErrorKind::$kind)
            }
        )*
    };
}

kind_predicate! {
    is_not_found => NotFound,
    is_permission_denied => PermissionDenied,
    is_already_exists => AlreadyExists,
    is_busy => Busy,
    is_invalid_argument => InvalidArgument,
    is_no_space => NoSpace,
    is_io_error => IoError,
    is_checksum_mismatch => ChecksumMismatch,
    is_not_supported => NotSupported,
    is_name_too_long => NameTooLong,
    is_quota_exceeded => QuotaExceeded,
    is_not_empty => NotEmpty,
    is_cross_device => CrossDevice,
    is_closed => Closed,
    is_cancelled => Cancelled,
}

/// Not-found raised by a dataset-level operation
pub fn is_dataset_not_found(err: &(dyn StdError + 'static)) -> bool {
    find(err).is_some_and(|e| e.kind == ErrorKind::NotFound && op::DATASET_OPS.contains(&e.op))
}

/// Not-found raised by a pool-level operation
pub fn is_pool_not_found(err: &(dyn StdError + 'static)) -> bool {
    find(err).is_some_and(|e| e.kind == ErrorKind::NotFound && op::POOL_OPS.contains(&e.op))
}

// ============================================================================
// Operation names
// ============================================================================

pub mod op {
    pub const OPEN_SESSION: &str = "open_session";
    pub const RUNTIME_INFO: &str = "runtime_info";
    pub const LOAD_SETTINGS: &str = "load_settings";

    pub const LIST_POOLS: &str = "list_pools";
    pub const GET_POOL: &str = "get_pool";
    pub const GET_POOL_PROPS: &str = "get_pool_props";
    pub const SET_POOL_PROP: &str = "set_pool_prop";
    pub const CREATE_POOL: &str = "create_pool";
    pub const DESTROY_POOL: &str = "destroy_pool";
    pub const IMPORT_POOL: &str = "import_pool";
    pub const EXPORT_POOL: &str = "export_pool";

    pub const LIST_DATASETS: &str = "list_datasets";
    pub const GET_DATASET: &str = "get_dataset";
    pub const GET_DATASET_PROPS: &str = "get_dataset_props";
    pub const SET_DATASET_PROP: &str = "set_dataset_prop";
    pub const CREATE_DATASET: &str = "create_dataset";
    pub const DESTROY_DATASET: &str = "destroy_dataset";

    pub const LIST_SNAPSHOTS: &str = "list_snapshots";
    pub const CREATE_SNAPSHOT: &str = "create_snapshot";
    pub const DESTROY_SNAPSHOT: &str = "destroy_snapshot";
    pub const ROLLBACK: &str = "rollback";

    pub const CREATE_CLONE: &str = "create_clone";
    pub const PROMOTE_CLONE: &str = "promote_clone";
    pub const GET_CLONE_INFO: &str = "get_clone_info";
    pub const LIST_CLONES: &str = "list_clones";
    pub const DESTROY_CLONE: &str = "destroy_clone";

    pub const ADD_VDEV: &str = "add_vdev";
    pub const ATTACH_VDEV: &str = "attach_vdev";
    pub const DETACH_VDEV: &str = "detach_vdev";
    pub const REPLACE_VDEV: &str = "replace_vdev";
    pub const REMOVE_VDEV: &str = "remove_vdev";
    pub const ONLINE_VDEV: &str = "online_vdev";
    pub const OFFLINE_VDEV: &str = "offline_vdev";
    pub const CLEAR_VDEV: &str = "clear_vdev";
    pub const BUILD_VDEV: &str = "build_vdev";

    pub const START_SCRUB: &str = "start_scrub";
    pub const PAUSE_SCRUB: &str = "pause_scrub";
    pub const STOP_SCRUB: &str = "stop_scrub";
    pub const SCRUB_STATUS: &str = "scrub_status";

    pub const SUPPORTS_FEATURE: &str = "supports_feature";
    pub const LIST_FEATURES: &str = "list_features";
    pub const LIST_COMPRESSION: &str = "list_compression";
    pub const BACKEND_VERSION: &str = "backend_version";

    pub const NVLIST: &str = "nvlist";

    /// Operations whose not-found means "no such dataset"
    pub const DATASET_OPS: &[&str] = &[
        GET_DATASET,
        LIST_DATASETS,
        GET_DATASET_PROPS,
        SET_DATASET_PROP,
        DESTROY_DATASET,
        LIST_SNAPSHOTS,
        ROLLBACK,
        GET_CLONE_INFO,
        PROMOTE_CLONE,
        DESTROY_CLONE,
    ];

    /// Operations whose not-found means "no such pool"
    pub const POOL_OPS: &[&str] = &[
        GET_POOL,
        LIST_POOLS,
        GET_POOL_PROPS,
        SET_POOL_PROP,
        DESTROY_POOL,
        IMPORT_POOL,
        EXPORT_POOL,
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test: every errno in the table maps to its documented kind
    #[test]
    fn test_map_errno_table() {
        let table = [
            (libc::ENOENT, ErrorKind::NotFound),
            (libc::EPERM, ErrorKind::PermissionDenied),
            (libc::EACCES, ErrorKind::PermissionDenied),
            (libc::EEXIST, ErrorKind::AlreadyExists),
            (libc::EBUSY, ErrorKind::Busy),
            (libc::EINVAL, ErrorKind::InvalidArgument),
            (libc::ENOSPC, ErrorKind::NoSpace),
            (libc::EIO, ErrorKind::IoError),
            (ECKSUM, ErrorKind::ChecksumMismatch),
            (libc::ENOTSUP, ErrorKind::NotSupported),
            (libc::ENAMETOOLONG, ErrorKind::NameTooLong),
            (libc::EDQUOT, ErrorKind::QuotaExceeded),
            (libc::ENOTEMPTY, ErrorKind::NotEmpty),
            (libc::EXDEV, ErrorKind::CrossDevice),
        ];
        for (code, kind) in table {
            assert_eq!(map_errno(code), kind, "errno {}", code);
        }
    }

    /// Test: unmapped codes keep the raw value
    #[test]
    fn test_map_errno_unknown_preserves_code() {
        assert_eq!(map_errno(9999), ErrorKind::Unknown(9999));
        assert_eq!(ErrorKind::Unknown(9999).code(), "ERRNO_9999");
    }

    /// Test: libzfs codes are routed through their own table
    #[test]
    fn test_classify_libzfs_codes() {
        assert_eq!(classify(2009), ErrorKind::NotFound);
        assert_eq!(classify(2008), ErrorKind::AlreadyExists);
        assert_eq!(classify(2031), ErrorKind::PermissionDenied);
        assert_eq!(classify(2043), ErrorKind::NameTooLong);
        assert_eq!(classify(2999), ErrorKind::Unknown(2999));
        assert_eq!(classify(libc::EBUSY), ErrorKind::Busy);
    }

    /// Test: display format carries op, resource, detail and code
    #[test]
    fn test_display_format() {
        let err = ZfsError::new(op::GET_DATASET, ErrorKind::NotFound, "dataset does not exist")
            .with_resource("tank/data");
        assert_eq!(
            err.to_string(),
            "zfs get_dataset tank/data: dataset does not exist (ENOENT)"
        );

        let err = ZfsError::closed(op::LIST_POOLS);
        assert_eq!(err.to_string(), "zfs list_pools: driver closed (CLOSED)");
    }

    /// Test: wrapping keeps kind and code, replaces context, keeps the chain
    #[test]
    fn test_wrap_preserves_kind_and_chain() {
        let inner = ZfsError::from_backend(
            op::GET_DATASET,
            "tank/a",
            BackendFailure::new(libc::ENOENT, "no such dataset"),
        );
        let outer = ZfsError::wrap(op::DESTROY_DATASET, Some("tank"), inner);

        assert_eq!(outer.kind, ErrorKind::NotFound);
        assert_eq!(outer.errno, libc::ENOENT);
        assert_eq!(outer.op, op::DESTROY_DATASET);
        assert_eq!(outer.resource.as_deref(), Some("tank"));

        let source = outer.source().and_then(|s| s.downcast_ref::<ZfsError>());
        assert_eq!(source.map(|s| s.op), Some(op::GET_DATASET));
        assert!(is_not_found(&outer));
    }

    /// Test: wrapping a foreign error yields Unknown with the message kept
    #[test]
    fn test_wrap_foreign_error() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let err = ZfsError::wrap(op::CREATE_POOL, None, io);
        assert_eq!(err.kind, ErrorKind::Unknown(-1));
        assert_eq!(err.detail, "disk on fire");
        assert!(!is_not_found(&err));
    }

    /// Test: predicates see through foreign wrappers and reject foreign errors
    #[test]
    fn test_predicates_are_chain_aware() {
        #[derive(Debug, thiserror::Error)]
        #[error("outer context")]
        struct Outer(#[source] ZfsError);

        let inner = ZfsError::new(op::GET_POOL, ErrorKind::NotFound, "missing");
        let outer = Outer(inner);
        assert!(is_not_found(&outer));
        assert!(is_pool_not_found(&outer));
        assert!(!is_dataset_not_found(&outer));

        let plain = std::io::Error::new(std::io::ErrorKind::NotFound, "nope");
        assert!(!is_not_found(&plain));
        assert!(kind_of(&plain).is_none());
    }

    /// Test: equality ignores message text
    #[test]
    fn test_equality_by_kind_and_op() {
        let a = ZfsError::new(op::DESTROY_CLONE, ErrorKind::InvalidArgument, "one");
        let b = ZfsError::new(op::DESTROY_CLONE, ErrorKind::InvalidArgument, "two");
        let c = ZfsError::new(op::PROMOTE_CLONE, ErrorKind::InvalidArgument, "one");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
