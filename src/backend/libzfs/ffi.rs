// backend/libzfs/ffi.rs
// FFI declarations and RAII guards for libzfs / libnvpair

#![allow(non_camel_case_types)]

use libzfs_sys::libzfs_handle_t;
use nvpair_sys::nvlist_t;
use std::ffi::{c_char, c_int, c_uint, c_void};

// ============================================================================
// Opaque handles
// ============================================================================
// libzfs-sys binds the session entry points; the object-level calls below are
// declared here against our own opaque handle types.

/// Opaque handle to a ZFS pool (libzfs)
#[repr(C)]
pub struct zpool_handle_t {
    _private: [u8; 0],
}

/// Opaque handle to a dataset, volume or snapshot (libzfs)
#[repr(C)]
pub struct zfs_handle_t {
    _private: [u8; 0],
}

/// Opaque name/value pair inside an nvlist
#[repr(C)]
pub struct nvpair_t {
    _private: [u8; 0],
}

pub type zpool_iter_f = unsafe extern "C" fn(*mut zpool_handle_t, *mut c_void) -> c_int;
pub type zfs_iter_f = unsafe extern "C" fn(*mut zfs_handle_t, *mut c_void) -> c_int;

pub const B_FALSE: c_int = 0;
pub const B_TRUE: c_int = 1;

pub fn boolean(value: bool) -> c_int {
    if value {
        B_TRUE
    } else {
        B_FALSE
    }
}

/// pool_scan_func_t
pub const POOL_SCAN_NONE: c_int = 0;
pub const POOL_SCAN_SCRUB: c_int = 1;
/// pool_scrub_cmd_t
pub const POOL_SCRUB_NORMAL: c_int = 0;
pub const POOL_SCRUB_PAUSE: c_int = 1;

/// data_type_t values this crate converts
pub const DATA_TYPE_BOOLEAN: c_int = 1;
pub const DATA_TYPE_UINT64: c_int = 8;
pub const DATA_TYPE_STRING: c_int = 9;
pub const DATA_TYPE_UINT64_ARRAY: c_int = 16;
pub const DATA_TYPE_NVLIST: c_int = 19;
pub const DATA_TYPE_NVLIST_ARRAY: c_int = 20;
pub const DATA_TYPE_BOOLEAN_VALUE: c_int = 21;

// ============================================================================
// libzfs
// ============================================================================
// Reference: /usr/include/libzfs/libzfs.h

#[link(name = "zfs")]
extern "C" {
    pub fn libzfs_errno(hdl: *mut libzfs_handle_t) -> c_int;
    pub fn zfs_version_userland(buf: *mut c_char, len: c_int);

    // pools
    pub fn zpool_iter(hdl: *mut libzfs_handle_t, func: zpool_iter_f, data: *mut c_void) -> c_int;
    pub fn zpool_open_canfail(
        hdl: *mut libzfs_handle_t,
        name: *const c_char,
    ) -> *mut zpool_handle_t;
    pub fn zpool_close(zhp: *mut zpool_handle_t);
    pub fn zpool_get_name(zhp: *mut zpool_handle_t) -> *const c_char;
    pub fn zpool_get_state(zhp: *mut zpool_handle_t) -> c_int;
    pub fn zpool_get_prop_int(zhp: *mut zpool_handle_t, prop: c_int, src: *mut c_int) -> u64;
    /// ```c
    /// int zpool_get_prop(zpool_handle_t *zhp, zpool_prop_t prop, char *buf,
    ///     size_t len, zprop_source_t *srctype, boolean_t literal);
    /// ```
    pub fn zpool_get_prop(
        zhp: *mut zpool_handle_t,
        prop: c_int,
        buf: *mut c_char,
        len: usize,
        srctype: *mut c_int,
        literal: c_int,
    ) -> c_int;
    pub fn zpool_set_prop(
        zhp: *mut zpool_handle_t,
        name: *const c_char,
        value: *const c_char,
    ) -> c_int;
    /// Returned tree belongs to the handle
    pub fn zpool_get_config(
        zhp: *mut zpool_handle_t,
        oldconfig: *mut *mut nvlist_t,
    ) -> *mut nvlist_t;
    pub fn zpool_create(
        hdl: *mut libzfs_handle_t,
        name: *const c_char,
        nvroot: *mut nvlist_t,
        props: *mut nvlist_t,
        fsprops: *mut nvlist_t,
    ) -> c_int;
    pub fn zpool_destroy(zhp: *mut zpool_handle_t, log_str: *const c_char) -> c_int;
    pub fn zpool_export(zhp: *mut zpool_handle_t, force: c_int, log_str: *const c_char) -> c_int;
    pub fn zpool_add(zhp: *mut zpool_handle_t, nvroot: *mut nvlist_t, check_ashift: c_int) -> c_int;
    /// ```c
    /// int zpool_vdev_attach(zpool_handle_t *zhp, const char *old_disk,
    ///     const char *new_disk, nvlist_t *nvroot, int replacing, boolean_t rebuild);
    /// ```
    pub fn zpool_vdev_attach(
        zhp: *mut zpool_handle_t,
        old_disk: *const c_char,
        new_disk: *const c_char,
        nvroot: *mut nvlist_t,
        replacing: c_int,
        rebuild: c_int,
    ) -> c_int;
    pub fn zpool_vdev_detach(zhp: *mut zpool_handle_t, path: *const c_char) -> c_int;
    pub fn zpool_vdev_remove(zhp: *mut zpool_handle_t, path: *const c_char) -> c_int;
    pub fn zpool_vdev_online(
        zhp: *mut zpool_handle_t,
        path: *const c_char,
        flags: c_int,
        newstate: *mut c_int,
    ) -> c_int;
    pub fn zpool_vdev_offline(zhp: *mut zpool_handle_t, path: *const c_char, istmp: c_int) -> c_int;
    pub fn zpool_clear(
        zhp: *mut zpool_handle_t,
        path: *const c_char,
        rewindnvl: *mut nvlist_t,
    ) -> c_int;
    pub fn zpool_scan(zhp: *mut zpool_handle_t, func: c_int, cmd: c_int) -> c_int;

    // datasets
    pub fn zfs_iter_root(hdl: *mut libzfs_handle_t, func: zfs_iter_f, data: *mut c_void) -> c_int;
    /// Filesystems and volumes, then snapshots
    pub fn zfs_iter_children(zhp: *mut zfs_handle_t, func: zfs_iter_f, data: *mut c_void) -> c_int;
    pub fn zfs_iter_snapshots(
        zhp: *mut zfs_handle_t,
        simple: c_int,
        func: zfs_iter_f,
        data: *mut c_void,
        min_txg: u64,
        max_txg: u64,
    ) -> c_int;
    pub fn zfs_open(
        hdl: *mut libzfs_handle_t,
        name: *const c_char,
        types: c_int,
    ) -> *mut zfs_handle_t;
    pub fn zfs_close(zhp: *mut zfs_handle_t);
    pub fn zfs_get_name(zhp: *const zfs_handle_t) -> *const c_char;
    pub fn zfs_get_type(zhp: *const zfs_handle_t) -> c_int;
    pub fn zfs_prop_get_int(zhp: *mut zfs_handle_t, prop: c_int) -> u64;
    /// ```c
    /// int zfs_prop_get(zfs_handle_t *zhp, zfs_prop_t prop, char *propbuf,
    ///     size_t proplen, zprop_source_t *src, char *statbuf, size_t statlen,
    ///     boolean_t literal);
    /// ```
    pub fn zfs_prop_get(
        zhp: *mut zfs_handle_t,
        prop: c_int,
        buf: *mut c_char,
        len: usize,
        src: *mut c_int,
        statbuf: *mut c_char,
        statlen: usize,
        literal: c_int,
    ) -> c_int;
    pub fn zfs_prop_set(zhp: *mut zfs_handle_t, name: *const c_char, value: *const c_char) -> c_int;
    pub fn zfs_create(
        hdl: *mut libzfs_handle_t,
        path: *const c_char,
        kind: c_int,
        props: *mut nvlist_t,
    ) -> c_int;
    pub fn zfs_destroy(zhp: *mut zfs_handle_t, defer: c_int) -> c_int;
    pub fn zfs_snapshot(
        hdl: *mut libzfs_handle_t,
        path: *const c_char,
        recursive: c_int,
        props: *mut nvlist_t,
    ) -> c_int;
    pub fn zfs_clone(zhp: *mut zfs_handle_t, target: *const c_char, props: *mut nvlist_t) -> c_int;
    pub fn zfs_promote(zhp: *mut zfs_handle_t) -> c_int;
    pub fn zfs_rollback(zhp: *mut zfs_handle_t, snap: *mut zfs_handle_t, force: c_int) -> c_int;
    /// Returned tree belongs to the handle
    pub fn zfs_get_clones_nvl(zhp: *mut zfs_handle_t) -> *mut nvlist_t;
}

// ============================================================================
// libnvpair (entry points nvpair-sys does not cover)
// ============================================================================

#[link(name = "nvpair")]
extern "C" {
    pub fn nvlist_add_boolean_value(nvl: *mut nvlist_t, name: *const c_char, value: c_int) -> c_int;
    pub fn nvlist_add_nvlist(
        nvl: *mut nvlist_t,
        name: *const c_char,
        value: *mut nvlist_t,
    ) -> c_int;
    pub fn nvlist_add_uint64_array(
        nvl: *mut nvlist_t,
        name: *const c_char,
        value: *const u64,
        count: c_uint,
    ) -> c_int;
    pub fn nvlist_next_nvpair(nvl: *mut nvlist_t, pair: *mut nvpair_t) -> *mut nvpair_t;
    pub fn nvpair_name(pair: *mut nvpair_t) -> *const c_char;
    pub fn nvpair_type(pair: *mut nvpair_t) -> c_int;
    pub fn nvpair_value_string(pair: *mut nvpair_t, value: *mut *const c_char) -> c_int;
    pub fn nvpair_value_uint64(pair: *mut nvpair_t, value: *mut u64) -> c_int;
    pub fn nvpair_value_uint64_array(
        pair: *mut nvpair_t,
        value: *mut *mut u64,
        count: *mut c_uint,
    ) -> c_int;
    pub fn nvpair_value_boolean_value(pair: *mut nvpair_t, value: *mut c_int) -> c_int;
    pub fn nvpair_value_nvlist(pair: *mut nvpair_t, value: *mut *mut nvlist_t) -> c_int;
    pub fn nvpair_value_nvlist_array(
        pair: *mut nvpair_t,
        value: *mut *mut *mut nvlist_t,
        count: *mut c_uint,
    ) -> c_int;
}

// ============================================================================
// RAII Guards for resource cleanup
// ============================================================================

/// RAII guard for libzfs handle - calls libzfs_fini() on drop
pub struct LibzfsGuard(pub *mut libzfs_handle_t);

impl Drop for LibzfsGuard {
    fn drop(&mut self) {
        unsafe { libzfs_sys::libzfs_fini(self.0) }
    }
}

/// RAII guard for zpool handle - calls zpool_close() on drop
pub struct PoolGuard(pub *mut zpool_handle_t);

impl Drop for PoolGuard {
    fn drop(&mut self) {
        unsafe { zpool_close(self.0) }
    }
}

/// RAII guard for dataset handle - calls zfs_close() on drop
pub struct DatasetGuard(pub *mut zfs_handle_t);

impl Drop for DatasetGuard {
    fn drop(&mut self) {
        unsafe { zfs_close(self.0) }
    }
}
