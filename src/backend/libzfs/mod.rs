// backend/libzfs/mod.rs
// Backend bound to the system libzfs through FFI

mod ffi;
pub mod nvlist;

use self::ffi::*;
use self::nvlist::{optional_ptr, to_tree, NativeNvlist};
use super::{Backend, BackendResult, DatasetObject, PoolObject, Visit};
use crate::errors::BackendFailure;
use crate::nvlist::NvList;
use crate::zfs_management::props::{self, PropClass, PropDef};
use crate::zfs_management::types::{
    DatasetType, ImportOptions, PoolState, PropSource, ScrubCommand, TypeMask, VdevOnlineFlags,
    VdevState,
};
use crate::zfs_management::vdev::leaf_paths;
use libzfs_sys::{libzfs_error_description, libzfs_handle_t, libzfs_init};
use std::any::Any;
use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::ptr;

fn cstring(value: &str) -> BackendResult<CString> {
    CString::new(value)
        .map_err(|_| BackendFailure::new(libc::EINVAL, format!("'{}' contains a null byte", value)))
}

unsafe fn owned_str(ptr: *const c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

/// Last error recorded on the library handle.
///
/// libzfs keeps an `EZFS_*` code and a description per handle; a failing call
/// that did not record one falls back to the call's own return value.
fn last_failure(hdl: *mut libzfs_handle_t, ret: c_int) -> BackendFailure {
    let code = unsafe { libzfs_errno(hdl) };
    let description = unsafe { owned_str(libzfs_error_description(hdl)) };
    if code != 0 {
        return BackendFailure::new(code, description);
    }
    let fallback = if ret > 0 { ret } else { libc::EIO };
    if description.is_empty() {
        BackendFailure::errno(fallback)
    } else {
        BackendFailure::new(fallback, description)
    }
}

fn result(hdl: *mut libzfs_handle_t, ret: c_int) -> BackendResult<()> {
    if ret == 0 {
        Ok(())
    } else {
        Err(last_failure(hdl, ret))
    }
}

// ============================================================================
// Iteration trampolines
// ============================================================================

/// Callback state passed through the library's `void *data`
struct IterState<'a, H> {
    hdl: *mut libzfs_handle_t,
    visit: &'a mut dyn FnMut(H) -> Visit,
    aborted: bool,
    panic: Option<Box<dyn Any + Send>>,
}

impl<H> IterState<'_, H> {
    /// Hand the object to the visitor; a panic is parked and rethrown after
    /// the library call returns, never unwound through C frames
    fn deliver(&mut self, object: H) -> c_int {
        match catch_unwind(AssertUnwindSafe(|| (self.visit)(object))) {
            Ok(Visit::Continue) => 0,
            Ok(Visit::Abort) => {
                self.aborted = true;
                1
            }
            Err(payload) => {
                self.panic = Some(payload);
                1
            }
        }
    }

    fn finish(self, ret: c_int) -> BackendResult<Visit> {
        if let Some(payload) = self.panic {
            resume_unwind(payload);
        }
        if self.aborted {
            Ok(Visit::Abort)
        } else {
            result(self.hdl, ret).map(|_| Visit::Continue)
        }
    }
}

unsafe extern "C" fn pool_callback(zhp: *mut zpool_handle_t, data: *mut c_void) -> c_int {
    let state = &mut *(data as *mut IterState<'_, LibzfsPool>);
    // the callback owns zhp; the wrapper closes it
    let pool = LibzfsPool {
        handle: PoolGuard(zhp),
        hdl: state.hdl,
    };
    if state.panic.is_some() || state.aborted {
        return 1;
    }
    state.deliver(pool)
}

unsafe extern "C" fn dataset_callback(zhp: *mut zfs_handle_t, data: *mut c_void) -> c_int {
    let state = &mut *(data as *mut IterState<'_, LibzfsDataset>);
    let dataset = LibzfsDataset {
        handle: DatasetGuard(zhp),
        hdl: state.hdl,
    };
    if state.panic.is_some() || state.aborted {
        return 1;
    }
    state.deliver(dataset)
}

// ============================================================================
// Backend
// ============================================================================

/// One libzfs library handle
pub struct LibzfsBackend {
    hdl: LibzfsGuard,
}

// SAFETY: the handle is only used behind the session mutex, one call at a time
unsafe impl Send for LibzfsBackend {}

impl LibzfsBackend {
    pub fn new() -> BackendResult<Self> {
        let hdl = unsafe { libzfs_init() };
        if hdl.is_null() {
            return Err(BackendFailure::new(
                libc::ENXIO,
                "failed to initialize libzfs handle (is the zfs module loaded?)",
            ));
        }
        tracing::debug!("libzfs handle initialized");
        Ok(LibzfsBackend {
            hdl: LibzfsGuard(hdl),
        })
    }

    fn hdl(&self) -> *mut libzfs_handle_t {
        self.hdl.0
    }
}

impl Backend for LibzfsBackend {
    type Pool = LibzfsPool;
    type Dataset = LibzfsDataset;

    fn implementation(&self) -> &'static str {
        "libzfs"
    }

    fn version(&self) -> BackendResult<String> {
        let mut buf = [0 as c_char; 128];
        unsafe { zfs_version_userland(buf.as_mut_ptr(), buf.len() as c_int) };
        let version = unsafe { owned_str(buf.as_ptr()) };
        if version.is_empty() {
            return Err(BackendFailure::new(libc::ENOENT, "libzfs reported no version"));
        }
        Ok(version)
    }

    fn open_pool(&mut self, name: &str) -> BackendResult<LibzfsPool> {
        let c_name = cstring(name)?;
        let zhp = unsafe { zpool_open_canfail(self.hdl(), c_name.as_ptr()) };
        if zhp.is_null() {
            return Err(last_failure(self.hdl(), libc::ENOENT));
        }
        Ok(LibzfsPool {
            handle: PoolGuard(zhp),
            hdl: self.hdl(),
        })
    }

    fn open_dataset(&mut self, name: &str, mask: TypeMask) -> BackendResult<LibzfsDataset> {
        let c_name = cstring(name)?;
        let zhp = unsafe { zfs_open(self.hdl(), c_name.as_ptr(), mask.0) };
        if zhp.is_null() {
            return Err(last_failure(self.hdl(), libc::ENOENT));
        }
        Ok(LibzfsDataset {
            handle: DatasetGuard(zhp),
            hdl: self.hdl(),
        })
    }

    fn iter_pools(&mut self, visit: &mut dyn FnMut(LibzfsPool) -> Visit) -> BackendResult<Visit> {
        let mut state = IterState {
            hdl: self.hdl(),
            visit,
            aborted: false,
            panic: None,
        };
        let ret = unsafe {
            zpool_iter(
                self.hdl(),
                pool_callback,
                &mut state as *mut IterState<'_, LibzfsPool> as *mut c_void,
            )
        };
        state.finish(ret)
    }

    fn iter_root_datasets(
        &mut self,
        visit: &mut dyn FnMut(LibzfsDataset) -> Visit,
    ) -> BackendResult<Visit> {
        let mut state = IterState {
            hdl: self.hdl(),
            visit,
            aborted: false,
            panic: None,
        };
        let ret = unsafe {
            zfs_iter_root(
                self.hdl(),
                dataset_callback,
                &mut state as *mut IterState<'_, LibzfsDataset> as *mut c_void,
            )
        };
        state.finish(ret)
    }

    fn create_pool(
        &mut self,
        name: &str,
        nvroot: &NvList,
        props: Option<&NvList>,
        fs_props: Option<&NvList>,
    ) -> BackendResult<()> {
        let c_name = cstring(name)?;
        let root = NativeNvlist::from_tree(nvroot)?;
        let props = NativeNvlist::from_optional(props)?;
        let fs_props = NativeNvlist::from_optional(fs_props)?;
        let ret = unsafe {
            zpool_create(
                self.hdl(),
                c_name.as_ptr(),
                root.as_ptr(),
                optional_ptr(&props),
                optional_ptr(&fs_props),
            )
        };
        result(self.hdl(), ret)
    }

    fn import_pool(&mut self, name: &str, _options: &ImportOptions) -> BackendResult<()> {
        Err(BackendFailure::not_supported(&format!(
            "importing '{}' without a device scan",
            name
        )))
    }

    fn create_dataset(
        &mut self,
        name: &str,
        kind: DatasetType,
        props: Option<&NvList>,
    ) -> BackendResult<()> {
        let c_name = cstring(name)?;
        let props = NativeNvlist::from_optional(props)?;
        let ret = unsafe {
            zfs_create(self.hdl(), c_name.as_ptr(), kind.mask().0, optional_ptr(&props))
        };
        result(self.hdl(), ret)
    }

    fn snapshot(
        &mut self,
        name: &str,
        recursive: bool,
        props: Option<&NvList>,
    ) -> BackendResult<()> {
        let c_name = cstring(name)?;
        let props = NativeNvlist::from_optional(props)?;
        let ret = unsafe {
            zfs_snapshot(self.hdl(), c_name.as_ptr(), boolean(recursive), optional_ptr(&props))
        };
        result(self.hdl(), ret)
    }
}

// ============================================================================
// Pool handle
// ============================================================================

pub struct LibzfsPool {
    handle: PoolGuard,
    hdl: *mut libzfs_handle_t,
}

// SAFETY: pool handles never leave the session that opened them
unsafe impl Send for LibzfsPool {}

impl LibzfsPool {
    fn zhp(&self) -> *mut zpool_handle_t {
        self.handle.0
    }

    fn on_device<F>(&self, device: &str, call: F) -> BackendResult<()>
    where
        F: FnOnce(*mut zpool_handle_t, *const c_char) -> c_int,
    {
        let c_device = cstring(device)?;
        let ret = call(self.zhp(), c_device.as_ptr());
        result(self.hdl, ret)
    }
}

impl PoolObject for LibzfsPool {
    fn name(&self) -> String {
        unsafe { owned_str(zpool_get_name(self.zhp())) }
    }

    fn guid(&self) -> u64 {
        match props::lookup(PropClass::Pool, "guid") {
            Some(def) => unsafe { zpool_get_prop_int(self.zhp(), def.id, ptr::null_mut()) },
            None => 0,
        }
    }

    fn state(&self) -> PoolState {
        PoolState::from_raw(unsafe { zpool_get_state(self.zhp()) })
    }

    fn get_prop(&self, prop: &PropDef, buf: &mut [u8]) -> BackendResult<PropSource> {
        let mut src: c_int = 0;
        let ret = unsafe {
            zpool_get_prop(
                self.zhp(),
                prop.id,
                buf.as_mut_ptr() as *mut c_char,
                buf.len(),
                &mut src,
                boolean(prop.literal()),
            )
        };
        if ret != 0 {
            return Err(BackendFailure::new(
                libc::ENOENT,
                format!("property '{}' unavailable", prop.name),
            ));
        }
        Ok(PropSource::from_raw(src))
    }

    fn set_prop(&mut self, name: &str, value: &str) -> BackendResult<()> {
        let c_name = cstring(name)?;
        let c_value = cstring(value)?;
        let ret = unsafe { zpool_set_prop(self.zhp(), c_name.as_ptr(), c_value.as_ptr()) };
        result(self.hdl, ret)
    }

    fn config(&self) -> BackendResult<NvList> {
        let config = unsafe { zpool_get_config(self.zhp(), ptr::null_mut()) };
        if config.is_null() {
            return Err(BackendFailure::new(libc::ENOENT, "pool has no configuration"));
        }
        unsafe { to_tree(config) }
    }

    fn destroy(self, message: &str) -> BackendResult<()> {
        let c_message = cstring(message)?;
        let ret = unsafe { zpool_destroy(self.zhp(), c_message.as_ptr()) };
        result(self.hdl, ret)
    }

    fn export(self, force: bool, message: &str) -> BackendResult<()> {
        let c_message = cstring(message)?;
        let ret = unsafe { zpool_export(self.zhp(), boolean(force), c_message.as_ptr()) };
        result(self.hdl, ret)
    }

    fn add_vdevs(&mut self, nvroot: &NvList) -> BackendResult<()> {
        let root = NativeNvlist::from_tree(nvroot)?;
        let ret = unsafe { zpool_add(self.zhp(), root.as_ptr(), B_TRUE) };
        result(self.hdl, ret)
    }

    fn attach(&mut self, old: &str, nvroot: &NvList, replacing: bool) -> BackendResult<()> {
        let new_disk = leaf_paths(nvroot)
            .into_iter()
            .next()
            .ok_or_else(|| BackendFailure::new(libc::EINVAL, "no new device given"))?;
        let c_old = cstring(old)?;
        let c_new = cstring(&new_disk)?;
        let root = NativeNvlist::from_tree(nvroot)?;
        let ret = unsafe {
            zpool_vdev_attach(
                self.zhp(),
                c_old.as_ptr(),
                c_new.as_ptr(),
                root.as_ptr(),
                boolean(replacing),
                B_FALSE,
            )
        };
        result(self.hdl, ret)
    }

    fn detach(&mut self, device: &str) -> BackendResult<()> {
        self.on_device(device, |zhp, path| unsafe { zpool_vdev_detach(zhp, path) })
    }

    fn remove(&mut self, device: &str) -> BackendResult<()> {
        self.on_device(device, |zhp, path| unsafe { zpool_vdev_remove(zhp, path) })
    }

    fn online(&mut self, device: &str, flags: VdevOnlineFlags) -> BackendResult<VdevState> {
        let mut new_state: c_int = 0;
        self.on_device(device, |zhp, path| unsafe {
            zpool_vdev_online(zhp, path, flags.bits() as c_int, &mut new_state)
        })?;
        Ok(VdevState::from_raw(new_state))
    }

    fn offline(&mut self, device: &str, temporary: bool) -> BackendResult<()> {
        self.on_device(device, |zhp, path| unsafe {
            zpool_vdev_offline(zhp, path, boolean(temporary))
        })
    }

    fn clear(&mut self, device: Option<&str>) -> BackendResult<()> {
        match device {
            Some(device) => self.on_device(device, |zhp, path| unsafe {
                zpool_clear(zhp, path, ptr::null_mut())
            }),
            None => {
                let ret = unsafe { zpool_clear(self.zhp(), ptr::null(), ptr::null_mut()) };
                result(self.hdl, ret)
            }
        }
    }

    fn scan(&mut self, command: ScrubCommand) -> BackendResult<()> {
        let (func, cmd) = match command {
            ScrubCommand::Start => (POOL_SCAN_SCRUB, POOL_SCRUB_NORMAL),
            ScrubCommand::Pause => (POOL_SCAN_SCRUB, POOL_SCRUB_PAUSE),
            ScrubCommand::Stop => (POOL_SCAN_NONE, POOL_SCRUB_NORMAL),
        };
        let ret = unsafe { zpool_scan(self.zhp(), func, cmd) };
        result(self.hdl, ret)
    }
}

// ============================================================================
// Dataset handle
// ============================================================================

pub struct LibzfsDataset {
    handle: DatasetGuard,
    hdl: *mut libzfs_handle_t,
}

// SAFETY: dataset handles never leave the session that opened them
unsafe impl Send for LibzfsDataset {}

impl LibzfsDataset {
    fn zhp(&self) -> *mut zfs_handle_t {
        self.handle.0
    }

    fn iterate<F>(
        &self,
        visit: &mut dyn FnMut(LibzfsDataset) -> Visit, call: F,
    ) -> BackendResult<Visit>
    where
        F: FnOnce(*mut zfs_handle_t, *mut c_void) -> c_int,
    {
        let mut state = IterState {
            hdl: self.hdl,
            visit,
            aborted: false,
            panic: None,
        };
        let ret = call(
            self.zhp(),
            &mut state as *mut IterState<'_, LibzfsDataset> as *mut c_void,
        );
        state.finish(ret)
    }
}

impl DatasetObject for LibzfsDataset {
    fn name(&self) -> String {
        unsafe { owned_str(zfs_get_name(self.zhp())) }
    }

    fn guid(&self) -> u64 {
        match props::lookup(PropClass::Dataset, "guid") {
            Some(def) => unsafe { zfs_prop_get_int(self.zhp(), def.id) },
            None => 0,
        }
    }

    fn kind(&self) -> DatasetType {
        DatasetType::from_raw(unsafe { zfs_get_type(self.zhp()) })
            .unwrap_or(DatasetType::Filesystem)
    }

    fn get_prop(&self, prop: &PropDef, buf: &mut [u8]) -> BackendResult<PropSource> {
        let mut src: c_int = 0;
        let ret = unsafe {
            zfs_prop_get(
                self.zhp(),
                prop.id,
                buf.as_mut_ptr() as *mut c_char,
                buf.len(),
                &mut src,
                ptr::null_mut(),
                0,
                boolean(prop.literal()),
            )
        };
        if ret != 0 {
            return Err(BackendFailure::new(
                libc::ENOENT,
                format!("property '{}' unavailable", prop.name),
            ));
        }
        Ok(PropSource::from_raw(src))
    }

    fn set_prop(&mut self, name: &str, value: &str) -> BackendResult<()> {
        let c_name = cstring(name)?;
        let c_value = cstring(value)?;
        let ret = unsafe { zfs_prop_set(self.zhp(), c_name.as_ptr(), c_value.as_ptr()) };
        result(self.hdl, ret)
    }

    fn iter_children(&self, visit: &mut dyn FnMut(Self) -> Visit) -> BackendResult<Visit> {
        self.iterate(visit, |zhp, data| unsafe { zfs_iter_children(zhp, dataset_callback, data) })
    }

    fn iter_snapshots(&self, visit: &mut dyn FnMut(Self) -> Visit) -> BackendResult<Visit> {
        self.iterate(visit, |zhp, data| unsafe {
            zfs_iter_snapshots(zhp, B_FALSE, dataset_callback, data, 0, 0)
        })
    }

    fn destroy(self, defer: bool) -> BackendResult<()> {
        let ret = unsafe { zfs_destroy(self.zhp(), boolean(defer)) };
        result(self.hdl, ret)
    }

    fn clone_to(&self, target: &str, props: Option<&NvList>) -> BackendResult<()> {
        let c_target = cstring(target)?;
        let props = NativeNvlist::from_optional(props)?;
        let ret = unsafe { zfs_clone(self.zhp(), c_target.as_ptr(), optional_ptr(&props)) };
        result(self.hdl, ret)
    }

    fn promote(&mut self) -> BackendResult<()> {
        let ret = unsafe { zfs_promote(self.zhp()) };
        result(self.hdl, ret)
    }

    fn rollback(&mut self, snapshot: &Self, force: bool) -> BackendResult<()> {
        let ret = unsafe { zfs_rollback(self.zhp(), snapshot.zhp(), boolean(force)) };
        result(self.hdl, ret)
    }

    fn clones(&self) -> BackendResult<Option<NvList>> {
        if self.kind() != DatasetType::Snapshot {
            return Ok(None);
        }
        let nvl = unsafe { zfs_get_clones_nvl(self.zhp()) };
        unsafe { to_tree(nvl) }.map(Some)
    }
}
