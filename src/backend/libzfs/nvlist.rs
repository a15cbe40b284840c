// backend/libzfs/nvlist.rs
// Conversion between owned attribute trees and native nvlists

use super::ffi::*;
use crate::backend::BackendResult;
use crate::errors::BackendFailure;
use crate::nvlist::{NvList, NvValue};
use nvpair_sys::{
    nvlist_add_nvlist_array, nvlist_add_string, nvlist_add_uint64, nvlist_alloc, nvlist_free,
    nvlist_t, NV_UNIQUE_NAME,
};
use std::ffi::{c_char, c_uint, CStr, CString};
use std::ptr;

/// Native nvlist owned by Rust; freed with nvlist_free() on drop
pub struct NativeNvlist(*mut nvlist_t);

fn cstring(value: &str) -> BackendResult<CString> {
    CString::new(value)
        .map_err(|_| BackendFailure::new(libc::EINVAL, format!("'{}' contains a null byte", value)))
}

fn check(ret: i32, what: &str, key: &str) -> BackendResult<()> {
    if ret == 0 {
        Ok(())
    } else {
        Err(BackendFailure::new(ret, format!("failed to {} '{}'", what, key)))
    }
}

impl NativeNvlist {
    pub fn new() -> BackendResult<Self> {
        let mut nvl: *mut nvlist_t = ptr::null_mut();
        let ret = unsafe { nvlist_alloc(&mut nvl, NV_UNIQUE_NAME, 0) };
        if ret != 0 || nvl.is_null() {
            return Err(BackendFailure::new(
                libc::ENOMEM,
                format!("failed to allocate nvlist: errno {}", ret),
            ));
        }
        Ok(NativeNvlist(nvl))
    }

    pub fn as_ptr(&self) -> *mut nvlist_t {
        self.0
    }

    /// Build a native copy of `tree`; nested lists are copied by the add calls
    pub fn from_tree(tree: &NvList) -> BackendResult<Self> {
        let nvl = NativeNvlist::new()?;
        for (key, value) in tree.iter() {
            let c_key = cstring(key)?;
            let ret = unsafe {
                match value {
                    NvValue::String(s) => {
                        let c_value = cstring(s)?;
                        nvlist_add_string(nvl.0, c_key.as_ptr(), c_value.as_ptr())
                    }
                    NvValue::Uint64(v) => nvlist_add_uint64(nvl.0, c_key.as_ptr(), *v),
                    NvValue::Uint64Array(values) => nvlist_add_uint64_array(
                        nvl.0,
                        c_key.as_ptr(),
                        values.as_ptr(),
                        values.len() as c_uint,
                    ),
                    NvValue::Boolean(b) => {
                        nvlist_add_boolean_value(nvl.0, c_key.as_ptr(), boolean(*b))
                    }
                    NvValue::List(child) => {
                        let child = NativeNvlist::from_tree(child)?;
                        nvlist_add_nvlist(nvl.0, c_key.as_ptr(), child.0)
                    }
                    NvValue::ListArray(children) => {
                        let owned = children
                            .iter()
                            .map(NativeNvlist::from_tree)
                            .collect::<BackendResult<Vec<_>>>()?;
                        let mut raw: Vec<*mut nvlist_t> = owned.iter().map(|c| c.0).collect();
                        nvlist_add_nvlist_array(
                            nvl.0,
                            c_key.as_ptr(),
                            raw.as_mut_ptr(),
                            raw.len() as u32,
                        )
                    }
                }
            };
            check(ret, "add attribute", key)?;
        }
        Ok(nvl)
    }

    pub fn from_optional(tree: Option<&NvList>) -> BackendResult<Option<Self>> {
        tree.map(NativeNvlist::from_tree).transpose()
    }
}

impl Drop for NativeNvlist {
    fn drop(&mut self) {
        unsafe { nvlist_free(self.0) }
    }
}

/// Pointer for an optional list, NULL when absent
pub fn optional_ptr(nvl: &Option<NativeNvlist>) -> *mut nvlist_t {
    nvl.as_ref().map_or(ptr::null_mut(), NativeNvlist::as_ptr)
}

unsafe fn name_of(pair: *mut nvpair_t) -> String {
    let name: *const c_char = nvpair_name(pair);
    if name.is_null() {
        String::new()
    } else {
        CStr::from_ptr(name).to_string_lossy().into_owned()
    }
}

/// Copy a native nvlist into an owned tree without taking ownership of it.
///
/// Pair types with no counterpart in [`NvValue`] are skipped.
///
/// # Safety
/// `nvl` must be a valid nvlist for the duration of the call.
pub unsafe fn to_tree(nvl: *mut nvlist_t) -> BackendResult<NvList> {
    let mut tree = NvList::new();
    if nvl.is_null() {
        return Ok(tree);
    }
    let mut pair = nvlist_next_nvpair(nvl, ptr::null_mut());
    while !pair.is_null() {
        let key = name_of(pair);
        let value = match nvpair_type(pair) {
            DATA_TYPE_BOOLEAN => Some(NvValue::Boolean(true)),
            DATA_TYPE_BOOLEAN_VALUE => {
                let mut v = B_FALSE;
                check(nvpair_value_boolean_value(pair, &mut v), "read boolean", &key)?;
                Some(NvValue::Boolean(v != B_FALSE))
            }
            DATA_TYPE_UINT64 => {
                let mut v = 0u64;
                check(nvpair_value_uint64(pair, &mut v), "read uint64", &key)?;
                Some(NvValue::Uint64(v))
            }
            DATA_TYPE_STRING => {
                let mut s: *const c_char = ptr::null();
                check(nvpair_value_string(pair, &mut s), "read string", &key)?;
                let text = if s.is_null() {
                    String::new()
                } else {
                    CStr::from_ptr(s).to_string_lossy().into_owned()
                };
                Some(NvValue::String(text))
            }
            DATA_TYPE_UINT64_ARRAY => {
                let mut values: *mut u64 = ptr::null_mut();
                let mut count: c_uint = 0;
                check(
                    nvpair_value_uint64_array(pair, &mut values, &mut count),
                    "read uint64 array",
                    &key,
                )?;
                let slice = if values.is_null() {
                    &[][..]
                } else {
                    std::slice::from_raw_parts(values, count as usize)
                };
                Some(NvValue::Uint64Array(slice.to_vec()))
            }
            DATA_TYPE_NVLIST => {
                let mut child: *mut nvlist_t = ptr::null_mut();
                check(nvpair_value_nvlist(pair, &mut child), "read nvlist", &key)?;
                Some(NvValue::List(to_tree(child)?))
            }
            DATA_TYPE_NVLIST_ARRAY => {
                let mut children: *mut *mut nvlist_t = ptr::null_mut();
                let mut count: c_uint = 0;
                check(
                    nvpair_value_nvlist_array(pair, &mut children, &mut count),
                    "read nvlist array",
                    &key,
                )?;
                let mut out = Vec::with_capacity(count as usize);
                for i in 0..count as usize {
                    out.push(to_tree(*children.add(i))?);
                }
                Some(NvValue::ListArray(out))
            }
            other => {
                tracing::trace!(attribute = %key, data_type = other, "skipping nvpair");
                None
            }
        };
        if let Some(value) = value {
            tree.add(&key, value)
                .map_err(|e| BackendFailure::new(libc::EINVAL, e.to_string()))?;
        }
        pair = nvlist_next_nvpair(nvl, pair);
    }
    Ok(tree)
}
