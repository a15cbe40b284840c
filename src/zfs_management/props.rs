// zfs_management/props.rs
// Property tables (name -> backend id) and value retrieval with source

use super::types::{PropSource, PropValue, PropertyInfo};
use crate::errors::BackendFailure;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Fixed retrieval buffer, matching ZFS_MAXPROPLEN usage in libzfs callers
pub const PROPERTY_BUFFER_SIZE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropClass {
    Pool,
    Dataset,
}

/// How a raw value is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropKind {
    String,
    /// Fetched in literal form, returned as an integer when it parses
    Number,
    /// on/off, yes/no
    Boolean,
}

/// One entry of a property table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropDef {
    pub name: &'static str,
    /// zfs_prop_t / zpool_prop_t
    pub id: i32,
    pub kind: PropKind,
}

impl PropDef {
    /// Literal (machine readable) form is requested for numbers
    pub fn literal(&self) -> bool {
        self.kind == PropKind::Number
    }

    /// Interpret the raw text the backend wrote
    pub fn decode(&self, raw: &str) -> PropValue {
        match self.kind {
            PropKind::Number => match raw.parse::<u64>() {
                Ok(v) => PropValue::Uint64(v),
                Err(_) => PropValue::String(raw.to_string()),
            },
            PropKind::Boolean => match raw {
                "on" | "yes" => PropValue::Bool(true),
                "off" | "no" => PropValue::Bool(false),
                _ => PropValue::String(raw.to_string()),
            },
            PropKind::String => PropValue::String(raw.to_string()),
        }
    }
}

const fn def(name: &'static str, id: i32, kind: PropKind) -> PropDef {
    PropDef { name, id, kind }
}

use PropKind::{Boolean as B, Number as N, String as S};

// ============================================================================
// Tables
// ============================================================================

/// zfs_prop_t. Reference: /usr/include/libzfs/sys/fs/zfs.h
const DATASET_PROPS: &[PropDef] = &[
    def("type", 0, S),
    def("creation", 1, N),
    def("used", 2, N),
    def("available", 3, N),
    def("referenced", 4, N),
    def("compressratio", 5, S),
    def("mounted", 6, B),
    def("origin", 7, S),
    def("quota", 8, N),
    def("reservation", 9, N),
    def("volsize", 10, N),
    def("volblocksize", 11, N),
    def("recordsize", 12, N),
    def("mountpoint", 13, S),
    def("sharenfs", 14, S),
    def("checksum", 15, S),
    def("compression", 16, S),
    def("atime", 17, B),
    def("devices", 18, B),
    def("exec", 19, B),
    def("setuid", 20, B),
    def("readonly", 21, B),
    def("zoned", 22, B),
    def("snapdir", 23, S),
    def("aclmode", 24, S),
    def("aclinherit", 25, S),
    def("createtxg", 26, N),
    def("name", 27, S),
    def("canmount", 28, S),
    def("xattr", 30, S),
    def("numclones", 31, N),
    def("copies", 32, N),
    def("version", 33, N),
    def("utf8only", 34, B),
    def("normalization", 35, S),
    def("casesensitivity", 36, S),
    def("vscan", 37, B),
    def("nbmand", 38, B),
    def("sharesmb", 39, S),
    def("refquota", 40, N),
    def("refreservation", 41, N),
    def("guid", 42, N),
    def("primarycache", 43, S),
    def("secondarycache", 44, S),
    def("usedbysnapshots", 45, N),
    def("usedbydataset", 46, N),
    def("usedbychildren", 47, N),
    def("usedbyrefreservation", 48, N),
    def("defer_destroy", 51, B),
    def("userrefs", 52, N),
    def("logbias", 53, S),
    def("dedup", 56, S),
    def("mlslabel", 57, S),
    def("sync", 58, S),
    def("dnodesize", 59, S),
    def("refcompressratio", 60, S),
    def("written", 61, N),
    def("clones", 62, S),
    def("logicalused", 63, N),
    def("logicalreferenced", 64, N),
    def("volmode", 66, S),
    def("snapdev", 71, S),
    def("acltype", 72, S),
];

/// Short names accepted on input
const DATASET_ALIASES: &[(&str, &str)] = &[
    ("avail", "available"),
    ("refer", "referenced"),
    ("usedsnap", "usedbysnapshots"),
    ("usedds", "usedbydataset"),
    ("usedchild", "usedbychildren"),
    ("usedrefreserv", "usedbyrefreservation"),
    ("lused", "logicalused"),
    ("lrefer", "logicalreferenced"),
    ("normalize", "normalization"),
];

/// zpool_prop_t
const POOL_PROPS: &[PropDef] = &[
    def("name", 0, S),
    def("size", 1, N),
    def("capacity", 2, N),
    def("altroot", 3, S),
    def("health", 4, S),
    def("guid", 5, N),
    def("version", 6, S),
    def("bootfs", 7, S),
    def("delegation", 8, B),
    def("autoreplace", 9, B),
    def("cachefile", 10, S),
    def("failmode", 11, S),
    def("listsnapshots", 12, B),
    def("autoexpand", 13, B),
    def("dedupratio", 15, S),
    def("free", 16, N),
    def("allocated", 17, N),
    def("readonly", 18, B),
    def("ashift", 19, N),
    def("comment", 20, S),
    def("expandsize", 21, N),
    def("freeing", 22, N),
    def("fragmentation", 23, N),
    def("leaked", 24, N),
    def("maxblocksize", 25, N),
    def("multihost", 28, B),
    def("checkpoint", 29, N),
    def("autotrim", 31, B),
];

const POOL_ALIASES: &[(&str, &str)] = &[
    ("cap", "capacity"),
    ("alloc", "allocated"),
    ("frag", "fragmentation"),
    ("listsnaps", "listsnapshots"),
    ("expandsz", "expandsize"),
];

struct Table {
    defs: &'static [PropDef],
    by_name: HashMap<&'static str, &'static PropDef>,
}

impl Table {
    fn build(defs: &'static [PropDef], aliases: &[(&'static str, &'static str)]) -> Table {
        let mut by_name: HashMap<&'static str, &'static PropDef> =
            defs.iter().map(|d| (d.name, d)).collect();
        for &(alias, target) in aliases {
            if let Some(d) = by_name.get(target).copied() {
                by_name.insert(alias, d);
            }
        }
        Table { defs, by_name }
    }
}

fn table(class: PropClass) -> &'static Table {
    static POOL: OnceLock<Table> = OnceLock::new();
    static DATASET: OnceLock<Table> = OnceLock::new();
    match class {
        PropClass::Pool => POOL.get_or_init(|| Table::build(POOL_PROPS, POOL_ALIASES)),
        PropClass::Dataset => DATASET.get_or_init(|| Table::build(DATASET_PROPS, DATASET_ALIASES)),
    }
}

/// Resolve a property (or alias) name for an object class
pub fn lookup(class: PropClass, name: &str) -> Option<&'static PropDef> {
    table(class).by_name.get(name).copied()
}

/// Every known property of a class, in table order
pub fn known(class: PropClass) -> &'static [PropDef] {
    table(class).defs
}

// ============================================================================
// Retrieval
// ============================================================================

/// Decode a NUL terminated buffer
pub fn buffer_str(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

/// Fetch the requested properties through `fetch`.
///
/// An empty request means every known property of the class. Unknown names are
/// skipped. A property the backend fails to produce is skipped and logged; the
/// result holds whatever succeeded, keyed by the name the caller used.
pub fn get_properties<F>(
    class: PropClass,
    object: &str,
    names: &[&str],
    mut fetch: F,
) -> HashMap<String, PropertyInfo>
where
    F: FnMut(&PropDef, &mut [u8]) -> Result<PropSource, BackendFailure>,
{
    let requested: Vec<(&str, &'static PropDef)> = if names.is_empty() {
        known(class).iter().map(|d| (d.name, d)).collect()
    } else {
        names
            .iter()
            .filter_map(|name| match lookup(class, name) {
                Some(d) => Some((*name, d)),
                None => {
                    tracing::trace!(object, property = name, "skipping unknown property");
                    None
                }
            })
            .collect()
    };

    let mut buf = vec![0u8; PROPERTY_BUFFER_SIZE];
    let mut result = HashMap::with_capacity(requested.len());
    for (name, d) in requested {
        buf.fill(0);
        match fetch(d, &mut buf) {
            Ok(source) => {
                let raw = buffer_str(&buf);
                result.insert(
                    name.to_string(),
                    PropertyInfo {
                        name: name.to_string(),
                        value: d.decode(&raw),
                        source,
                    },
                );
            }
            Err(failure) => {
                tracing::debug!(
                    object,
                    property = name,
                    code = failure.code,
                    "property unavailable: {}",
                    failure.description
                );
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fill_buffer;

    /// Test: aliases resolve to the same id as the full name
    #[test]
    fn test_aliases_resolve() {
        let avail = lookup(PropClass::Dataset, "avail").unwrap();
        assert_eq!(avail.id, 3);
        assert_eq!(avail.name, "available");
        assert_eq!(lookup(PropClass::Dataset, "refer").unwrap().id, 4);
        assert_eq!(lookup(PropClass::Pool, "alloc").unwrap().id, 17);
    }

    /// Test: pool and dataset tables are separate
    #[test]
    fn test_classes_are_disjoint() {
        assert!(lookup(PropClass::Pool, "health").is_some());
        assert!(lookup(PropClass::Dataset, "health").is_none());
        assert!(lookup(PropClass::Pool, "mountpoint").is_none());
        assert_eq!(lookup(PropClass::Pool, "guid").unwrap().id, 5);
        assert_eq!(lookup(PropClass::Dataset, "guid").unwrap().id, 42);
    }

    /// Test: decoding follows the property kind
    #[test]
    fn test_decode_by_kind() {
        let used = lookup(PropClass::Dataset, "used").unwrap();
        assert_eq!(used.decode("1024"), PropValue::Uint64(1024));
        assert_eq!(used.decode("10G"), PropValue::String("10G".to_string()));
        let atime = lookup(PropClass::Dataset, "atime").unwrap();
        assert_eq!(atime.decode("off"), PropValue::Bool(false));
        assert!(used.literal());
        assert!(!atime.literal());
    }

    /// Test: unknown names are skipped and failures drop only that property
    #[test]
    fn test_partial_projection() {
        let props = get_properties(
            PropClass::Dataset,
            "tank/data",
            &["used", "mountpoint", "bogus", "refer"],
            |d, buf| match d.name {
                "used" => fill_buffer(buf, "10G").map(|_| PropSource::Default),
                "referenced" => fill_buffer(buf, "4096").map(|_| PropSource::Default),
                _ => Err(BackendFailure::new(libc::ENOENT, "no value")),
            },
        );
        assert_eq!(props.len(), 2);
        assert_eq!(props["used"].value, PropValue::String("10G".to_string()));
        assert_eq!(props["refer"].value, PropValue::Uint64(4096));
        assert!(!props.contains_key("mountpoint"));
    }

    /// Test: an empty request asks for the whole table
    #[test]
    fn test_empty_request_means_all() {
        let mut asked = 0;
        let props = get_properties(PropClass::Pool, "tank", &[], |_, buf| {
            asked += 1;
            fill_buffer(buf, "x").map(|_| PropSource::Default)
        });
        assert_eq!(asked, known(PropClass::Pool).len());
        assert_eq!(props.len(), known(PropClass::Pool).len());
    }

    /// Test: values too long for the buffer are a per-property failure
    #[test]
    fn test_oversized_value_is_skipped() {
        let long = "x".repeat(PROPERTY_BUFFER_SIZE);
        let props = get_properties(PropClass::Dataset, "tank", &["mountpoint"], |_, buf| {
            fill_buffer(buf, &long).map(|_| PropSource::Local)
        });
        assert!(props.is_empty());
    }
}
