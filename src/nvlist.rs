// nvlist.rs
// Attribute tree: owned, ordered name/value lists exchanged with the backend

use crate::errors::{op, ErrorKind, Result, ZfsError};

// ============================================================================
// Values
// ============================================================================

/// Value stored under a key
#[derive(Debug, Clone, PartialEq)]
pub enum NvValue {
    String(String),
    Uint64(u64),
    Uint64Array(Vec<u64>),
    Boolean(bool),
    List(NvList),
    ListArray(Vec<NvList>),
}

impl NvValue {
    fn type_name(&self) -> &'static str {
        match self {
            NvValue::String(_) => "string",
            NvValue::Uint64(_) => "uint64",
            NvValue::Uint64Array(_) => "uint64 array",
            NvValue::Boolean(_) => "boolean",
            NvValue::List(_) => "nvlist",
            NvValue::ListArray(_) => "nvlist array",
        }
    }
}

// ============================================================================
// Tree
// ============================================================================

/// Ordered key/value tree with unique keys.
///
/// Children are moved in when attached, so a tree owns its whole subtree and
/// releases it exactly once when dropped. Insertion order is kept only so that
/// conversions and debug output are reproducible.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NvList {
    pairs: Vec<(String, NvValue)>,
}

impl NvList {
    pub fn new() -> Self {
        NvList { pairs: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &NvValue)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn get(&self, key: &str) -> Option<&NvValue> {
        self.pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Insert a value; a key that is already present is a construction error
    pub fn add(&mut self, key: &str, value: NvValue) -> Result<()> {
        if key.is_empty() || key.contains('\0') {
            return Err(ZfsError::invalid(op::NVLIST, key, "invalid attribute name"));
        }
        if self.contains_key(key) {
            return Err(ZfsError::new(
                op::NVLIST,
                ErrorKind::InvalidArgument,
                format!("duplicate attribute '{}'", key),
            )
            .with_resource(key)
            .with_errno(libc::EINVAL));
        }
        self.pairs.push((key.to_string(), value));
        Ok(())
    }

    pub fn add_string(&mut self, key: &str, value: impl Into<String>) -> Result<()> {
        self.add(key, NvValue::String(value.into()))
    }

    pub fn add_uint64(&mut self, key: &str, value: u64) -> Result<()> {
        self.add(key, NvValue::Uint64(value))
    }

    pub fn add_uint64_array(&mut self, key: &str, value: Vec<u64>) -> Result<()> {
        self.add(key, NvValue::Uint64Array(value))
    }

    pub fn add_boolean(&mut self, key: &str, value: bool) -> Result<()> {
        self.add(key, NvValue::Boolean(value))
    }

    pub fn add_list(&mut self, key: &str, child: NvList) -> Result<()> {
        self.add(key, NvValue::List(child))
    }

    pub fn add_list_array(&mut self, key: &str, children: Vec<NvList>) -> Result<()> {
        self.add(key, NvValue::ListArray(children))
    }

    /// Remove a key, handing its value back to the caller
    pub fn remove(&mut self, key: &str) -> Option<NvValue> {
        let index = self.pairs.iter().position(|(k, _)| k == key)?;
        Some(self.pairs.remove(index).1)
    }

    fn lookup(&self, key: &str) -> Result<&NvValue> {
        self.get(key).ok_or_else(|| {
            ZfsError::new(
                op::NVLIST,
                ErrorKind::NotFound,
                format!("attribute '{}' not present", key),
            )
            .with_resource(key)
            .with_errno(libc::ENOENT)
        })
    }

    fn mismatch(key: &str, wanted: &str, found: &NvValue) -> ZfsError {
        ZfsError::invalid(
            op::NVLIST,
            key,
            format!("attribute is {}, not {}", found.type_name(), wanted),
        )
    }

    pub fn lookup_string(&self, key: &str) -> Result<&str> {
        match self.lookup(key)? {
            NvValue::String(s) => Ok(s),
            other => Err(Self::mismatch(key, "string", other)),
        }
    }

    pub fn lookup_uint64(&self, key: &str) -> Result<u64> {
        match self.lookup(key)? {
            NvValue::Uint64(v) => Ok(*v),
            other => Err(Self::mismatch(key, "uint64", other)),
        }
    }

    pub fn lookup_uint64_array(&self, key: &str) -> Result<&[u64]> {
        match self.lookup(key)? {
            NvValue::Uint64Array(v) => Ok(v),
            other => Err(Self::mismatch(key, "uint64 array", other)),
        }
    }

    pub fn lookup_boolean(&self, key: &str) -> Result<bool> {
        match self.lookup(key)? {
            NvValue::Boolean(v) => Ok(*v),
            other => Err(Self::mismatch(key, "boolean", other)),
        }
    }

    pub fn lookup_list(&self, key: &str) -> Result<&NvList> {
        match self.lookup(key)? {
            NvValue::List(v) => Ok(v),
            other => Err(Self::mismatch(key, "nvlist", other)),
        }
    }

    pub fn lookup_list_array(&self, key: &str) -> Result<&[NvList]> {
        match self.lookup(key)? {
            NvValue::ListArray(v) => Ok(v),
            other => Err(Self::mismatch(key, "nvlist array", other)),
        }
    }

    pub(crate) fn lookup_list_array_mut(&mut self, key: &str) -> Option<&mut Vec<NvList>> {
        self.pairs.iter_mut().find_map(|(k, v)| match v {
            NvValue::ListArray(children) if k == key => Some(children),
            _ => None,
        })
    }

    /// Build a flat string list, e.g. from user supplied properties
    pub fn from_strings<'a, I>(pairs: I) -> Result<NvList>
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        let mut nvl = NvList::new();
        for (key, value) in pairs {
            nvl.add_string(key, value.as_str())?;
        }
        Ok(nvl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{is_invalid_argument, is_not_found};

    /// Test: scalar values come back out under their key
    #[test]
    fn test_scalar_roundtrip() {
        let mut nvl = NvList::new();
        nvl.add_string("type", "disk").unwrap();
        nvl.add_uint64("nparity", 2).unwrap();
        nvl.add_boolean("is_log", true).unwrap();

        assert_eq!(nvl.lookup_string("type").unwrap(), "disk");
        assert_eq!(nvl.lookup_uint64("nparity").unwrap(), 2);
        assert!(nvl.lookup_boolean("is_log").unwrap());
        assert_eq!(nvl.len(), 3);
    }

    /// Test: duplicate keys are rejected and the first value survives
    #[test]
    fn test_duplicate_key_rejected() {
        let mut nvl = NvList::new();
        nvl.add_string("path", "/dev/da0").unwrap();
        let err = nvl.add_string("path", "/dev/da1").unwrap_err();

        assert!(is_invalid_argument(&err));
        assert_eq!(nvl.lookup_string("path").unwrap(), "/dev/da0");
    }

    /// Test: missing keys and wrong types are distinguishable
    #[test]
    fn test_lookup_errors() {
        let mut nvl = NvList::new();
        nvl.add_uint64("guid", 42).unwrap();

        assert!(is_not_found(&nvl.lookup_string("name").unwrap_err()));
        assert!(is_invalid_argument(&nvl.lookup_string("guid").unwrap_err()));
    }

    /// Test: attached children are owned by the parent
    #[test]
    fn test_nested_children() {
        let mut leaf = NvList::new();
        leaf.add_string("type", "disk").unwrap();
        leaf.add_string("path", "/dev/da0").unwrap();

        let mut root = NvList::new();
        root.add_string("type", "root").unwrap();
        root.add_list_array("children", vec![leaf.clone(), leaf]).unwrap();

        let children = root.lookup_list_array("children").unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[1].lookup_string("path").unwrap(), "/dev/da0");
    }

    /// Test: remove hands back the value and frees the key
    #[test]
    fn test_remove_then_readd() {
        let mut nvl = NvList::new();
        nvl.add_string("comment", "old").unwrap();
        assert_eq!(
            nvl.remove("comment"),
            Some(NvValue::String("old".to_string()))
        );
        nvl.add_string("comment", "new").unwrap();
        assert_eq!(nvl.lookup_string("comment").unwrap(), "new");
    }
}
