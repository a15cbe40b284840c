// zfs_management/helpers.rs
// Name handling and argument validation shared by the driver operations

use crate::errors::{ErrorKind, Result, ZfsError};

/// ZFS_MAX_DATASET_NAME_LEN minus the terminating NUL
pub const MAX_NAME_LEN: usize = 255;

/// Extract pool name from a dataset/snapshot path
pub fn pool_of(name: &str) -> &str {
    let end = name.find(['/', '@']).unwrap_or(name.len());
    &name[..end]
}

/// Split `dataset@snap` on the last '@'
pub fn split_snapshot(name: &str) -> Option<(&str, &str)> {
    name.rsplit_once('@')
}

/// Sort key putting the deepest objects first
pub fn depth(name: &str) -> usize {
    name.matches('/').count() + name.matches('@').count()
}

/// True for `name` itself and everything below it
pub fn is_within(name: &str, root: &str) -> bool {
    name == root
        || name
            .strip_prefix(root)
            .is_some_and(|rest| rest.starts_with('/') || rest.starts_with('@'))
}

/// Reject names the backend would refuse before issuing any call
pub fn validate_name(op: &'static str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ZfsError::invalid(op, name, "name must not be empty"));
    }
    if name.contains('\0') {
        return Err(ZfsError::invalid(op, name, "name contains a null byte"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(ZfsError::new(
            op,
            ErrorKind::NameTooLong,
            format!("name exceeds {} bytes", MAX_NAME_LEN),
        )
        .with_resource(name)
        .with_errno(libc::ENAMETOOLONG));
    }
    Ok(())
}

/// A dataset or pool name: no '@'
pub fn validate_dataset_name(op: &'static str, name: &str) -> Result<()> {
    validate_name(op, name)?;
    if name.contains('@') {
        return Err(ZfsError::invalid(op, name, "expected a dataset, got a snapshot name"));
    }
    if name.starts_with('/') || name.ends_with('/') || name.contains("//") {
        return Err(ZfsError::invalid(op, name, "malformed dataset path"));
    }
    Ok(())
}

/// A snapshot name: `dataset@snap` with both halves present
pub fn validate_snapshot_name<'a>(op: &'static str, name: &'a str) -> Result<(&'a str, &'a str)> {
    validate_name(op, name)?;
    match split_snapshot(name) {
        Some((dataset, snap)) if !dataset.is_empty() && !snap.is_empty() => {
            if dataset.contains('@') {
                return Err(ZfsError::invalid(op, name, "snapshot name contains more than one '@'"));
            }
            Ok((dataset, snap))
        }
        _ => Err(ZfsError::invalid(
            op,
            name,
            "snapshot name must be of the form dataset@snapshot",
        )),
    }
}

/// Property names: lowercase native names, or user properties with a ':'
pub fn is_valid_property_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 256 {
        return false;
    }
    let user = name.contains(':');
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| {
        c.is_ascii_lowercase()
            || c.is_ascii_digit()
            || c == '_'
            || c == ':'
            || (user && (c == '.' || c == '-'))
    })
}

/// Device paths handed to vdev operations must be absolute and plain
pub fn validate_device_path(op: &'static str, path: &str) -> Result<()> {
    if !path.starts_with('/') {
        return Err(ZfsError::invalid(op, path, "device path must be absolute"));
    }
    if path.contains(['\0', ';', '&', '|']) {
        return Err(ZfsError::invalid(op, path, "device path contains forbidden characters"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{is_invalid_argument, is_name_too_long};

    /// Test: pool name is everything before the first separator
    #[test]
    fn test_pool_of() {
        assert_eq!(pool_of("tank"), "tank");
        assert_eq!(pool_of("tank/data/child"), "tank");
        assert_eq!(pool_of("tank@snap"), "tank");
    }

    /// Test: snapshot parent is split on the last '@'
    #[test]
    fn test_split_snapshot() {
        assert_eq!(split_snapshot("tank/data@snap1"), Some(("tank/data", "snap1")));
        assert_eq!(split_snapshot("tank/data"), None);
    }

    /// Test: subtree membership does not match sibling prefixes
    #[test]
    fn test_is_within() {
        assert!(is_within("tank/data", "tank/data"));
        assert!(is_within("tank/data/child", "tank/data"));
        assert!(is_within("tank/data@s1", "tank/data"));
        assert!(!is_within("tank/database", "tank/data"));
    }

    /// Test: overlong names fail with NameTooLong
    #[test]
    fn test_validate_name_too_long() {
        let name = format!("tank/{}", "x".repeat(MAX_NAME_LEN));
        let err = validate_name("create_dataset", &name).unwrap_err();
        assert!(is_name_too_long(&err));
    }

    /// Test: snapshot names need both halves
    #[test]
    fn test_validate_snapshot_name() {
        assert_eq!(
            validate_snapshot_name("create_snapshot", "tank/a@s").unwrap(),
            ("tank/a", "s")
        );
        assert!(is_invalid_argument(
            &validate_snapshot_name("create_snapshot", "tank/a").unwrap_err()
        ));
        assert!(is_invalid_argument(
            &validate_snapshot_name("create_snapshot", "tank/a@").unwrap_err()
        ));
    }

    /// Test: property name rules
    #[test]
    fn test_is_valid_property_name() {
        assert!(is_valid_property_name("compression"));
        assert!(is_valid_property_name("com.example:backup-policy"));
        assert!(!is_valid_property_name("Compression"));
        assert!(!is_valid_property_name("quota;rm"));
        assert!(!is_valid_property_name(""));
    }

    /// Test: device paths must be absolute and free of shell metacharacters
    #[test]
    fn test_validate_device_path() {
        assert!(validate_device_path("add_vdev", "/dev/da0").is_ok());
        assert!(validate_device_path("add_vdev", "da0").is_err());
        assert!(validate_device_path("add_vdev", "/dev/da0;reboot").is_err());
    }
}
