// zfs_management/features.rs
// Capability queries: pool features, compression algorithms, backend version

use super::driver::ZfsDriver;
use crate::backend::Backend;
use crate::errors::{op, Result};
use tracing::{debug, warn};

/// Reported when the backend cannot name its own version
pub const FALLBACK_VERSION: &str = "OpenZFS 2.1+";

/// Pool features assumed present on any supported OpenZFS release.
///
/// Conservative defaults, not detected per pool. Names outside this list
/// (draid included) report unsupported.
pub const AVAILABLE_FEATURES: &[&str] = &[
    "async_destroy",
    "empty_bpobj",
    "lz4_compress",
    "multi_vdev_crash_dump",
    "spacemap_v2",
    "enabled_txg",
    "hole_birth",
    "extensible_dataset",
    "embedded_data",
    "bookmarks",
    "filesystem_limits",
    "large_blocks",
    "large_dnode",
    "sha512",
    "skein",
    "edonr",
    "device_removal",
    "obsolete_counts",
    "zpool_checkpoint",
    "spacemap_histogram",
    "allocation_classes",
    "resilver_defer",
    "bookmark_v2",
    "redaction_bookmarks",
    "redacted_datasets",
    "bookmark_written",
    "log_spacemap",
    "livelist",
    "redaction_list_spill",
    "zstd_compress",
    "encryption",
];

const BASE_COMPRESSION: &[&str] = &["off", "on", "lzjb", "gzip", "zle", "lz4"];

fn is_available(name: &str) -> bool {
    AVAILABLE_FEATURES.contains(&name)
}

/// Compression values accepted by the `compression` property
pub fn compression_algorithms() -> Vec<String> {
    let mut algorithms: Vec<String> = BASE_COMPRESSION.iter().map(|s| s.to_string()).collect();
    algorithms.extend((1..=9).map(|level| format!("gzip-{}", level)));
    if is_available("zstd_compress") {
        algorithms.push("zstd".to_string());
        algorithms.extend((1..=19).map(|level| format!("zstd-{}", level)));
        algorithms.extend((1..=10).map(|level| format!("zstd-fast-{}", level)));
    }
    algorithms
}

impl<B: Backend> ZfsDriver<B> {
    /// True exactly for names in [`AVAILABLE_FEATURES`]; unknown names are
    /// reported unsupported, not as errors
    pub fn supports_feature(&self, name: &str) -> Result<bool> {
        self.with_backend(op::SUPPORTS_FEATURE, |_| Ok(is_available(name)))
    }

    pub fn list_available_features(&self) -> Result<Vec<String>> {
        self.with_backend(op::LIST_FEATURES, |_| {
            Ok(AVAILABLE_FEATURES.iter().map(|s| s.to_string()).collect())
        })
    }

    pub fn list_supported_compression(&self) -> Result<Vec<String>> {
        self.with_backend(op::LIST_COMPRESSION, |_| Ok(compression_algorithms()))
    }

    /// Version string from the backend, or [`FALLBACK_VERSION`] when it has none
    pub fn backend_version(&self) -> Result<String> {
        self.with_backend(op::BACKEND_VERSION, |backend| {
            debug!(
                op = op::BACKEND_VERSION,
                backend = backend.implementation(),
                "querying version"
            );
            match backend.version() {
                Ok(version) if !version.trim().is_empty() => Ok(version),
                Ok(_) => Ok(FALLBACK_VERSION.to_string()),
                Err(failure) => {
                    warn!(
                        backend = backend.implementation(),
                        code = failure.code,
                        "version unavailable, reporting {}: {}",
                        FALLBACK_VERSION,
                        failure.description
                    );
                    Ok(FALLBACK_VERSION.to_string())
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test: compression list covers gzip and zstd levels
    #[test]
    fn test_compression_levels() {
        let algorithms = compression_algorithms();
        assert!(algorithms.contains(&"gzip-9".to_string()));
        assert!(algorithms.contains(&"zstd-19".to_string()));
        assert!(algorithms.contains(&"zstd-fast-10".to_string()));
        assert!(!algorithms.contains(&"zstd-20".to_string()));
        assert_eq!(algorithms.len(), 6 + 9 + 1 + 19 + 10);
    }

    /// Test: unknown and unlisted features are unsupported
    #[test]
    fn test_feature_membership() {
        assert!(is_available("encryption"));
        assert!(!is_available("draid"));
        assert!(!is_available("no_such_feature"));
    }
}
