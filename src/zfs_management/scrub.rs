// zfs_management/scrub.rs
// Scrub operations: start, pause, stop, status

use super::driver::{open_pool, ZfsDriver};
use super::helpers::validate_dataset_name;
use super::pools::pool_health;
use super::types::{ScanFunction, ScanState, ScrubCommand, ScrubStatus};
use crate::backend::{Backend, PoolObject};
use crate::errors::{op, Result, ZfsError};
use crate::nvlist::NvList;
use tracing::{debug, info};

const ZPOOL_CONFIG_VDEV_TREE: &str = "vdev_tree";
const ZPOOL_CONFIG_SCAN_STATS: &str = "scan_stats";

/// pool_scan_stat_t array from a pool configuration tree.
///
/// scan_stats lives inside vdev_tree; older configurations carry it at the top.
pub(crate) fn scan_stats(config: &NvList) -> Option<&[u64]> {
    config
        .lookup_list(ZPOOL_CONFIG_VDEV_TREE)
        .and_then(|tree| tree.lookup_uint64_array(ZPOOL_CONFIG_SCAN_STATS))
        .or_else(|_| config.lookup_uint64_array(ZPOOL_CONFIG_SCAN_STATS))
        .ok()
        .filter(|stats| !stats.is_empty())
}

impl<B: Backend> ZfsDriver<B> {
    fn scan(&self, op: &'static str, pool: &str, command: ScrubCommand) -> Result<()> {
        validate_dataset_name(op, pool)?;
        self.with_backend(op, |backend| {
            let mut handle = open_pool(backend, op, pool)?;
            debug!(op, pool, command = ?command, "issuing scan command");
            handle
                .scan(command)
                .map_err(|f| ZfsError::from_backend(op, pool, f))?;
            info!(pool, command = ?command, "scan command accepted");
            Ok(())
        })
    }

    /// Start a scrub, or resume a paused one
    pub fn start_scrub(&self, pool: &str) -> Result<()> {
        self.scan(op::START_SCRUB, pool, ScrubCommand::Start)
    }

    pub fn pause_scrub(&self, pool: &str) -> Result<()> {
        self.scan(op::PAUSE_SCRUB, pool, ScrubCommand::Pause)
    }

    pub fn stop_scrub(&self, pool: &str) -> Result<()> {
        self.scan(op::STOP_SCRUB, pool, ScrubCommand::Stop)
    }

    /// Scan progress from the pool configuration; a pool never scanned
    /// reports state None with no figures
    pub fn scrub_status(&self, pool: &str) -> Result<ScrubStatus> {
        validate_dataset_name(op::SCRUB_STATUS, pool)?;
        self.with_backend(op::SCRUB_STATUS, |backend| {
            let handle = open_pool(backend, op::SCRUB_STATUS, pool)?;
            let health = pool_health(&handle);
            debug!(op = op::SCRUB_STATUS, pool, "reading pool configuration");
            let config = handle
                .config()
                .map_err(|f| ZfsError::from_backend(op::SCRUB_STATUS, pool, f))?;

            // Indices: 0=func, 1=state, 2=start_time, 3=end_time, 4=to_examine,
            //          5=examined, 6=skipped, 7=processed, 8=errors
            let status = match scan_stats(&config) {
                Some(stats) => ScrubStatus {
                    pool: pool.to_string(),
                    health,
                    state: ScanState::from_raw(stats.get(1).copied()),
                    function: ScanFunction::from_raw(stats.first().copied()),
                    start_time: stats.get(2).copied(),
                    end_time: stats.get(3).copied(),
                    to_examine: stats.get(4).copied(),
                    examined: stats.get(5).copied(),
                    errors: stats.get(8).copied(),
                },
                None => ScrubStatus {
                    pool: pool.to_string(),
                    health,
                    state: ScanState::None,
                    function: None,
                    start_time: None,
                    end_time: None,
                    to_examine: None,
                    examined: None,
                    errors: None,
                },
            };
            Ok(status)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test: stats are found inside vdev_tree first, then at the top level
    #[test]
    fn test_scan_stats_lookup_order() {
        let mut tree = NvList::new();
        tree.add_uint64_array(ZPOOL_CONFIG_SCAN_STATS, vec![1, 2, 3]).unwrap();
        let mut config = NvList::new();
        config.add_list(ZPOOL_CONFIG_VDEV_TREE, tree).unwrap();
        config.add_uint64_array(ZPOOL_CONFIG_SCAN_STATS, vec![9]).unwrap();
        assert_eq!(scan_stats(&config), Some(&[1u64, 2, 3][..]));

        let mut legacy = NvList::new();
        legacy.add_uint64_array(ZPOOL_CONFIG_SCAN_STATS, vec![2, 2]).unwrap();
        assert_eq!(scan_stats(&legacy), Some(&[2u64, 2][..]));
    }

    /// Test: missing or empty stats mean the pool was never scanned
    #[test]
    fn test_scan_stats_absent() {
        assert!(scan_stats(&NvList::new()).is_none());
        let mut config = NvList::new();
        config.add_uint64_array(ZPOOL_CONFIG_SCAN_STATS, Vec::new()).unwrap();
        assert!(scan_stats(&config).is_none());
    }
}
