// zfs_management/tests.rs
// Unit tests for the composed driver over the in-memory backend

#![cfg(test)]

use super::driver::{Driver, Properties, ZfsDriver};
use super::types::*;
use super::vdev::{VdevSpec, VdevType};
use crate::backend::mock::{MockBackend, MockProbe};
use crate::errors::*;
use std::sync::Arc;

fn driver() -> (ZfsDriver<MockBackend>, MockProbe) {
    let backend = MockBackend::new().with_pool("tank", 42);
    backend.add_dataset("tank/data", DatasetType::Filesystem);
    backend.add_dataset("tank/data@snap1", DatasetType::Snapshot);
    let probe = backend.probe();
    (ZfsDriver::new(backend), probe)
}

fn no_props() -> Properties {
    Properties::new()
}

// -------------------------------------------------------------------------
// End-to-end scenarios
// -------------------------------------------------------------------------

/// Test: one ONLINE, ACTIVE pool is listed with its guid
#[test]
fn test_list_pools_single() {
    let (driver, _) = driver();
    let pools = driver.list_pools().unwrap();
    assert_eq!(
        pools,
        vec![PoolInfo {
            name: "tank".to_string(),
            guid: 42,
            health: PoolHealth::Online,
            state: PoolState::Active,
        }]
    );
}

/// Test: a property without a value is left out, not an error
#[test]
fn test_get_properties_partial() {
    let (driver, probe) = driver();
    probe.set_prop("tank/data", "used", "10G");

    let props = driver.get_dataset_properties("tank/data", &["used", "mountpoint"]).unwrap();
    assert_eq!(props.len(), 1);
    assert_eq!(props["used"].value, PropValue::String("10G".to_string()));
    assert!(!props.contains_key("mountpoint"));
}

/// Test: a new clone reports its origin
#[test]
fn test_create_clone_then_info() {
    let (driver, _) = driver();
    driver.create_clone("tank/data@snap1", "tank/clone1", &no_props()).unwrap();

    let info = driver.get_clone_info("tank/clone1").unwrap();
    assert!(info.is_clone);
    assert_eq!(info.origin, "tank/data@snap1");
}

/// Test: destroying a non-clone without force is InvalidArgument from destroy_clone
#[test]
fn test_destroy_clone_rejects_non_clone() {
    let (driver, probe) = driver();
    probe.add_dataset("tank/notaclone", DatasetType::Filesystem);

    let err = driver.destroy_clone("tank/notaclone", false).unwrap_err();
    assert!(is_invalid_argument(&err));
    assert_eq!(err.op, op::DESTROY_CLONE);
    assert!(probe.has_dataset("tank/notaclone"));
}

// -------------------------------------------------------------------------
// Session lifecycle
// -------------------------------------------------------------------------

/// Test: every operation fails with Closed after close, without a backend call
#[test]
fn test_closed_driver_fails_fast() {
    let (driver, probe) = driver();
    driver.close();
    driver.close();
    assert!(driver.is_closed());
    assert_eq!(probe.releases(), 1);

    let calls = probe.calls().len();
    assert!(is_closed(&driver.list_pools().unwrap_err()));
    assert!(is_closed(&driver.supports_feature("encryption").unwrap_err()));
    assert!(is_closed(&driver.backend_version().unwrap_err()));
    assert_eq!(probe.calls().len(), calls);
}

/// Test: handles opened by failing operations are still released
#[test]
fn test_handles_released_on_error() {
    let (driver, probe) = driver();
    probe.fail_next("dataset_set_prop", libc::EPERM);
    let err = driver.set_dataset_property("tank/data", "compression", "lz4").unwrap_err();
    assert!(is_permission_denied(&err));
    assert!(driver.destroy_clone("tank/data", false).is_err());
    assert_eq!(probe.open_handles(), 0);
}

/// Test: the driver can be shared across threads
#[test]
fn test_concurrent_callers() {
    let (driver, probe) = driver();
    let driver: Arc<dyn Driver> = Arc::new(driver);
    let workers: Vec<_> = (0..4)
        .map(|i| {
            let driver = Arc::clone(&driver);
            std::thread::spawn(move || {
                let name = format!("tank/w{}", i);
                driver.create_dataset(&name, DatasetType::Filesystem, &Properties::new()).unwrap();
                driver.list_datasets(true).unwrap();
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(driver.list_datasets_by_type(DatasetType::Filesystem, true).unwrap().len(), 6);
    assert_eq!(probe.open_handles(), 0);
}

// -------------------------------------------------------------------------
// Pools
// -------------------------------------------------------------------------

/// Test: stripe creation needs a device and builds one top-level disk each
#[test]
fn test_create_pool_stripe() {
    let (driver, probe) = driver();
    let err = driver.create_pool("empty", &[], &CreatePoolOptions::default()).unwrap_err();
    assert!(is_invalid_argument(&err));

    let devices = vec!["/dev/da0".to_string(), "/dev/da1".to_string()];
    let options = CreatePoolOptions {
        alt_root: Some("/mnt".to_string()),
        ..CreatePoolOptions::default()
    };
    driver.create_pool("fast", &devices, &options).unwrap();

    assert_eq!(probe.devices("fast").len(), 2);
    assert_eq!(probe.pool_prop("fast", "altroot").as_deref(), Some("/mnt"));
    assert_eq!(driver.get_pool("fast").unwrap().state, PoolState::Active);
}

/// Test: topology-aware creation keeps spares out of the data vdevs
#[test]
fn test_create_pool_with_vdevs() {
    let (driver, probe) = driver();
    let vdevs = vec![
        VdevSpec::mirror(["/dev/da0", "/dev/da1"]),
        VdevSpec::new(VdevType::Spare, ["/dev/da2"]),
    ];
    driver.create_pool_with_vdevs("safe", &vdevs, &CreatePoolOptions::default()).unwrap();

    let tree = probe.vdev_tree("safe").unwrap();
    assert_eq!(tree.lookup_list_array("children").unwrap().len(), 1);
    assert_eq!(tree.lookup_list_array("spares").unwrap().len(), 1);

    let bad = vec![VdevSpec::new(VdevType::RaidZ2, ["/dev/da3", "/dev/da4"])];
    let err = driver
        .create_pool_with_vdevs("bad", &bad, &CreatePoolOptions::default())
        .unwrap_err();
    assert!(is_invalid_argument(&err));
    assert_eq!(err.op, op::CREATE_POOL);
    assert!(!probe.has_pool("bad"));
}

/// Test: export then import under a new name
#[test]
fn test_export_import_rename() {
    let (driver, probe) = driver();
    probe.set_busy("tank", true);
    let err = driver.export_pool("tank", &ExportOptions::default()).unwrap_err();
    assert!(is_busy(&err));

    let force = ExportOptions {
        force: true,
        ..ExportOptions::default()
    };
    driver.export_pool("tank", &force).unwrap();
    assert_eq!(probe.pool_state("tank"), Some(PoolState::Exported));
    assert!(is_pool_not_found(&driver.get_pool("tank").unwrap_err()));

    let import = ImportOptions {
        new_name: Some("vault".to_string()),
        ..ImportOptions::default()
    };
    driver.import_pool("tank", &import).unwrap();
    assert_eq!(driver.get_pool("vault").unwrap().guid, 42);
    assert!(driver.get_dataset("vault/data@snap1").is_ok());
}

/// Test: pool properties report source and reject bad names
#[test]
fn test_pool_properties() {
    let (driver, _) = driver();
    driver.set_pool_property("tank", "autotrim", "on").unwrap();

    let props = driver.get_pool_properties("tank", &["health", "autotrim", "bogus"]).unwrap();
    assert_eq!(props["health"].as_str(), Some("ONLINE"));
    assert_eq!(props["autotrim"].source, PropSource::Local);
    assert!(!props.contains_key("bogus"));

    let err = driver.set_pool_property("tank", "Bad Name", "x").unwrap_err();
    assert!(is_invalid_argument(&err));
}

/// Test: destroying a pool removes it and its datasets
#[test]
fn test_destroy_pool() {
    let (driver, probe) = driver();
    driver.destroy_pool("tank").unwrap();
    assert!(!probe.has_pool("tank"));
    assert!(!probe.has_dataset("tank/data"));
    assert!(driver.list_pools().unwrap().is_empty());
}

// -------------------------------------------------------------------------
// Datasets and snapshots
// -------------------------------------------------------------------------

/// Test: recursive listing reaches snapshots once, non-recursive stops at roots
#[test]
fn test_list_datasets() {
    let (driver, _) = driver();
    let all = driver.list_datasets(true).unwrap();
    let names: Vec<&str> = all.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["tank", "tank/data", "tank/data@snap1"]);

    assert_eq!(driver.list_datasets(false).unwrap().len(), 1);
    let snaps = driver.list_datasets_by_type(DatasetType::Snapshot, true).unwrap();
    assert_eq!(snaps.len(), 1);
    assert_eq!(driver.list_datasets_in_pool("tank", true).unwrap().len(), 3);
}

/// Test: volumes need volsize, snapshots cannot be made with create_dataset
#[test]
fn test_create_dataset_kinds() {
    let (driver, _) = driver();
    let err = driver.create_dataset("tank/vol", DatasetType::Volume, &no_props()).unwrap_err();
    assert!(is_invalid_argument(&err));

    let mut props = Properties::new();
    props.insert("volsize".to_string(), "1073741824".to_string());
    driver.create_dataset("tank/vol", DatasetType::Volume, &props).unwrap();
    assert_eq!(driver.get_dataset("tank/vol").unwrap().kind, DatasetType::Volume);

    let err = driver.create_dataset("tank/s", DatasetType::Snapshot, &no_props()).unwrap_err();
    assert!(is_invalid_argument(&err));

    let err = driver.create_dataset("tank/data", DatasetType::Filesystem, &no_props()).unwrap_err();
    assert!(is_already_exists(&err));
}

/// Test: recursive destroy removes the subtree deepest first
#[test]
fn test_destroy_dataset_recursive() {
    let (driver, probe) = driver();
    probe.add_dataset("tank/data/child", DatasetType::Filesystem);
    probe.add_dataset("tank/data/child@s", DatasetType::Snapshot);

    let err = driver.destroy_dataset("tank/data", false).unwrap_err();
    assert!(is_busy(&err));

    driver.destroy_dataset("tank/data", true).unwrap();
    assert!(!probe.has_dataset("tank/data"));
    assert!(!probe.has_dataset("tank/data/child@s"));
    assert!(probe.has_dataset("tank"));
    assert!(is_dataset_not_found(&driver.get_dataset("tank/data").unwrap_err()));
}

/// Test: inherited values carry the inherited source, aliases key by request
#[test]
fn test_dataset_property_sources() {
    let (driver, _) = driver();
    driver.set_dataset_property("tank", "compression", "lz4").unwrap();
    let err = driver.set_dataset_property("tank/data", "used", "1").unwrap_err();
    assert!(is_invalid_argument(&err));

    let props = driver
        .get_dataset_properties("tank/data", &["compression", "type", "guid"])
        .unwrap();
    assert_eq!(props["compression"].source, PropSource::Inherited);
    assert_eq!(props["type"].as_str(), Some("filesystem"));
    assert!(props["guid"].as_u64().is_some());
}

/// Test: snapshots list oldest first and destroy by full name only
#[test]
fn test_snapshot_lifecycle() {
    let (driver, probe) = driver();
    driver.create_snapshot("tank/data@snap2", false, &no_props()).unwrap();
    let snaps = driver.list_snapshots("tank/data").unwrap();
    let names: Vec<&str> = snaps.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["tank/data@snap1", "tank/data@snap2"]);

    let err = driver.create_snapshot("tank/data", false, &no_props()).unwrap_err();
    assert!(is_invalid_argument(&err));
    let err = driver.create_snapshot("tank/data@snap2", false, &no_props()).unwrap_err();
    assert!(is_already_exists(&err));

    driver.destroy_snapshot("tank/data@snap2").unwrap();
    assert!(!probe.has_dataset("tank/data@snap2"));
    assert!(is_invalid_argument(&driver.destroy_snapshot("tank/data").unwrap_err()));
}

/// Test: recursive snapshots cover every descendant
#[test]
fn test_recursive_snapshot() {
    let (driver, probe) = driver();
    driver.create_snapshot("tank@daily", true, &no_props()).unwrap();
    assert!(probe.has_dataset("tank@daily"));
    assert!(probe.has_dataset("tank/data@daily"));
}

/// Test: rollback past newer snapshots needs force
#[test]
fn test_rollback_force() {
    let (driver, probe) = driver();
    driver.create_snapshot("tank/data@snap2", false, &no_props()).unwrap();

    let err = driver.rollback("tank/data", "snap1", false).unwrap_err();
    assert!(is_already_exists(&err));
    assert_eq!(err.op, op::ROLLBACK);

    driver.rollback("tank/data", "tank/data@snap1", true).unwrap();
    assert!(!probe.has_dataset("tank/data@snap2"));

    let err = driver.rollback("tank/data", "tank/other@snap1", false).unwrap_err();
    assert!(is_invalid_argument(&err));
}

// -------------------------------------------------------------------------
// Clones
// -------------------------------------------------------------------------

/// Test: snapshots report their clones, sorted
#[test]
fn test_clone_info_on_snapshot() {
    let (driver, _) = driver();
    driver.create_clone("tank/data@snap1", "tank/c2", &no_props()).unwrap();
    driver.create_clone("tank/data@snap1", "tank/c1", &no_props()).unwrap();

    let info = driver.get_clone_info("tank/data@snap1").unwrap();
    assert!(!info.is_clone);
    assert_eq!(info.clone_count, 2);
    assert_eq!(info.dependents, vec!["tank/c1", "tank/c2"]);
    assert_eq!(driver.list_clones("tank/data@snap1").unwrap(), vec!["tank/c1", "tank/c2"]);
}

/// Test: cloning from a missing snapshot fails at open
#[test]
fn test_create_clone_missing_snapshot() {
    let (driver, probe) = driver();
    let err = driver.create_clone("tank/data@nope", "tank/c", &no_props()).unwrap_err();
    assert!(is_not_found(&err));
    assert!(!probe.calls().contains(&"clone".to_string()));
}

/// Test: promote rejects non-clones and detaches real ones
#[test]
fn test_promote_clone() {
    let (driver, probe) = driver();
    let err = driver.promote_clone("tank/data").unwrap_err();
    assert!(is_invalid_argument(&err));
    assert_eq!(err.op, op::PROMOTE_CLONE);

    driver.create_clone("tank/data@snap1", "tank/clone1", &no_props()).unwrap();
    driver.promote_clone("tank/clone1").unwrap();
    assert!(!driver.get_clone_info("tank/clone1").unwrap().is_clone);
    assert!(probe.has_dataset("tank/clone1@snap1"));
    assert!(!probe.has_dataset("tank/data@snap1"));
}

/// Test: force destroys a dataset regardless of origin
#[test]
fn test_destroy_clone_force() {
    let (driver, probe) = driver();
    driver.create_clone("tank/data@snap1", "tank/clone1", &no_props()).unwrap();
    driver.destroy_clone("tank/clone1", false).unwrap();
    assert!(!probe.has_dataset("tank/clone1"));

    probe.add_dataset("tank/plain", DatasetType::Filesystem);
    driver.destroy_clone("tank/plain", true).unwrap();
    assert!(!probe.has_dataset("tank/plain"));
}

// -------------------------------------------------------------------------
// Vdevs and scrub
// -------------------------------------------------------------------------

/// Test: attach, online with flags, offline, clear and replace move device state
#[test]
fn test_vdev_state_changes() {
    let (driver, probe) = driver();
    probe.add_device("tank", "/dev/da0");

    driver.attach_vdev("tank", "/dev/da0", "/dev/da1").unwrap();
    assert_eq!(probe.devices("tank").len(), 2);

    driver.offline_vdev("tank", "/dev/da1", true).unwrap();
    let state = driver.online_vdev("tank", "/dev/da1", VdevOnlineFlags::FORCE_FAULT).unwrap();
    assert_eq!(state, VdevState::Faulted);
    driver.clear_vdev("tank", None).unwrap();
    assert!(probe.devices("tank").iter().all(|(_, s)| *s == VdevState::Healthy));

    driver.replace_vdev("tank", "/dev/da1", "/dev/da2").unwrap();
    let paths: Vec<String> = probe.devices("tank").into_iter().map(|(p, _)| p).collect();
    assert_eq!(paths, vec!["/dev/da0", "/dev/da2"]);

    driver.detach_vdev("tank", "/dev/da2").unwrap();
    assert!(is_not_found(&driver.remove_vdev("tank", "/dev/da9").unwrap_err()));
}

/// Test: new devices must be absolute paths, checked before the backend
#[test]
fn test_vdev_device_validation() {
    let (driver, probe) = driver();
    probe.add_device("tank", "/dev/da0");
    let err = driver.attach_vdev("tank", "/dev/da0", "da1; rm -rf /").unwrap_err();
    assert!(is_invalid_argument(&err));
    assert!(!probe.calls().contains(&"pool_attach".to_string()));

    driver.add_vdev("tank", &VdevSpec::new(VdevType::Cache, ["/dev/nvd0"])).unwrap();
    assert_eq!(probe.vdev_tree("tank").unwrap().lookup_list_array("l2cache").unwrap().len(), 1);
}

/// Test: scrub start, status, stop, and status of an idle pool
#[test]
fn test_scrub_lifecycle() {
    let (driver, _) = driver();
    let idle = driver.scrub_status("tank").unwrap();
    assert_eq!(idle.state, ScanState::None);
    assert_eq!(idle.function, None);
    assert!(is_not_found(&driver.stop_scrub("tank").unwrap_err()));

    driver.start_scrub("tank").unwrap();
    let running = driver.scrub_status("tank").unwrap();
    assert_eq!(running.state, ScanState::Scanning);
    assert_eq!(running.function, Some(ScanFunction::Scrub));
    assert_eq!(running.health, PoolHealth::Online);
    assert_eq!(running.errors, Some(0));

    driver.pause_scrub("tank").unwrap();
    driver.stop_scrub("tank").unwrap();
    assert_eq!(driver.scrub_status("tank").unwrap().state, ScanState::Canceled);
}

// -------------------------------------------------------------------------
// Capabilities
// -------------------------------------------------------------------------

/// Test: feature answers come from the fixed list, unknown names are false
#[test]
fn test_capabilities() {
    let (driver, probe) = driver();
    assert!(driver.supports_feature("lz4_compress").unwrap());
    assert!(!driver.supports_feature("draid").unwrap());
    assert_eq!(driver.list_available_features().unwrap().len(), 31);
    assert!(driver.list_supported_compression().unwrap().contains(&"zstd".to_string()));
    assert_eq!(driver.backend_version().unwrap(), "zfs-2.2.0-mock");

    probe.fail_next("version", libc::EIO);
    assert_eq!(driver.backend_version().unwrap(), "OpenZFS 2.1+");
}

/// Test: runtime info names the backend
#[test]
fn test_runtime_info() {
    let (driver, _) = driver();
    let info = driver.runtime_info().unwrap();
    assert_eq!(info.implementation, "mock");
    assert_eq!(info.zfs_version, "zfs-2.2.0-mock");
    assert_eq!(info.crate_version, env!("CARGO_PKG_VERSION"));
}
