//! # Integration Tests: Driver Lifecycle
//!
//! ## What is tested
//! - open_driver with the mock backend selected in settings
//! - pool, dataset, snapshot and clone workflows through `dyn Driver`
//! - error kinds surfaced to callers through the chain-aware predicates
//! - close semantics: idempotent, every later call fails with Closed
//!
//! ## Expected outcome
//! - Operations behave the same through the trait object as on the concrete driver
//!
//! ## Prerequisites
//! - None; the mock backend stands in for ZFS

use zfs_driver::errors::{self, op};
use zfs_driver::{
    open_driver, BackendKind, CreatePoolOptions, DatasetType, Driver, DriverSettings,
    ExportOptions, ImportOptions, PoolHealth, PoolState, Properties,
};

fn mock_driver() -> Box<dyn Driver> {
    let settings = DriverSettings {
        backend: BackendKind::Mock,
        call_timeout_ms: None,
    };
    open_driver(&settings).unwrap()
}

fn with_pool(driver: &dyn Driver, name: &str) {
    let devices = vec![format!("/dev/{}0", name), format!("/dev/{}1", name)];
    driver
        .create_pool(name, &devices, &CreatePoolOptions::default())
        .unwrap();
}

#[test]
fn test_mock_backend_starts_empty() {
    let driver = mock_driver();
    assert!(driver.list_pools().unwrap().is_empty());
    assert!(driver.list_datasets(true).unwrap().is_empty());
    assert_eq!(driver.runtime_info().unwrap().implementation, "mock");
}

#[test]
fn test_pool_workflow() {
    let driver = mock_driver();
    with_pool(driver.as_ref(), "tank");

    let pools = driver.list_pools().unwrap();
    assert_eq!(pools.len(), 1);
    assert_eq!(pools[0].name, "tank");
    assert_eq!(pools[0].health, PoolHealth::Online);
    assert_eq!(pools[0].state, PoolState::Active);

    driver.export_pool("tank", &ExportOptions::default()).unwrap();
    assert!(driver.list_pools().unwrap().is_empty());
    driver.import_pool("tank", &ImportOptions::default()).unwrap();
    assert_eq!(driver.get_pool("tank").unwrap().name, "tank");

    driver.destroy_pool("tank").unwrap();
    let err = driver.get_pool("tank").unwrap_err();
    assert!(errors::is_pool_not_found(&err));
    assert!(!errors::is_dataset_not_found(&err));
}

#[test]
fn test_import_unknown_pool() {
    let driver = mock_driver();
    let err = driver.import_pool("ghost", &ImportOptions::default()).unwrap_err();
    assert!(errors::is_not_found(&err));
    assert_eq!(err.op, op::IMPORT_POOL);
}

#[test]
fn test_dataset_snapshot_clone_workflow() {
    let driver = mock_driver();
    with_pool(driver.as_ref(), "tank");

    let mut props = Properties::new();
    props.insert("compression".to_string(), "zstd".to_string());
    driver.create_dataset("tank/home", DatasetType::Filesystem, &props).unwrap();
    driver.create_snapshot("tank/home@monday", false, &Properties::new()).unwrap();
    driver.create_clone("tank/home@monday", "tank/scratch", &Properties::new()).unwrap();

    let compression = driver.get_dataset_properties("tank/home", &["compression"]).unwrap();
    assert_eq!(compression["compression"].as_str(), Some("zstd"));

    assert_eq!(driver.list_clones("tank/home@monday").unwrap(), vec!["tank/scratch"]);
    let err = driver.destroy_snapshot("tank/home@monday").unwrap_err();
    assert!(errors::is_busy(&err));

    driver.destroy_clone("tank/scratch", false).unwrap();
    driver.destroy_snapshot("tank/home@monday").unwrap();
    assert!(driver.list_snapshots("tank/home").unwrap().is_empty());
}

#[test]
fn test_invalid_names_rejected() {
    let driver = mock_driver();
    with_pool(driver.as_ref(), "tank");

    let err = driver
        .create_dataset("tank//bad", DatasetType::Filesystem, &Properties::new())
        .unwrap_err();
    assert!(errors::is_invalid_argument(&err));
    assert_eq!(err.op, op::CREATE_DATASET);

    let err = driver.get_dataset("").unwrap_err();
    assert!(errors::is_invalid_argument(&err));

    let err = driver.create_clone("tank/home", "tank/c", &Properties::new()).unwrap_err();
    assert!(errors::is_invalid_argument(&err));
}

#[test]
fn test_missing_dataset_is_dataset_not_found() {
    let driver = mock_driver();
    with_pool(driver.as_ref(), "tank");
    let err = driver.get_dataset("tank/nowhere").unwrap_err();
    assert!(errors::is_dataset_not_found(&err));
    assert!(err.to_string().contains("tank/nowhere"));
}

#[test]
fn test_close_is_final() {
    let driver = mock_driver();
    with_pool(driver.as_ref(), "tank");
    driver.close();
    driver.close();
    assert!(driver.is_closed());

    for err in [
        driver.list_pools().unwrap_err(),
        driver.get_dataset("tank").map(|_| ()).unwrap_err(),
        driver.start_scrub("tank").unwrap_err(),
        driver.list_supported_compression().map(|_| ()).unwrap_err(),
    ] {
        assert!(errors::is_closed(&err));
    }
}
