use std::time::Duration;

use juicebox::adapter::PeripheralId;
use juicebox::memory::{DeviceMemory, FileMemory};
use juicebox::Config;

#[test]
fn missing_file_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let memory = FileMemory::open(dir.path().join("remote.json")).unwrap();
    assert!(memory.known_identity().is_none());
}

#[test]
fn identity_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("remote.json");

    let mut memory = FileMemory::open(&path).unwrap();
    memory
        .set_known_identity(&PeripheralId::new("AA:BB:CC"))
        .unwrap();
    drop(memory);

    let mut memory = FileMemory::open(&path).unwrap();
    assert_eq!(memory.known_identity(), Some(PeripheralId::new("AA:BB:CC")));

    memory.clear_known_identity().unwrap();
    let memory = FileMemory::open(&path).unwrap();
    assert!(memory.known_identity().is_none());
}

#[test]
fn corrupt_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("remote.json");
    std::fs::write(&path, "not json").unwrap();
    assert!(FileMemory::open(&path).is_err());
}

#[test]
fn failed_write_keeps_previous_identity() {
    let dir = tempfile::tempdir().unwrap();
    let mut orphan = FileMemory::open(dir.path().join("gone").join("remote.json")).unwrap();
    assert!(orphan
        .set_known_identity(&PeripheralId::new("AA:BB:CC"))
        .is_err());
    assert!(orphan.known_identity().is_none());

    let path = dir.path().join("remote.json");
    let mut memory = FileMemory::open(&path).unwrap();
    memory
        .set_known_identity(&PeripheralId::new("AA:BB:CC"))
        .unwrap();
    std::fs::remove_file(&path).unwrap();
    std::fs::create_dir(&path).unwrap();
    assert!(memory.clear_known_identity().is_err());
    assert_eq!(memory.known_identity(), Some(PeripheralId::new("AA:BB:CC")));
}

#[test]
fn boxed_memory_delegates() {
    let dir = tempfile::tempdir().unwrap();
    let mut memory: Box<dyn DeviceMemory> =
        Box::new(FileMemory::open(dir.path().join("remote.json")).unwrap());
    memory.set_known_identity(&PeripheralId::new("x")).unwrap();
    assert_eq!(memory.known_identity(), Some(PeripheralId::new("x")));
}

#[test]
fn config_file_overrides_only_named_fields() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{ "watchdog_timeout": 20000, "stall_threshold": 3 }"#).unwrap();

    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.watchdog_timeout, Duration::from_secs(20));
    assert_eq!(config.stall_threshold, 3);
    assert_eq!(config.send_debounce, Duration::from_millis(150));
    assert_eq!(config.min_send_interval, Duration::from_millis(500));
    assert_eq!(config.primary_keyword, "juicebox");
}

#[test]
fn config_round_trips_as_milliseconds() {
    let json = serde_json::to_value(Config::default()).unwrap();
    assert_eq!(json["scan_fallback"], 5000);
    assert_eq!(json["scan_coalesce"], 1000);
    let back: Config = serde_json::from_value(json).unwrap();
    assert_eq!(back, Config::default());
}

#[test]
fn missing_config_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(Config::from_file(dir.path().join("absent.json")).is_err());
}
