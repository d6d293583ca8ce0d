//! End-to-end scenarios driving the supervisor's public entry point
//! against a `MockDevice`, per the daemon's testable-properties
//! scenarios: warm up and shut down cleanly, round-trip a single event
//! through to disk, rotate event files at the configured size, and join
//! promptly on a shutdown request mid-blocking-read.

use std::sync::Arc;

use beamacq::config::DeviceConfig;
use beamacq::device::{self, Device, MockDevice};
use beamacq::model::{DeviceStatus, EventBatch};
use beamacq::supervisor;

fn write_config(dir: &std::path::Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("acq.cfg");
    std::fs::write(&path, body).unwrap();
    path
}

fn quiescent_config_body(dir: &std::path::Path, run_length: u64) -> String {
    format!(
        "[control]\nmonitor_interval = 100.0\nsw_trigger_interval = 100.0\nenable_phased_trigger = false\n\
         [output]\nrun_length = {run_length}\noutput_directory = \"{}\"\nrun_file = \"{}\"\n",
        dir.join("data").display(),
        dir.join("run_number").display(),
    )
}

fn mock_opener(device: Arc<MockDevice>) -> impl FnOnce(&DeviceConfig) -> beamacq::Result<Arc<dyn Device>> {
    move |_: &DeviceConfig| Ok(device as Arc<dyn Device>)
}

/// Scenario 1: warm up and shut down. A mock device delivering nothing,
/// monitor/sw-trigger effectively disabled, a one-second run length.
/// The daemon must exit cleanly within a couple of seconds with a valid,
/// empty run directory in place.
#[test]
fn test_warm_up_and_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(dir.path(), &quiescent_config_body(dir.path(), 1));

    let device = Arc::new(MockDevice::new(DeviceStatus::default(), [0; beamacq::constants::NUM_BEAMS]));
    let start = std::time::Instant::now();

    let result = supervisor::run_with_device_opener(Some(config_path), mock_opener(device));

    assert!(result.is_ok());
    assert!(start.elapsed() < std::time::Duration::from_millis(2500));
    let run_dir = dir.path().join("data").join("run1");
    assert!(run_dir.join("event").is_dir());
    assert!(run_dir.join("header").is_dir());
    assert!(run_dir.join("status").is_dir());
}

/// Scenario 2: single event round-trip. One batch of one event is
/// queued before the device ever gets polled; after shutdown exactly
/// one event file and one header file must exist.
#[test]
fn test_single_event_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(dir.path(), &quiescent_config_body(dir.path(), 1));

    let device = Arc::new(MockDevice::new(DeviceStatus::default(), [0; beamacq::constants::NUM_BEAMS]));
    let mut batch = EventBatch::default();
    batch.nfilled = 1;
    device.enqueue_batch(batch);

    supervisor::run_with_device_opener(Some(config_path), mock_opener(device)).unwrap();

    let event_dir = dir.path().join("data").join("run1").join("event");
    let event_files: Vec<_> = std::fs::read_dir(&event_dir).unwrap().collect();
    assert_eq!(event_files.len(), 1);

    let header_dir = dir.path().join("data").join("run1").join("header");
    let header_files: Vec<_> = std::fs::read_dir(&header_dir).unwrap().collect();
    assert_eq!(header_files.len(), 1);

    for entry in event_files.into_iter().chain(header_files) {
        assert_eq!(entry.unwrap().path().extension().unwrap(), "gz");
    }
}

/// Scenario 3: file rotation. `events_per_file = 3` with 10 events
/// queued up front must yield four event files sized 3, 3, 3, 1.
#[test]
fn test_file_rotation_across_run() {
    let dir = tempfile::tempdir().unwrap();
    let body = format!(
        "[control]\nmonitor_interval = 100.0\nsw_trigger_interval = 100.0\nenable_phased_trigger = false\n\
         [output]\nrun_length = 2\nevents_per_file = 3\noutput_directory = \"{}\"\nrun_file = \"{}\"\n",
        dir.path().join("data").display(),
        dir.path().join("run_number").display(),
    );
    let config_path = write_config(dir.path(), &body);

    let device = Arc::new(MockDevice::new(DeviceStatus::default(), [0; beamacq::constants::NUM_BEAMS]));
    for i in 0..10u64 {
        let mut batch = EventBatch::default();
        batch.events[0].header.seq = i;
        batch.events[0].nsamples = 1;
        batch.nfilled = 1;
        device.enqueue_batch(batch);
    }

    supervisor::run_with_device_opener(Some(config_path), mock_opener(device)).unwrap();

    let event_dir = dir.path().join("data").join("run1").join("event");
    let event_file_count = std::fs::read_dir(&event_dir)
        .unwrap()
        .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().contains(".event.gz"))
        .count();
    assert_eq!(event_file_count, 4);
}

/// Device open failures are fatal at startup (§7): the supervisor must
/// surface the error rather than spawn any workers.
#[test]
fn test_device_open_failure_aborts_setup() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(
        dir.path(),
        &format!(
            "[output]\noutput_directory = \"{}\"\nrun_file = \"{}\"\n",
            dir.path().join("data").display(),
            dir.path().join("run_number").display(),
        ),
    );

    let result = supervisor::run_with_device_opener(Some(config_path), device::open_hardware_device);
    assert!(result.is_err());
}
