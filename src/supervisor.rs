//! Component G: the supervisor.
//!
//! Owns the config slot, the device handle, and both ring buffers for
//! their full lifetime. Opens the device, spawns the acquisition,
//! monitor, and writer workers, services termination and reload
//! signals, enforces the run-length timeout, and tears everything down.
//! Workers never see signals directly (§9): the supervisor installs
//! handlers once, on its own thread, before spawning anything.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::Config;
use crate::constants::{ALIGNMENT_RETRY_DELAY_SECS, MAX_ALIGNMENT_ATTEMPTS, SUPERVISOR_TICK_MS};
use crate::device::{self, Device};
use crate::error::{AcqError, Result};
use crate::model::{EventBatch, StatusSnapshot};
use crate::ring::{self, RingBuffer};
use crate::run_context::RunContext;
use crate::signals;
use crate::status_store::StatusStore;
use crate::workers::{acquisition, monitor, writer};

/// Run the daemon to completion against a real hardware device, using
/// the config path the original daemon resolves (`CONFIG_DIR`/acq.cfg,
/// falling back to `cfg/acq.cfg`, unless `config_override` is given).
/// Returns the process exit code: 0 on clean teardown, 1 on setup
/// failure, matching §6.
pub fn run(config_override: Option<PathBuf>) -> i32 {
    match run_with_device_opener(config_override, device::open_hardware_device) {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!("startup failed: {e}");
            1
        }
    }
}

/// Entry point parameterized over how the device is opened, so tests
/// can inject a [`crate::device::MockDevice`] without duplicating the
/// rest of the startup sequence. Services real process signals.
pub fn run_with_device_opener<F>(config_override: Option<PathBuf>, open_device: F) -> Result<()>
where
    F: FnOnce(&crate::config::DeviceConfig) -> Result<Arc<dyn Device>>,
{
    signals::install()?;
    run_inner(config_override, open_device, signals::shutdown_requested, signals::take_reload_request)
}

/// The full startup/run/teardown sequence, parameterized over device
/// opening and over how termination/reload requests are observed. The
/// public entry points above wire this to the real device driver and
/// the process's signal handlers; tests wire it to a [`MockDevice`] and
/// plain `Arc<AtomicBool>` flags so they never touch process-global
/// signal state.
fn run_inner<F, S, R>(config_override: Option<PathBuf>, open_device: F, shutdown_requested: S, take_reload_request: R) -> Result<()>
where
    F: FnOnce(&crate::config::DeviceConfig) -> Result<Arc<dyn Device>>,
    S: Fn() -> bool,
    R: Fn() -> bool,
{
    let config_path = Config::resolve_path(config_override.as_deref());
    let config = Config::load(&config_path)?;

    let run_ctx = RunContext::begin(&config.output.run_file, &config.output.output_directory)?;

    if config.output.copy_configs {
        if let Err(e) = run_ctx.stage_config_copy(&config_path) {
            tracing::warn!("failed to stage config copy into run directory: {e}");
        }
    }
    if let Err(e) = run_ctx.stage_aux_paths(&config.output.copy_paths_to_rundir) {
        tracing::warn!("failed to stage aux paths into run directory: {e}");
    }

    if let Some(cmd) = config.device.alignment_command.clone() {
        run_alignment_command(&cmd)?;
    }

    let device = open_device(&config.device)?;

    let status_store = load_persisted_thresholds(&config, &device);

    device.apply_full_configuration(&config.device, &config.control)?;

    let ring_capacity = ring::round_up_capacity(config.device.buffer_capacity);
    let acq_ring = Arc::new(RingBuffer::<EventBatch>::new_locked(ring_capacity)?);
    let mon_ring = Arc::new(RingBuffer::<StatusSnapshot>::new(ring_capacity)?);

    let realtime_priority = config.output.realtime_priority;
    let realtime_cpu_core = config.output.realtime_cpu_core;
    let run_length = config.output.run_length;

    let shutdown = Arc::new(AtomicBool::new(false));
    let reload_pending = Arc::new(AtomicBool::new(false));
    let config = Arc::new(Mutex::new(config));
    let reload_run_ctx = run_ctx.clone();

    tracing::info!(run_number = run_ctx.run_number, "supervisor: spawning workers");

    let acq_handle = {
        let device = device.clone();
        let ring = acq_ring.clone();
        let shutdown = shutdown.clone();
        std::thread::spawn(move || acquisition::run(device, ring, shutdown, realtime_priority, realtime_cpu_core))
    };

    let mon_handle = {
        let device = device.clone();
        let config = config.clone();
        let ring = mon_ring.clone();
        let shutdown = shutdown.clone();
        let reload_pending = reload_pending.clone();
        std::thread::spawn(move || monitor::run(device, config, ring, shutdown, reload_pending))
    };

    let writer_handle = {
        let acq_ring = acq_ring.clone();
        let mon_ring = mon_ring.clone();
        let shutdown = shutdown.clone();
        let config = config.clone();
        std::thread::spawn(move || writer::run(acq_ring, mon_ring, shutdown, config, run_ctx, status_store))
    };

    let start = Instant::now();
    let run_length = Duration::from_secs(run_length);

    loop {
        std::thread::sleep(Duration::from_millis(SUPERVISOR_TICK_MS));

        if shutdown_requested() {
            tracing::info!("supervisor: termination signal received");
            break;
        }
        if run_length > Duration::ZERO && start.elapsed() >= run_length {
            tracing::info!("supervisor: run length elapsed");
            break;
        }
        if take_reload_request() {
            if let Err(e) = reload_config(&config_path, &config, &reload_run_ctx, &reload_pending) {
                tracing::warn!("config reload failed: {e}");
            }
        }
    }

    tracing::info!("supervisor: shutting down");
    shutdown.store(true, Ordering::Relaxed);
    device.cancel_wait();

    let _ = acq_handle.join();
    let _ = mon_handle.join();
    let _ = writer_handle.join();

    let acq_residual = acq_ring.destroy();
    if acq_residual > 0 {
        tracing::warn!(residual = acq_residual, "acquisition ring destroyed with unconsumed events");
    }
    let mon_residual = mon_ring.destroy();
    if mon_residual > 0 {
        tracing::warn!(residual = mon_residual, "monitor ring destroyed with unconsumed snapshots");
    }

    if let Err(e) = device.set_calpulser_state(0) {
        tracing::warn!("failed to disable calpulser on exit: {e}");
    }
    if config.lock().device.disable_trigout_on_exit {
        if let Err(e) = device.set_trigout_enabled(false) {
            tracing::warn!("failed to disable trigger output on exit: {e}");
        }
    }

    tracing::info!("supervisor: teardown complete");
    Ok(())
}

/// Open (or create) the persisted threshold snapshot and, if it holds a
/// valid record, push its thresholds to the freshly opened device.
/// Failure to map the file is logged and the daemon runs without
/// persistence, per §7's "status mmap failure" policy.
fn load_persisted_thresholds(config: &Config, device: &Arc<dyn Device>) -> Option<StatusStore> {
    if !config.control.load_thresholds_from_status_file {
        return None;
    }

    match StatusStore::open(&config.control.status_save_file) {
        Ok(store) => {
            let record = store.read();
            if record.format_version != 0 {
                if let Err(e) = device.set_thresholds(&record.thresholds) {
                    tracing::warn!("failed to push persisted thresholds to device: {e}");
                } else {
                    tracing::info!(
                        "loaded persisted thresholds from {}",
                        config.control.status_save_file.display()
                    );
                }
            }
            Some(store)
        }
        Err(e) => {
            tracing::warn!("status snapshot unavailable, running without persistence: {e}");
            None
        }
    }
}

/// Run the external alignment command, retrying a bounded number of
/// times on failure. The command is itself responsible for any
/// FPGA/attenuation reset it needs between attempts (§4.G); the
/// supervisor only re-invokes it.
fn run_alignment_command(cmd: &str) -> Result<()> {
    for attempt in 1..=MAX_ALIGNMENT_ATTEMPTS {
        tracing::info!(attempt, max = MAX_ALIGNMENT_ATTEMPTS, "running alignment command: {cmd}");
        match Command::new("sh").arg("-c").arg(cmd).status() {
            Ok(status) if status.success() => return Ok(()),
            Ok(status) => tracing::warn!("alignment command exited with {status}"),
            Err(e) => tracing::warn!("failed to spawn alignment command: {e}"),
        }
        if attempt < MAX_ALIGNMENT_ATTEMPTS {
            std::thread::sleep(Duration::from_secs(ALIGNMENT_RETRY_DELAY_SECS));
        }
    }
    Err(AcqError::device(format!("alignment command failed after {MAX_ALIGNMENT_ATTEMPTS} attempts: {cmd}")))
}

/// Apply a SIGUSR1 reload: re-read the config file, replace mutable
/// fields in place (structural fields are preserved by
/// [`Config::apply_reloadable_fields`]), signal the monitor worker to
/// rebuild its PID controller and reapply device settings, rewrite the
/// run-number file, and optionally re-stage config copies.
fn reload_config(
    config_path: &Path,
    config: &Arc<Mutex<Config>>,
    run_ctx: &RunContext,
    reload_pending: &Arc<AtomicBool>,
) -> Result<()> {
    let new_config = Config::load(config_path)?;

    let (run_file, copy_configs) = {
        let mut cfg = config.lock();
        cfg.apply_reloadable_fields(&new_config);
        (cfg.output.run_file.clone(), cfg.output.copy_configs)
    };

    reload_pending.store(true, Ordering::Relaxed);

    run_ctx.rewrite_run_file(&run_file)?;

    if copy_configs {
        run_ctx.stage_config_copy(config_path)?;
    }

    tracing::info!("supervisor: configuration reloaded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MockDevice;
    use crate::model::{DeviceStatus, EventBatch};
    use std::sync::atomic::Ordering as StdOrdering;
    use std::time::Duration as StdDuration;

    fn write_config(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("acq.cfg");
        std::fs::write(&path, body).unwrap();
        path
    }

    // Scenarios 1, 2, 3 and device-open-failure are exercised as true
    // integration tests against the public `run_with_device_opener` API
    // in `tests/acquisition_e2e.rs`; the tests below cover internals
    // (`run_alignment_command`, `reload_config`, `run_inner`'s injected
    // shutdown predicate) that aren't reachable from outside the crate.

    #[test]
    fn test_alignment_command_success_runs_once() {
        assert!(run_alignment_command("true").is_ok());
    }

    #[test]
    fn test_alignment_command_exhausts_retries() {
        let result = run_alignment_command("false");
        assert!(result.is_err());
    }

    #[test]
    fn test_reload_rewrites_run_file_without_incrementing() {
        let dir = tempfile::tempdir().unwrap();
        let run_file = dir.path().join("run_number");
        let output_dir = dir.path().join("data");
        let run_ctx = RunContext::begin(&run_file, &output_dir).unwrap();
        assert_eq!(run_ctx.run_number, 1);

        let body = "[control]\nk_p = 42.0\n";
        let config_path = write_config(dir.path(), body);
        let mut initial = Config::default();
        initial.output.run_file = run_file.clone();
        let config = Arc::new(Mutex::new(initial));
        let reload_pending = Arc::new(AtomicBool::new(false));

        reload_config(&config_path, &config, &run_ctx, &reload_pending).unwrap();

        assert_eq!(config.lock().control.k_p, 42.0);
        assert!(reload_pending.load(StdOrdering::Relaxed));
        let contents = std::fs::read_to_string(&run_file).unwrap();
        assert_eq!(contents.trim(), "1");
    }

    /// End-to-end scenario 5 ("shutdown on signal"): a long `run_length`
    /// must not be what ends the run — an externally observed shutdown
    /// request (standing in for SIGTERM) must unblock the acquisition
    /// worker's mock blocking read and let every thread join promptly.
    #[test]
    fn test_shutdown_on_signal_joins_promptly() {
        let dir = tempfile::tempdir().unwrap();
        let body = format!(
            "[control]\nmonitor_interval = 100.0\nsw_trigger_interval = 100.0\nenable_phased_trigger = false\n\
             [output]\nrun_length = 600\noutput_directory = \"{}\"\nrun_file = \"{}\"\n",
            dir.path().join("data").display(),
            dir.path().join("run_number").display(),
        );
        let config_path = write_config(dir.path(), &body);

        let device = Arc::new(MockDevice::new(DeviceStatus::default(), [0; crate::constants::NUM_BEAMS]));
        let opener = {
            let device = device.clone();
            move |_: &crate::config::DeviceConfig| Ok(device.clone() as Arc<dyn Device>)
        };

        let test_shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_flag = test_shutdown.clone();
        let reload_flag = Arc::new(AtomicBool::new(false));

        let handle = std::thread::spawn(move || {
            run_inner(
                Some(config_path),
                opener,
                move || shutdown_flag.load(StdOrdering::Relaxed),
                move || reload_flag.swap(false, StdOrdering::Relaxed),
            )
        });

        std::thread::sleep(StdDuration::from_millis(200));
        test_shutdown.store(true, StdOrdering::Relaxed);

        let result = handle.join().unwrap();
        assert!(result.is_ok());
    }
}
