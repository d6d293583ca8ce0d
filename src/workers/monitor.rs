//! Component E: the monitor worker.
//!
//! A single cooperative loop driven by a monotonic clock: reads device
//! status, runs the PID controller, applies new thresholds, emits
//! software triggers, and pushes status snapshots to the monitor ring.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::Config;
use crate::constants::{MONITOR_MAX_SLEEP_MS, NUM_BEAMS};
use crate::device::Device;
use crate::model::StatusSnapshot;
use crate::pid::PidController;
use crate::ring::RingBuffer;
use crate::scaler::FastScalerWindow;
use crate::signals;

pub fn run(
    device: Arc<dyn Device>,
    config: Arc<Mutex<Config>>,
    ring: Arc<RingBuffer<StatusSnapshot>>,
    shutdown: Arc<AtomicBool>,
    reload_pending: Arc<AtomicBool>,
) {
    if let Err(e) = signals::mask_current_thread() {
        tracing::warn!("monitor thread: failed to mask signals: {e}");
    }

    let (initial_control, n_fast_scaler_avg) = {
        let cfg = config.lock();
        (cfg.control.clone(), cfg.control.n_fast_scaler_avg)
    };

    let mut fast_scalers = FastScalerWindow::new(n_fast_scaler_avg);
    let mut pid = PidController::new(
        initial_control.k_p,
        initial_control.k_i,
        initial_control.k_d,
        initial_control.pid_formula,
        initial_control.max_threshold_increase,
        initial_control.min_threshold,
    );

    let start = Instant::now();
    let mut last_mon = start;
    let mut last_swtrig = start;
    let mut phased_trigger_enabled = false;

    tracing::info!("monitor worker started");

    while !shutdown.load(Ordering::Relaxed) {
        if reload_pending.swap(false, Ordering::Relaxed) {
            let full = config.lock().clone();
            pid = rebuild_pid_on_reload(&full.control);
            if let Err(e) = device.apply_full_configuration(&full.device, &full.control) {
                tracing::warn!("failed to reapply device configuration on reload: {e}");
            } else {
                tracing::info!("monitor: config reload applied");
            }
        }

        let control = config.lock().control.clone();
        let now = Instant::now();

        // Phased-trigger gate.
        let elapsed_since_start = now.duration_since(start);
        if control.enable_phased_trigger && !phased_trigger_enabled {
            let gate_elapsed = control.secs_before_phased_trigger == 0
                || elapsed_since_start >= Duration::from_secs(control.secs_before_phased_trigger);
            if gate_elapsed {
                if let Err(e) = device.set_phased_trigger_enabled(true) {
                    tracing::warn!("failed to enable phased trigger: {e}");
                } else {
                    phased_trigger_enabled = true;
                }
            }
        } else if !control.enable_phased_trigger && phased_trigger_enabled {
            if let Err(e) = device.set_phased_trigger_enabled(false) {
                tracing::warn!("failed to disable phased trigger: {e}");
            } else {
                phased_trigger_enabled = false;
            }
        }

        let monitor_interval = Duration::from_secs_f64(control.monitor_interval.max(0.0));
        let since_mon = now.duration_since(last_mon);
        if since_mon >= monitor_interval {
            match device.read_status() {
                Ok(status) => {
                    let mut fast = [0.0f64; NUM_BEAMS];
                    for b in 0..NUM_BEAMS {
                        fast[b] = status.scaler_fast[b] as f64;
                    }
                    fast_scalers.add(&fast);

                    let mut measured = [0.0f64; NUM_BEAMS];
                    let weight_sum = control.slow_scaler_weight + control.fast_scaler_weight;
                    for b in 0..NUM_BEAMS {
                        let weighted = control.slow_scaler_weight * status.scaler_slow[b] as f64
                            + control.fast_scaler_weight * fast_scalers.get(b);
                        let mut rate = if weight_sum > 0.0 { weighted / weight_sum } else { 0.0 };
                        if control.subtract_gated {
                            rate -= status.scaler_slow_gated[b] as f64;
                        }
                        measured[b] = rate;
                    }

                    let dt = since_mon.as_secs_f64();
                    let new_thresholds = pid.tick(&measured, &control.scaler_goal, &status.thresholds, dt);

                    if let Err(e) = device.set_thresholds(&new_thresholds) {
                        tracing::warn!("failed to write thresholds: {e}");
                    }

                    let snapshot = StatusSnapshot { status, new_thresholds, pid: *pid.state() };
                    if !ring.push(snapshot, &shutdown) {
                        break;
                    }

                    last_mon = now;
                }
                Err(e) => {
                    tracing::warn!("failed to read device status: {e}");
                }
            }
        }

        let sw_trigger_interval = Duration::from_secs_f64(control.sw_trigger_interval.max(0.0));
        let since_swtrig = now.duration_since(last_swtrig);
        if since_swtrig >= sw_trigger_interval {
            if let Err(e) = device.sw_trigger() {
                tracing::warn!("failed to issue software trigger: {e}");
            }
            last_swtrig = now;
        }

        let remaining_mon = monitor_interval.saturating_sub(now.duration_since(last_mon));
        let remaining_sw = sw_trigger_interval.saturating_sub(now.duration_since(last_swtrig));
        let sleep_for = remaining_mon.min(remaining_sw).min(Duration::from_millis(MONITOR_MAX_SLEEP_MS));
        std::thread::sleep(sleep_for);
    }

    tracing::info!("monitor worker exiting");
}

/// Rebuild the PID controller after a config reload: gains and formula
/// may have changed, and accumulators must reset per the reload contract.
pub fn rebuild_pid_on_reload(control: &crate::config::ControlConfig) -> PidController {
    PidController::new(
        control.k_p,
        control.k_i,
        control.k_d,
        control.pid_formula,
        control.max_threshold_increase,
        control.min_threshold,
    )
}
