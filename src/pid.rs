//! Per-beam PID threshold controller.

use serde::{Deserialize, Serialize};

use crate::constants::NUM_BEAMS;
use crate::model::PidState;

/// Selects the threshold-delta formula. `Legacy` reproduces the original
/// daemon's arithmetic, where the last two PID terms are multiplied
/// rather than summed — almost certainly a historical bug, but PID
/// constants in the field are tuned against it, so it ships as the
/// default. `Classic` is the textbook `k_p*e + k_i*ie + k_d*de` sum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PidFormula {
    #[default]
    Legacy,
    Classic,
}

pub struct PidController {
    state: PidState,
    formula: PidFormula,
    max_threshold_increase: u32,
    min_threshold: u32,
}

impl PidController {
    pub fn new(k_p: f64, k_i: f64, k_d: f64, formula: PidFormula, max_threshold_increase: u32, min_threshold: u32) -> Self {
        Self {
            state: PidState { k_p, k_i, k_d, ..PidState::default() },
            formula,
            max_threshold_increase,
            min_threshold,
        }
    }

    pub fn state(&self) -> &PidState {
        &self.state
    }

    /// Re-initialize accumulated error and iteration count, keeping the
    /// configured gains. Called on config reload.
    pub fn reset(&mut self) {
        self.state.accumulated_error = [0.0; NUM_BEAMS];
        self.state.last_measured_rate = [0.0; NUM_BEAMS];
        self.state.iterations = 0;
    }

    /// Run one PID tick for every beam and return the new thresholds.
    ///
    /// `measured` is this tick's rate per beam, `goal` the configured
    /// target, `current_thresholds` the thresholds currently programmed
    /// on the device, `dt_seconds` the elapsed time since the previous
    /// tick (ignored, i.e. derivative term is 0, on the first tick).
    pub fn tick(
        &mut self,
        measured: &[f64; NUM_BEAMS],
        goal: &[f64; NUM_BEAMS],
        current_thresholds: &[u32; NUM_BEAMS],
        dt_seconds: f64,
    ) -> [u32; NUM_BEAMS] {
        let mut new_thresholds = [0u32; NUM_BEAMS];
        let first_tick = self.state.iterations == 0;

        for beam in 0..NUM_BEAMS {
            // Convention preserved from the latest source revision: error
            // is measured minus goal, so a rate above target pushes the
            // threshold up.
            let error = measured[beam] - goal[beam];

            let derivative = if first_tick || dt_seconds <= 0.0 {
                0.0
            } else {
                (measured[beam] - self.state.last_measured_rate[beam]) / dt_seconds
            };

            self.state.accumulated_error[beam] += error;
            let integral = self.state.accumulated_error[beam];

            let k_p = self.state.k_p;
            let k_i = self.state.k_i;
            let k_d = self.state.k_d;

            let delta = match self.formula {
                PidFormula::Legacy => k_p * error + k_i * integral * k_d * derivative,
                PidFormula::Classic => k_p * error + k_i * integral + k_d * derivative,
            };

            let clamped_delta = delta.clamp(
                -(self.max_threshold_increase as f64),
                self.max_threshold_increase as f64,
            );

            let raw_new = current_thresholds[beam] as f64 + clamped_delta;
            let floored = raw_new.max(self.min_threshold as f64);
            new_thresholds[beam] = floored.round().clamp(0.0, u32::MAX as f64) as u32;

            self.state.last_measured_rate[beam] = measured[beam];
        }

        self.state.iterations += 1;
        new_thresholds
    }
}
