//! Daemon configuration: TOML-backed, nested `control`/`device`/`output`
//! blocks mirroring the original libconfig layout one-to-one.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::NUM_BEAMS;
use crate::error::{AcqError, Result};
use crate::pid::PidFormula;

/// Environment variable naming the config root directory.
pub const CONFIG_DIR_ENV: &str = "CONFIG_DIR";
/// Well-known config filename inside the config root.
pub const CONFIG_FILE_NAME: &str = "acq.cfg";

fn default_scaler_goal() -> [f64; NUM_BEAMS] {
    [1.0; NUM_BEAMS]
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    #[serde(default = "default_scaler_goal")]
    pub scaler_goal: [f64; NUM_BEAMS],
    #[serde(default = "default_trigger_mask")]
    pub trigger_mask: u32,
    #[serde(default = "default_channel_mask")]
    pub channel_mask: u32,
    #[serde(default = "default_k_p")]
    pub k_p: f64,
    #[serde(default = "default_k_i")]
    pub k_i: f64,
    #[serde(default)]
    pub k_d: f64,
    #[serde(default = "default_max_threshold_increase")]
    pub max_threshold_increase: u32,
    #[serde(default)]
    pub min_threshold: u32,
    #[serde(default = "default_one_f64")]
    pub monitor_interval: f64,
    #[serde(default = "default_one_f64")]
    pub sw_trigger_interval: f64,
    #[serde(default = "default_true")]
    pub enable_phased_trigger: bool,
    #[serde(default = "default_secs_before_phased_trigger")]
    pub secs_before_phased_trigger: u64,
    #[serde(default = "default_fast_scaler_weight")]
    pub fast_scaler_weight: f64,
    #[serde(default = "default_slow_scaler_weight")]
    pub slow_scaler_weight: f64,
    #[serde(default = "default_n_fast_scaler_avg")]
    pub n_fast_scaler_avg: usize,
    #[serde(default)]
    pub subtract_gated: bool,
    #[serde(default = "default_status_save_file")]
    pub status_save_file: PathBuf,
    #[serde(default = "default_true")]
    pub load_thresholds_from_status_file: bool,
    #[serde(default)]
    pub pid_formula: PidFormula,
}

fn default_trigger_mask() -> u32 {
    0xe
}
fn default_channel_mask() -> u32 {
    0xf
}
fn default_k_p() -> f64 {
    10.0
}
fn default_k_i() -> f64 {
    10.0
}
fn default_max_threshold_increase() -> u32 {
    200
}
fn default_one_f64() -> f64 {
    1.0
}
fn default_secs_before_phased_trigger() -> u64 {
    20
}
fn default_fast_scaler_weight() -> f64 {
    0.7
}
fn default_slow_scaler_weight() -> f64 {
    0.3
}
fn default_n_fast_scaler_avg() -> usize {
    20
}
fn default_status_save_file() -> PathBuf {
    PathBuf::from("status.dat")
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            scaler_goal: default_scaler_goal(),
            trigger_mask: default_trigger_mask(),
            channel_mask: default_channel_mask(),
            k_p: default_k_p(),
            k_i: default_k_i(),
            k_d: 0.0,
            max_threshold_increase: default_max_threshold_increase(),
            min_threshold: 0,
            monitor_interval: default_one_f64(),
            sw_trigger_interval: default_one_f64(),
            enable_phased_trigger: true,
            secs_before_phased_trigger: default_secs_before_phased_trigger(),
            fast_scaler_weight: default_fast_scaler_weight(),
            slow_scaler_weight: default_slow_scaler_weight(),
            n_fast_scaler_avg: default_n_fast_scaler_avg(),
            subtract_gated: false,
            status_save_file: default_status_save_file(),
            load_thresholds_from_status_file: true,
            pid_formula: PidFormula::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default = "default_spi_devices")]
    pub spi_devices: [PathBuf; 2],
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    #[serde(default = "default_waveform_length")]
    pub waveform_length: usize,
    #[serde(default)]
    pub surface_waveform_length: usize,
    #[serde(default = "default_pretrigger")]
    pub pretrigger: u32,
    #[serde(default)]
    pub surface_pretrigger: u32,
    #[serde(default)]
    pub calpulser_state: u32,
    #[serde(default = "default_true")]
    pub enable_trigout: bool,
    #[serde(default)]
    pub trigout_width: u32,
    #[serde(default)]
    pub disable_trigout_on_exit: bool,
    #[serde(default = "default_spi_clock")]
    pub spi_clock: u32,
    #[serde(default = "default_true")]
    pub apply_attenuations: bool,
    #[serde(default)]
    pub attenuation: Vec<Vec<u32>>,
    #[serde(default = "default_channel_read_mask")]
    pub channel_read_mask: [u32; 2],
    #[serde(default)]
    pub trig_delays: Vec<u32>,
    #[serde(default)]
    pub poll_usecs: u64,
    #[serde(default)]
    pub alignment_command: Option<String>,
}

fn default_spi_devices() -> [PathBuf; 2] {
    [PathBuf::from("/dev/spidev0.0"), PathBuf::from("/dev/spidev0.1")]
}
fn default_buffer_capacity() -> usize {
    100
}
fn default_waveform_length() -> usize {
    384
}
fn default_pretrigger() -> u32 {
    4
}
fn default_spi_clock() -> u32 {
    20
}
fn default_channel_read_mask() -> [u32; 2] {
    [0xf, 0x7]
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            spi_devices: default_spi_devices(),
            buffer_capacity: default_buffer_capacity(),
            waveform_length: default_waveform_length(),
            surface_waveform_length: 0,
            pretrigger: default_pretrigger(),
            surface_pretrigger: 0,
            calpulser_state: 0,
            enable_trigout: true,
            trigout_width: 0,
            disable_trigout_on_exit: false,
            spi_clock: default_spi_clock(),
            apply_attenuations: true,
            attenuation: Vec::new(),
            channel_read_mask: default_channel_read_mask(),
            trig_delays: Vec::new(),
            poll_usecs: 0,
            alignment_command: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_run_file")]
    pub run_file: PathBuf,
    #[serde(default = "default_output_directory")]
    pub output_directory: PathBuf,
    #[serde(default = "default_print_interval")]
    pub print_interval: u64,
    #[serde(default = "default_run_length")]
    pub run_length: u64,
    #[serde(default = "default_events_per_file")]
    pub events_per_file: usize,
    #[serde(default = "default_status_per_file")]
    pub status_per_file: usize,
    #[serde(default)]
    pub surface_events_per_file: usize,
    #[serde(default)]
    pub realtime_priority: i32,
    #[serde(default)]
    pub realtime_cpu_core: Option<usize>,
    #[serde(default)]
    pub copy_paths_to_rundir: String,
    #[serde(default)]
    pub copy_configs: bool,
}

fn default_run_file() -> PathBuf {
    PathBuf::from("run_number")
}
fn default_output_directory() -> PathBuf {
    PathBuf::from("data")
}
fn default_print_interval() -> u64 {
    5
}
fn default_run_length() -> u64 {
    7200
}
fn default_events_per_file() -> usize {
    1000
}
fn default_status_per_file() -> usize {
    200
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            run_file: default_run_file(),
            output_directory: default_output_directory(),
            print_interval: default_print_interval(),
            run_length: default_run_length(),
            events_per_file: default_events_per_file(),
            status_per_file: default_status_per_file(),
            surface_events_per_file: 0,
            realtime_priority: 0,
            realtime_cpu_core: None,
            copy_paths_to_rundir: String::new(),
            copy_configs: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Resolve the config file path: an explicit override, else
    /// `$CONFIG_DIR/acq.cfg`, falling back to `cfg/acq.cfg` in the
    /// current working directory.
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        let root = std::env::var(CONFIG_DIR_ENV).map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("cfg"));
        root.join(CONFIG_FILE_NAME)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| AcqError::config(format!("cannot read config {}: {e}", path.display())))?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| AcqError::config(format!("invalid config syntax: {e}")))
    }

    /// Fields that may only be changed by a full restart, never by
    /// SIGUSR1 reload: spi devices, buffer capacity, and the fast-scaler
    /// window length (which sizes the monitor's own internal buffers).
    pub fn apply_reloadable_fields(&mut self, new: &Config) {
        let preserved_spi = self.device.spi_devices.clone();
        let preserved_capacity = self.device.buffer_capacity;
        let preserved_avg = self.control.n_fast_scaler_avg;

        *self = new.clone();

        self.device.spi_devices = preserved_spi;
        self.device.buffer_capacity = preserved_capacity;
        self.control.n_fast_scaler_avg = preserved_avg;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_documented_defaults() {
        let cfg = Config::parse("").unwrap();
        assert_eq!(cfg.control.k_p, 10.0);
        assert_eq!(cfg.control.k_i, 10.0);
        assert_eq!(cfg.control.k_d, 0.0);
        assert_eq!(cfg.control.max_threshold_increase, 200);
        assert_eq!(cfg.device.buffer_capacity, 100);
        assert_eq!(cfg.device.waveform_length, 384);
        assert_eq!(cfg.output.run_length, 7200);
        assert_eq!(cfg.output.events_per_file, 1000);
        assert_eq!(cfg.output.status_per_file, 200);
        assert_eq!(cfg.control.pid_formula, PidFormula::Legacy);
    }

    #[test]
    fn test_partial_override_keeps_other_defaults() {
        let cfg = Config::parse("[control]\nk_p = 500.0\n").unwrap();
        assert_eq!(cfg.control.k_p, 500.0);
        assert_eq!(cfg.control.k_i, 10.0);
    }

    #[test]
    fn test_invalid_syntax_is_rejected() {
        assert!(Config::parse("not valid toml [[[").is_err());
    }

    #[test]
    fn test_reload_preserves_structural_fields() {
        let mut cfg = Config::default();
        cfg.device.buffer_capacity = 256;
        cfg.control.n_fast_scaler_avg = 50;

        let mut new_cfg = Config::default();
        new_cfg.control.scaler_goal[0] = 5.0;
        new_cfg.device.buffer_capacity = 4096; // attempted structural change
        new_cfg.control.n_fast_scaler_avg = 999;

        cfg.apply_reloadable_fields(&new_cfg);

        assert_eq!(cfg.control.scaler_goal[0], 5.0);
        assert_eq!(cfg.device.buffer_capacity, 256);
        assert_eq!(cfg.control.n_fast_scaler_avg, 50);
    }

    #[test]
    fn test_resolve_path_prefers_explicit_override() {
        let explicit = PathBuf::from("/tmp/custom.cfg");
        assert_eq!(Config::resolve_path(Some(&explicit)), explicit);
    }
}
