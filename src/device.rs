//! The hardware device boundary.
//!
//! Opening the real SPI bus is out of scope for this crate (see the
//! daemon's purpose statement); this module defines the trait the
//! acquisition core actually programs against, plus a [`MockDevice`]
//! implementing it for tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::config::{ControlConfig, DeviceConfig};
use crate::constants::NUM_BEAMS;
use crate::error::Result;
use crate::model::{DeviceStatus, EventBatch};

/// Operations the acquisition core calls on the hardware device driver.
/// A real implementation wraps the SPI link to the master/slave boards;
/// it is not part of this crate.
///
/// §6 of the interface lists many individual device calls (spi clock,
/// pretrigger, attenuation, channel/read masks, trig delays, surface
/// trigger parameters, ...) whose wire encoding is itself external and
/// unspecified. Rather than inventing a wire format for each, this trait
/// bundles them behind one `apply_full_configuration` call the
/// supervisor makes at startup and again after a config reload.
pub trait Device: Send + Sync {
    /// Block until at least one event is available or `cancel_wait` is
    /// called, then fill as many of `batch`'s slots as are ready.
    /// Transient I/O errors are retried by the caller; this call itself
    /// never blocks past a `cancel_wait`.
    fn wait_for_and_read_multiple_events(&self, batch: &mut EventBatch) -> Result<()>;

    /// Unblock any thread currently inside
    /// `wait_for_and_read_multiple_events`.
    fn cancel_wait(&self);

    /// Read full device status (scalers, current thresholds, housekeeping).
    fn read_status(&self) -> Result<DeviceStatus>;

    /// Program new per-beam thresholds.
    fn set_thresholds(&self, thresholds: &[u32; NUM_BEAMS]) -> Result<()>;

    /// Issue a software trigger.
    fn sw_trigger(&self) -> Result<()>;

    /// Enable or disable the phased (beamforming) hardware trigger.
    fn set_phased_trigger_enabled(&self, enabled: bool) -> Result<()>;

    /// Set the on-board calibration pulser state; used on shutdown to
    /// disable it unconditionally.
    fn set_calpulser_state(&self, state: u32) -> Result<()>;

    /// Enable or disable the trigger output line.
    fn set_trigout_enabled(&self, enabled: bool) -> Result<()>;

    /// Reset the device to a known state (used before alignment retries).
    fn reset(&self) -> Result<()>;

    /// Apply the full recognized device configuration (§6): spi clock,
    /// waveform/pretrigger lengths, attenuations, channel/read masks,
    /// trigger delays, surface-trigger parameters, and so on.
    fn apply_full_configuration(&self, device: &DeviceConfig, control: &ControlConfig) -> Result<()>;
}

/// Open the real master/slave SPI device pair described by `device`.
///
/// The serial-bus driver itself is, per this crate's scope, an external
/// collaborator: it is not implemented here. Supervisor startup treats
/// the resulting error as fatal (exit 1), matching the documented
/// "device open failure" policy. A deployment that links a real driver
/// swaps this function out; the acquisition core only ever depends on
/// the [`Device`] trait above.
pub fn open_hardware_device(device: &DeviceConfig) -> Result<std::sync::Arc<dyn Device>> {
    Err(crate::error::AcqError::device(format!(
        "hardware SPI driver for {} / {} is not linked into this build; \
         this crate implements the acquisition core only",
        device.spi_devices[0].display(),
        device.spi_devices[1].display(),
    )))
}

/// In-memory [`Device`] implementation for tests: a scripted sequence of
/// `EventBatch`es plus a constant or scripted status, with a real
/// `cancel_wait` so shutdown-under-blocking-read scenarios can be
/// exercised.
pub struct MockDevice {
    inner: Mutex<MockState>,
    cancelled: AtomicBool,
}

struct MockState {
    pending_batches: VecDeque<EventBatch>,
    status: DeviceStatus,
    thresholds: [u32; NUM_BEAMS],
    phased_trigger_enabled: bool,
}

impl MockDevice {
    pub fn new(initial_status: DeviceStatus, initial_thresholds: [u32; NUM_BEAMS]) -> Self {
        Self {
            inner: Mutex::new(MockState {
                pending_batches: VecDeque::new(),
                status: initial_status,
                thresholds: initial_thresholds,
                phased_trigger_enabled: false,
            }),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Queue a batch to be returned, in FIFO order, by successive
    /// `wait_for_and_read_multiple_events` calls.
    pub fn enqueue_batch(&self, batch: EventBatch) {
        self.inner.lock().unwrap().pending_batches.push_back(batch);
    }

    pub fn current_thresholds(&self) -> [u32; NUM_BEAMS] {
        self.inner.lock().unwrap().thresholds
    }

    pub fn phased_trigger_enabled(&self) -> bool {
        self.inner.lock().unwrap().phased_trigger_enabled
    }
}

impl Device for MockDevice {
    fn wait_for_and_read_multiple_events(&self, batch: &mut EventBatch) -> Result<()> {
        loop {
            {
                let mut state = self.inner.lock().unwrap();
                if let Some(next) = state.pending_batches.pop_front() {
                    *batch = next;
                    return Ok(());
                }
            }
            if self.cancelled.load(Ordering::Relaxed) {
                batch.clear();
                return Ok(());
            }
            std::thread::yield_now();
        }
    }

    fn cancel_wait(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    fn read_status(&self) -> Result<DeviceStatus> {
        let state = self.inner.lock().unwrap();
        let mut status = state.status;
        status.thresholds = state.thresholds;
        Ok(status)
    }

    fn set_thresholds(&self, thresholds: &[u32; NUM_BEAMS]) -> Result<()> {
        self.inner.lock().unwrap().thresholds = *thresholds;
        Ok(())
    }

    fn sw_trigger(&self) -> Result<()> {
        Ok(())
    }

    fn set_phased_trigger_enabled(&self, enabled: bool) -> Result<()> {
        self.inner.lock().unwrap().phased_trigger_enabled = enabled;
        Ok(())
    }

    fn set_calpulser_state(&self, _state: u32) -> Result<()> {
        Ok(())
    }

    fn set_trigout_enabled(&self, _enabled: bool) -> Result<()> {
        Ok(())
    }

    fn reset(&self) -> Result<()> {
        self.cancelled.store(false, Ordering::Relaxed);
        Ok(())
    }

    fn apply_full_configuration(&self, _device: &DeviceConfig, _control: &ControlConfig) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_device_delivers_queued_batch() {
        let device = MockDevice::new(DeviceStatus::default(), [0; NUM_BEAMS]);
        let mut batch = EventBatch::default();
        batch.nfilled = 1;
        device.enqueue_batch(batch);

        let mut out = EventBatch::default();
        device.wait_for_and_read_multiple_events(&mut out).unwrap();
        assert_eq!(out.nfilled, 1);
    }

    #[test]
    fn test_cancel_wait_unblocks_empty_read() {
        let device = MockDevice::new(DeviceStatus::default(), [0; NUM_BEAMS]);
        device.cancel_wait();

        let mut out = EventBatch::default();
        device.wait_for_and_read_multiple_events(&mut out).unwrap();
        assert_eq!(out.nfilled, 0);
    }

    #[test]
    fn test_set_thresholds_round_trips_through_status() {
        let device = MockDevice::new(DeviceStatus::default(), [0; NUM_BEAMS]);
        let mut thresholds = [0u32; NUM_BEAMS];
        thresholds[0] = 1234;
        device.set_thresholds(&thresholds).unwrap();

        let status = device.read_status().unwrap();
        assert_eq!(status.thresholds[0], 1234);
    }
}
