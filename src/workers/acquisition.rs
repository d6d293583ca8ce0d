//! Component D: the acquisition worker.
//!
//! Owns the acquisition ring's producer end. Fills one event ring buffer
//! from the device's blocking multi-event read; never exits on its own
//! except via shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::cpu;
use crate::device::Device;
use crate::model::EventBatch;
use crate::ring::RingBuffer;
use crate::signals;

/// Run the acquisition loop until `shutdown` is observed. Intended to be
/// the body of a dedicated `std::thread::spawn` closure.
pub fn run(
    device: Arc<dyn Device>,
    ring: Arc<RingBuffer<EventBatch>>,
    shutdown: Arc<AtomicBool>,
    realtime_priority: i32,
    cpu_core: Option<usize>,
) {
    if let Err(e) = signals::mask_current_thread() {
        tracing::warn!("acquisition thread: failed to mask signals: {e}");
    }

    if realtime_priority > 0 {
        if let Err(e) = cpu::set_realtime_priority(realtime_priority) {
            tracing::warn!("acquisition thread: failed to set realtime priority: {e}");
        }
    }
    if let Some(core) = cpu_core {
        if let Err(e) = cpu::pin_to_cpu(core) {
            tracing::warn!("acquisition thread: failed to pin to cpu {core}: {e}");
        }
    }

    tracing::info!("acquisition worker started");

    while !shutdown.load(Ordering::Relaxed) {
        let Some(slot) = ring.get_slot(&shutdown) else {
            break;
        };

        slot.nfilled = 0;
        loop {
            match device.wait_for_and_read_multiple_events(slot) {
                Ok(()) => {
                    if slot.nfilled > 0 || shutdown.load(Ordering::Relaxed) {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!("transient device read error, retrying: {e}");
                }
            }
        }

        ring.commit();
    }

    tracing::info!("acquisition worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MockDevice;
    use crate::model::DeviceStatus;
    use std::time::Duration;

    #[test]
    fn test_acquisition_worker_commits_delivered_batches() {
        let device = Arc::new(MockDevice::new(DeviceStatus::default(), [0; 15]));
        let mut batch = EventBatch::default();
        batch.nfilled = 1;
        device.enqueue_batch(batch);

        let ring = Arc::new(RingBuffer::<EventBatch>::new(4).unwrap());
        let shutdown = Arc::new(AtomicBool::new(false));

        let handle = {
            let device = device.clone() as Arc<dyn Device>;
            let ring = ring.clone();
            let shutdown = shutdown.clone();
            std::thread::spawn(move || run(device, ring, shutdown, 0, None))
        };

        // Wait for the single enqueued batch to land, then shut down.
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while ring.occupancy() == 0 && std::time::Instant::now() < deadline {
            std::thread::yield_now();
        }
        assert_eq!(ring.occupancy(), 1);

        shutdown.store(true, Ordering::Relaxed);
        device.cancel_wait();
        handle.join().unwrap();
    }

    #[test]
    fn test_acquisition_worker_exits_promptly_on_shutdown_mid_block() {
        let device = Arc::new(MockDevice::new(DeviceStatus::default(), [0; 15]));
        let ring = Arc::new(RingBuffer::<EventBatch>::new(4).unwrap());
        let shutdown = Arc::new(AtomicBool::new(false));

        let handle = {
            let device = device.clone() as Arc<dyn Device>;
            let ring = ring.clone();
            let shutdown = shutdown.clone();
            std::thread::spawn(move || run(device, ring, shutdown, 0, None))
        };

        std::thread::sleep(Duration::from_millis(50));
        shutdown.store(true, Ordering::Relaxed);
        device.cancel_wait();

        // Must join promptly; cancel_wait is the only unblock channel.
        handle.join().unwrap();
    }
}
