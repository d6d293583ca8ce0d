//! Core data entities shared across the acquisition pipeline.
//!
//! Slot types that travel through a [`crate::ring::RingBuffer`] are plain,
//! fixed-size, `Copy` structs — no heap pointers — so the ring's raw
//! volatile reads/writes never have to reason about drop semantics.

use serde::{Deserialize, Serialize};

use crate::constants::{EVENT_BATCH_BURST, NUM_BEAMS};

/// Upper bound on waveform length a single event can carry. The
/// configured `waveform_length` at runtime must not exceed this; the
/// supervisor validates that at config-load time.
pub const MAX_WAVEFORM_SAMPLES: usize = 2048;

/// Per-event header: sequence number, beam, trigger time and mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub seq: u64,
    pub beam: u8,
    pub timestamp_ns: u64,
    pub trigger_mask: u32,
}

impl Default for Header {
    fn default() -> Self {
        Self { seq: 0, beam: 0, timestamp_ns: 0, trigger_mask: 0 }
    }
}

/// A single triggered waveform event: a header plus its sample buffer.
/// `nsamples` gives the valid prefix of `samples`; the rest is padding.
#[derive(Clone, Copy)]
pub struct Event {
    pub header: Header,
    pub samples: [i16; MAX_WAVEFORM_SAMPLES],
    pub nsamples: u16,
}

impl Default for Event {
    fn default() -> Self {
        Self { header: Header::default(), samples: [0i16; MAX_WAVEFORM_SAMPLES], nsamples: 0 }
    }
}

impl Event {
    pub fn samples(&self) -> &[i16] {
        &self.samples[..self.nsamples as usize]
    }
}

/// One acquisition ring slot: up to [`EVENT_BATCH_BURST`] phased-array
/// events filled by a single device read, plus an optional surface
/// (above-ground auxiliary channel) pair.
#[derive(Clone, Copy)]
pub struct EventBatch {
    pub events: [Event; EVENT_BATCH_BURST],
    pub nfilled: usize,
    pub surface: Option<Event>,
}

impl Default for EventBatch {
    fn default() -> Self {
        Self { events: [Event::default(); EVENT_BATCH_BURST], nfilled: 0, surface: None }
    }
}

impl EventBatch {
    pub fn filled(&self) -> &[Event] {
        &self.events[..self.nfilled]
    }

    pub fn clear(&mut self) {
        self.nfilled = 0;
        self.surface = None;
    }
}

/// Raw device status read on a monitor tick: per-beam scalers, the
/// thresholds currently programmed on the device, and sampled
/// housekeeping.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceStatus {
    pub scaler_slow: [u32; NUM_BEAMS],
    pub scaler_fast: [u32; NUM_BEAMS],
    pub scaler_slow_gated: [u32; NUM_BEAMS],
    pub thresholds: [u32; NUM_BEAMS],
    pub housekeeping_temp_c: f32,
    pub unix_time: u64,
}

/// Per-beam PID controller state, snapshotted by value into every
/// [`StatusSnapshot`] for diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct PidState {
    pub k_p: f64,
    pub k_i: f64,
    pub k_d: f64,
    pub accumulated_error: [f64; NUM_BEAMS],
    pub last_measured_rate: [f64; NUM_BEAMS],
    pub iterations: u64,
}

impl Default for PidState {
    fn default() -> Self {
        Self {
            k_p: 0.0,
            k_i: 0.0,
            k_d: 0.0,
            accumulated_error: [0.0; NUM_BEAMS],
            last_measured_rate: [0.0; NUM_BEAMS],
            iterations: 0,
        }
    }
}

/// One monitor ring slot: the status just read, the thresholds computed
/// and written back this tick, and a diagnostic copy of the PID state.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusSnapshot {
    pub status: DeviceStatus,
    pub new_thresholds: [u32; NUM_BEAMS],
    pub pid: PidState,
}

/// Fixed-size, on-disk/mmap shape of the persisted threshold snapshot.
/// Exactly `sizeof(StatusRecord)` bytes are allocated for the backing
/// file; `format_version` lets a future layout change be detected by
/// external diagnostic readers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[repr(C)]
pub struct StatusRecord {
    pub format_version: u32,
    pub unix_time: u64,
    pub thresholds: [u32; NUM_BEAMS],
}

impl Default for StatusRecord {
    fn default() -> Self {
        Self { format_version: 1, unix_time: 0, thresholds: [0; NUM_BEAMS] }
    }
}

impl StatusRecord {
    /// Byte size of the fixed-size record as persisted on disk.
    pub const ENCODED_SIZE: usize = 4 + 8 + NUM_BEAMS * 4;

    pub fn from_snapshot(snapshot: &StatusSnapshot, unix_time: u64) -> Self {
        Self { format_version: 1, unix_time, thresholds: snapshot.new_thresholds }
    }
}

/// Wire DTOs and the `serialize_event`/`serialize_header`/`serialize_status`
/// boundary named (but not specified) by the acquisition core. These are
/// placeholder record formats: swapping them for the detector's real
/// on-disk format only touches this module.
pub mod wire {
    use super::*;
    use crate::error::{AcqError, Result};

    #[derive(Serialize, Deserialize)]
    pub struct HeaderRecord {
        pub seq: u64,
        pub beam: u8,
        pub timestamp_ns: u64,
        pub trigger_mask: u32,
    }

    impl From<&Header> for HeaderRecord {
        fn from(h: &Header) -> Self {
            Self { seq: h.seq, beam: h.beam, timestamp_ns: h.timestamp_ns, trigger_mask: h.trigger_mask }
        }
    }

    #[derive(Serialize, Deserialize)]
    pub struct EventRecord {
        pub header: HeaderRecord,
        pub samples: Vec<i16>,
    }

    impl From<&Event> for EventRecord {
        fn from(e: &Event) -> Self {
            Self { header: HeaderRecord::from(&e.header), samples: e.samples().to_vec() }
        }
    }

    /// Serialize an event's waveform body (without its header).
    pub fn serialize_event(event: &Event) -> Result<Vec<u8>> {
        let record = EventRecord::from(event);
        bincode::serialize(&record.samples)
            .map_err(|e| AcqError::serialization(format!("event body encode failed: {e}")))
    }

    /// Serialize an event's header.
    pub fn serialize_header(event: &Event) -> Result<Vec<u8>> {
        let record = HeaderRecord::from(&event.header);
        bincode::serialize(&record)
            .map_err(|e| AcqError::serialization(format!("header encode failed: {e}")))
    }

    /// Serialize a status record.
    pub fn serialize_status(status: &StatusRecord) -> Result<Vec<u8>> {
        bincode::serialize(status)
            .map_err(|e| AcqError::serialization(format!("status encode failed: {e}")))
    }
}
