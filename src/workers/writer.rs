//! Component F: the writer worker.
//!
//! Owns the consumer end of both ring buffers and the filesystem for the
//! current run. Drains both rings, batches records into per-kind
//! rotating gzip files, and keeps the persisted threshold snapshot in
//! sync.

use std::fs::File;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use flate2::write::GzEncoder;
use flate2::Compression;
use parking_lot::Mutex;

use crate::config::Config;
use crate::constants::{WRITER_IDLE_SLEEP_MS, WRITER_LOW_OCCUPANCY_SLEEP_MS};
use crate::error::Result;
use crate::model::{wire, EventBatch, StatusRecord, StatusSnapshot};
use crate::ring::RingBuffer;
use crate::run_context::RunContext;
use crate::signals;
use crate::status_store::StatusStore;

/// A single rotating, gzip-compressed output file of one record kind.
/// Filename is fixed at open time from the first record's key (a
/// sequence number for events/headers, a unix timestamp for status);
/// writes go to a `.gz.tmp` path, atomically renamed to `.gz` on close.
struct RotatingWriter {
    dir: PathBuf,
    kind: &'static str,
    per_file: usize,
    count_in_file: usize,
    open: Option<(GzEncoder<File>, PathBuf, PathBuf)>,
}

impl RotatingWriter {
    fn new(dir: PathBuf, kind: &'static str, per_file: usize) -> Self {
        Self { dir, kind, per_file: per_file.max(1), count_in_file: 0, open: None }
    }

    fn write_record(&mut self, key: u64, bytes: &[u8]) -> Result<()> {
        if self.open.is_none() {
            let filename = format!("{key}.{}.gz", self.kind);
            let final_path = self.dir.join(&filename);
            let tmp_path = self.dir.join(format!("{filename}.tmp"));
            let file = File::create(&tmp_path)?;
            let encoder = GzEncoder::new(file, Compression::default());
            self.open = Some((encoder, tmp_path, final_path));
            self.count_in_file = 0;
        }

        if let Some((encoder, _, _)) = self.open.as_mut() {
            encoder.write_all(bytes)?;
        }
        self.count_in_file += 1;

        if self.count_in_file >= self.per_file {
            self.close();
        }
        Ok(())
    }

    /// Close the current file (if any): finish the gzip stream and
    /// atomically rename `.gz.tmp` to `.gz`. gzclose failure is logged
    /// but not fatal, per the writer's error policy.
    fn close(&mut self) {
        let Some((encoder, tmp_path, final_path)) = self.open.take() else { return };
        match encoder.finish() {
            Ok(_file) => {
                if let Err(e) = std::fs::rename(&tmp_path, &final_path) {
                    tracing::warn!("rename {} -> {} failed: {e}", tmp_path.display(), final_path.display());
                }
            }
            Err(e) => {
                tracing::warn!("gzclose failed for {}: {e}", tmp_path.display());
            }
        }
        self.count_in_file = 0;
    }
}

struct Totals {
    events_written: u64,
    headers_written: u64,
    status_written: u64,
}

pub fn run(
    acq_ring: Arc<RingBuffer<EventBatch>>,
    mon_ring: Arc<RingBuffer<StatusSnapshot>>,
    shutdown: Arc<AtomicBool>,
    config: Arc<Mutex<Config>>,
    run_ctx: RunContext,
    mut status_store: Option<StatusStore>,
) {
    if let Err(e) = signals::mask_current_thread() {
        tracing::warn!("writer thread: failed to mask signals: {e}");
    }

    let output = config.lock().output.clone();

    let mut event_writer = RotatingWriter::new(run_ctx.subdir("event"), "event", output.events_per_file);
    let mut header_writer = RotatingWriter::new(run_ctx.subdir("header"), "header", output.events_per_file);
    let mut surface_event_writer =
        RotatingWriter::new(run_ctx.subdir("event"), "surface_event", output.surface_events_per_file.max(1));
    let mut surface_header_writer =
        RotatingWriter::new(run_ctx.subdir("header"), "surface_header", output.surface_events_per_file.max(1));
    let mut status_writer = RotatingWriter::new(run_ctx.subdir("status"), "status", output.status_per_file);

    let mut totals = Totals { events_written: 0, headers_written: 0, status_written: 0 };
    let mut last_status: Option<StatusSnapshot> = None;
    let mut last_print = Instant::now();
    let start = Instant::now();

    tracing::info!("writer worker started, run {}", run_ctx.run_number);

    loop {
        let print_interval = Duration::from_secs(config.lock().output.print_interval.max(1));

        let popped_event = acq_ring.try_pop();
        let popped_status = mon_ring.try_pop();

        if last_print.elapsed() >= print_interval {
            tracing::info!(
                elapsed_s = start.elapsed().as_secs_f64(),
                events_written = totals.events_written,
                headers_written = totals.headers_written,
                status_written = totals.status_written,
                acq_ring_occupancy = acq_ring.occupancy(),
                mon_ring_occupancy = mon_ring.occupancy(),
                "writer summary"
            );
            last_print = Instant::now();
        }

        let nothing_popped = popped_event.is_none() && popped_status.is_none();
        if nothing_popped {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            std::thread::sleep(Duration::from_millis(WRITER_IDLE_SLEEP_MS));
            continue;
        }

        if let Some(batch) = popped_event {
            for event in batch.filled() {
                let seq = event.header.seq;
                if let Ok(body) = wire::serialize_event(event) {
                    if event_writer.write_record(seq, &body).is_ok() {
                        totals.events_written += 1;
                    }
                }
                if let Ok(header_bytes) = wire::serialize_header(event) {
                    if header_writer.write_record(seq, &header_bytes).is_ok() {
                        totals.headers_written += 1;
                    }
                }
            }
            if let Some(surface) = batch.surface.as_ref() {
                let seq = surface.header.seq;
                if let Ok(body) = wire::serialize_event(surface) {
                    let _ = surface_event_writer.write_record(seq, &body);
                }
                if let Ok(header_bytes) = wire::serialize_header(surface) {
                    let _ = surface_header_writer.write_record(seq, &header_bytes);
                }
            }
        }

        if let Some(snapshot) = popped_status {
            let unix_time = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
            let record = StatusRecord::from_snapshot(&snapshot, unix_time);
            if let Ok(bytes) = wire::serialize_status(&record) {
                if status_writer.write_record(unix_time, &bytes).is_ok() {
                    totals.status_written += 1;
                }
            }
            last_status = Some(snapshot);

            if let Some(store) = status_store.as_mut() {
                if let Err(e) = store.write(&record) {
                    tracing::warn!("failed to update persisted status snapshot: {e}");
                } else if let Err(e) = store.sync_async() {
                    tracing::warn!("async msync of status snapshot failed: {e}");
                }
            }
        }

        if !shutdown.load(Ordering::Relaxed) && acq_ring.occupancy() * 3 < acq_ring.capacity() {
            std::thread::sleep(Duration::from_millis(WRITER_LOW_OCCUPANCY_SLEEP_MS));
        }
    }

    event_writer.close();
    header_writer.close();
    surface_event_writer.close();
    surface_header_writer.close();
    status_writer.close();

    if let Some(store) = status_store.as_ref() {
        if let Err(e) = store.sync() {
            tracing::warn!("final status sync failed: {e}");
        }
    }

    let _ = last_status;
    tracing::info!("writer worker exiting, run {}", run_ctx.run_number);
}
