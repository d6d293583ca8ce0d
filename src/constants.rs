//! Acquisition daemon constants.

/// Number of steered phased-array beams.
pub const NUM_BEAMS: usize = 15;

/// Hardware read burst: the maximum number of events the device may
/// deliver in a single blocking multi-event read.
pub const EVENT_BATCH_BURST: usize = 16;

/// Default ring buffer capacity (slots), used when `buffer_capacity` in
/// the device config is not a power of two and must be rounded up.
pub const DEFAULT_RING_BUFFER_CAPACITY: usize = 128;

/// Cache line size for alignment (64 bytes on most CPUs).
pub const CACHE_LINE_SIZE: usize = 64;

/// Number of cache lines to prefetch ahead of a slot access.
pub const CACHE_PREFETCH_LINES: usize = 4;

/// System page size, used to size the mmap-backed status file and
/// locked ring buffer allocations.
pub const PAGE_SIZE: usize = 4096;

/// Coarse supervisor wake interval (ms) for run-length/shutdown checks.
pub const SUPERVISOR_TICK_MS: u64 = 500;

/// Writer idle sleep when both rings were empty (ms).
pub const WRITER_IDLE_SLEEP_MS: u64 = 50;

/// Writer backoff sleep when the event ring is below a third of capacity (ms).
pub const WRITER_LOW_OCCUPANCY_SLEEP_MS: u64 = 25;

/// Monitor worker's maximum sleep between ticks (ms).
pub const MONITOR_MAX_SLEEP_MS: u64 = 100;

/// Bounded retry count for the external alignment command before startup
/// aborts.
pub const MAX_ALIGNMENT_ATTEMPTS: u32 = 3;

/// Delay between alignment-command retries (s).
pub const ALIGNMENT_RETRY_DELAY_SECS: u64 = 1;
