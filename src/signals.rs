//! Signal handling: installed once, on the supervisor thread only.
//!
//! `SIGUSR1` requests a configuration reload; `SIGINT`, `SIGTERM`,
//! `SIGUSR2`, and any other terminating signal request a graceful
//! shutdown. Worker threads never see these signals — they are masked
//! before a worker thread's closure starts running, mirroring the
//! original daemon's reliance on default signal-mask inheritance landing
//! all signals on the main thread.

use std::os::raw::c_int;
use std::sync::atomic::{AtomicBool, Ordering};

use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal};

use crate::error::Result;

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);
static RELOAD_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_signal(signum: c_int) {
    if signum == Signal::SIGUSR1 as c_int {
        RELOAD_REQUESTED.store(true, Ordering::Relaxed);
    } else {
        // SIGINT, SIGTERM, SIGUSR2, or anything else we were asked to
        // catch: graceful shutdown.
        SHUTDOWN_REQUESTED.store(true, Ordering::Relaxed);
    }
}

/// Install handlers for the signals this daemon services. Call once,
/// from the supervisor thread, before spawning workers.
pub fn install() -> Result<()> {
    let action = SigAction::new(SigHandler::Handler(handle_signal), SaFlags::empty(), SigSet::empty());
    unsafe {
        signal::sigaction(Signal::SIGINT, &action)?;
        signal::sigaction(Signal::SIGTERM, &action)?;
        signal::sigaction(Signal::SIGUSR1, &action)?;
        signal::sigaction(Signal::SIGUSR2, &action)?;
    }
    Ok(())
}

/// Block the serviced signals on the calling thread. Called at the top
/// of every worker thread closure (acquisition, monitor, writer) so only
/// the supervisor's thread ever observes them.
pub fn mask_current_thread() -> Result<()> {
    let mut set = SigSet::empty();
    set.add(Signal::SIGINT);
    set.add(Signal::SIGTERM);
    set.add(Signal::SIGUSR1);
    set.add(Signal::SIGUSR2);
    signal::pthread_sigmask(SigmaskHow::SIG_BLOCK, Some(&set), None)?;
    Ok(())
}

/// Whether a terminating signal has arrived since the daemon started.
pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::Relaxed)
}

/// Consume a pending reload request, if any. Returns `true` at most once
/// per `SIGUSR1` delivery.
pub fn take_reload_request() -> bool {
    RELOAD_REQUESTED.swap(false, Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reload_flag_is_consumed_once() {
        RELOAD_REQUESTED.store(true, Ordering::Relaxed);
        assert!(take_reload_request());
        assert!(!take_reload_request());
    }
}
