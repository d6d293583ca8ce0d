//! CPU affinity and real-time scheduling helpers for the acquisition thread.

use crate::error::{AcqError, Result};

#[cfg(target_os = "linux")]
pub fn pin_to_cpu(cpu_id: usize) -> Result<()> {
    use libc::{cpu_set_t, sched_setaffinity, CPU_SET, CPU_ZERO};
    use std::mem;

    unsafe {
        let mut cpu_set: cpu_set_t = mem::zeroed();
        CPU_ZERO(&mut cpu_set);
        CPU_SET(cpu_id, &mut cpu_set);

        if sched_setaffinity(0, mem::size_of::<cpu_set_t>(), &cpu_set) != 0 {
            return Err(AcqError::system_resource("failed to set CPU affinity"));
        }
    }
    Ok(())
}

#[cfg(target_os = "macos")]
pub fn pin_to_cpu(cpu_id: usize) -> Result<()> {
    use libc::{mach_port_t, pthread_self, thread_affinity_policy_data_t, thread_policy_set};
    use libc::THREAD_AFFINITY_POLICY;

    unsafe {
        let mut policy = thread_affinity_policy_data_t { affinity_tag: cpu_id as i32 };

        let result = thread_policy_set(
            pthread_self() as mach_port_t,
            THREAD_AFFINITY_POLICY as u32,
            &mut policy as *mut _ as *mut i32,
            1,
        );

        if result != 0 {
            return Err(AcqError::system_resource("failed to set CPU affinity"));
        }
    }
    Ok(())
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub fn pin_to_cpu(_cpu_id: usize) -> Result<()> {
    Ok(())
}

/// Raise the calling thread to the `SCHED_FIFO` real-time class at the
/// given priority. Mirrors the original acquisition daemon's own
/// `pthread_setschedparam(the_acq_thread, SCHED_FIFO, &sp)` call; a
/// priority of 0 is treated by callers as "do not apply" and this
/// function is simply not called in that case.
#[cfg(target_os = "linux")]
pub fn set_realtime_priority(priority: i32) -> Result<()> {
    use std::mem;

    unsafe {
        let mut param: libc::sched_param = mem::zeroed();
        param.sched_priority = priority;

        let rc = libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &param);
        if rc != 0 {
            return Err(AcqError::system_resource(format!(
                "pthread_setschedparam(SCHED_FIFO, {priority}) failed: errno {rc}"
            )));
        }
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn set_realtime_priority(_priority: i32) -> Result<()> {
    Ok(())
}
