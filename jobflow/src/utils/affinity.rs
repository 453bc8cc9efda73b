//! CPU affinity for worker threads.
//!
//! Pinning is opt-in (see `JobSystemBuilder::pin_threads`). Worker `i` is
//! pinned to the `i`-th core the process is allowed to run on, wrapping
//! around when there are more workers than cores.
//!
//! - **Linux**: `sched_getaffinity` / `pthread_setaffinity_np`, so cgroup and
//!   `taskset` restrictions are respected.
//! - **Windows**: `SetThreadAffinityMask` within the first processor group.
//! - **Other**: pinning reports `ErrorKind::Unsupported`.

use std::io;

/// Returns the cores the current process may run on, in ascending order.
///
/// Falls back to `0..available_parallelism` when the platform cannot
/// report a mask.
pub(crate) fn allowed_cores() -> Vec<usize> {
    match platform::allowed_cores() {
        Ok(cores) if !cores.is_empty() => cores,
        _ => {
            let count = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1);
            (0..count).collect()
        }
    }
}

/// Pins the calling thread to `core`.
pub(crate) fn pin_current_thread(core: usize) -> io::Result<()> {
    platform::pin_current_thread(core)
}

#[cfg(target_os = "linux")]
mod platform {
    use std::io;
    use std::mem;

    /// Number of CPUs representable in a `cpu_set_t`.
    const CPU_SET_CAPACITY: usize = mem::size_of::<libc::cpu_set_t>() * 8;

    pub(super) fn allowed_cores() -> io::Result<Vec<usize>> {
        unsafe {
            let mut set: libc::cpu_set_t = mem::zeroed();

            // pid 0 is the calling thread.
            if libc::sched_getaffinity(0, mem::size_of::<libc::cpu_set_t>(), &mut set) != 0 {
                return Err(io::Error::last_os_error());
            }

            Ok((0..CPU_SET_CAPACITY)
                .filter(|&core| libc::CPU_ISSET(core, &set))
                .collect())
        }
    }

    pub(super) fn pin_current_thread(core: usize) -> io::Result<()> {
        if core >= CPU_SET_CAPACITY {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("core {core} exceeds the cpu set capacity ({CPU_SET_CAPACITY})"),
            ));
        }

        unsafe {
            let mut set: libc::cpu_set_t = mem::zeroed();
            libc::CPU_ZERO(&mut set);
            libc::CPU_SET(core, &mut set);

            // Returns the error code directly instead of setting errno.
            let rc = libc::pthread_setaffinity_np(
                libc::pthread_self(),
                mem::size_of::<libc::cpu_set_t>(),
                &set,
            );

            if rc != 0 {
                return Err(io::Error::from_raw_os_error(rc));
            }
        }

        Ok(())
    }
}

#[cfg(windows)]
mod platform {
    use std::io;

    use windows_sys::Win32::System::Threading::{GetCurrentThread, SetThreadAffinityMask};

    pub(super) fn allowed_cores() -> io::Result<Vec<usize>> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }

    pub(super) fn pin_current_thread(core: usize) -> io::Result<()> {
        if core >= usize::BITS as usize {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("core {core} is outside the first processor group"),
            ));
        }

        let previous = unsafe { SetThreadAffinityMask(GetCurrentThread(), 1usize << core) };

        if previous == 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }
}

#[cfg(not(any(target_os = "linux", windows)))]
mod platform {
    use std::io;

    pub(super) fn allowed_cores() -> io::Result<Vec<usize>> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }

    pub(super) fn pin_current_thread(_core: usize) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "thread affinity is not supported on this platform",
        ))
    }
}
