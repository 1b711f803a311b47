//! Helpers for poking at processes and descriptor tables.

/// Check if a process with the given PID exists.
///
/// Uses `libc::kill(pid, 0)` which sends a null signal to check existence.
///
/// # Returns
/// * `true` - Process exists
/// * `false` - Process does not exist or permission denied
pub fn is_process_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

/// Close every descriptor above the three standard streams.
///
/// Runs in the forked child between `fork` and `exec`, so the long-lived
/// helper never inherits listening sockets, log handles, or whatever else
/// the parent had open. Must not allocate: the child may hold no lock and
/// no heap at this point.
pub(crate) fn close_inherited_fds() {
    let max = unsafe { libc::sysconf(libc::_SC_OPEN_MAX) };
    let max = if max < 0 { 1024 } else { max };
    for fd in 3..max {
        unsafe {
            libc::close(fd as libc::c_int);
        }
    }
}
