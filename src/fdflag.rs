//! Descriptor flags
//!
//! Both helpers read the current flags first and only write when the flag
//! actually changes, so repeating a call is harmless.

use std::os::fd::{AsFd, AsRawFd};

fn update(fd: libc::c_int, get: libc::c_int, set: libc::c_int, bit: libc::c_int, flag: bool) -> bool {
    // SAFETY: F_GETFD/F_GETFL take no argument and only read kernel state.
    let old = unsafe { libc::fcntl(fd, get) };
    if old < 0 {
        return false;
    }
    let new = if flag { old | bit } else { old & !bit };
    if new == old {
        return true;
    }
    // SAFETY: F_SETFD/F_SETFL take an int argument.
    unsafe { libc::fcntl(fd, set, new) == 0 }
}

/// Set or clear close-on-exec on `fd`.
pub fn close_exec<Fd: AsFd>(fd: Fd, flag: bool) -> bool {
    update(fd.as_fd().as_raw_fd(), libc::F_GETFD, libc::F_SETFD, libc::FD_CLOEXEC, flag)
}

/// Set or clear O_NONBLOCK on `fd`.
pub fn nonblocking<Fd: AsFd>(fd: Fd, flag: bool) -> bool {
    update(fd.as_fd().as_raw_fd(), libc::F_GETFL, libc::F_SETFL, libc::O_NONBLOCK, flag)
}
