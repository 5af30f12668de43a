use std::io;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Converts a C return value (`0` on success, `-1` with `errno` set on failure)
/// to a Rust `Result`.
#[inline(always)]
pub(crate) fn from_c_ret(ret: i32) -> io::Result<()> {
    if ret == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// Converts a C return value that is non-negative on success to a Rust
/// `Result` carrying that value.
#[inline(always)]
pub(crate) fn from_c_count(ret: isize) -> io::Result<usize> {
    if ret >= 0 {
        Ok(ret as usize)
    } else {
        Err(io::Error::last_os_error())
    }
}

/// Lock a mutex, recovering the guard if a previous holder panicked.
///
/// Provider state is only mutated through short, non-panicking critical
/// sections, so a poisoned lock still guards consistent data.
#[inline]
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
