//! Wait objects.
//!
//! A CQ with a wait object signals it on every enqueue, so that blocked
//! readers and external pollers learn about new completions.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use super::attr::{CqAttr, WaitObj};
use crate::fabric::error::{Error, Result};
use crate::utils::interop::{from_c_count, from_c_ret, lock};

/// A signal shared between several CQs.
///
/// Every signal bumps a generation counter; waiters wake when the generation
/// moves past the one they observed.
#[derive(Default)]
pub struct WaitSet {
    inner: Arc<(Mutex<u64>, Condvar)>,
}

impl_shared_handle!(WaitSet, "WaitSet");

impl WaitSet {
    /// Create a new wait set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wake all waiters.
    pub fn signal(&self) {
        let (gen, cv) = &*self.inner;
        *lock(gen) += 1;
        cv.notify_all();
    }

    /// Wait for a signal arriving after this call. Return whether one arrived.
    pub fn wait(&self, timeout: Duration) -> bool {
        let (gen, cv) = &*self.inner;
        let guard = lock(gen);
        let seen = *guard;
        let (_guard, res) = cv
            .wait_timeout_while(guard, timeout, |g| *g == seen)
            .unwrap_or_else(|e| e.into_inner());
        !res.timed_out()
    }
}

/// A mutex and condition variable pair with a sticky "signaled" flag.
#[derive(Default)]
pub struct MutexCond {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl_shared_handle!(MutexCond, "MutexCond");

impl MutexCond {
    /// Set the flag and wake one waiter.
    pub fn signal(&self) {
        let (signaled, cv) = &*self.inner;
        *lock(signaled) = true;
        cv.notify_one();
    }

    /// Wait for the flag and clear it. Return whether it was set in time.
    pub fn wait(&self, timeout: Duration) -> bool {
        let (signaled, cv) = &*self.inner;
        let guard = lock(signaled);
        let (mut guard, _) = cv
            .wait_timeout_while(guard, timeout, |s| !*s)
            .unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *guard, false)
    }
}

/// A non-blocking pipe. The read end becomes readable once signaled.
#[derive(Debug)]
pub(crate) struct PipeWait {
    rx: OwnedFd,
    tx: OwnedFd,
}

impl PipeWait {
    pub fn new() -> io::Result<Self> {
        let mut fds = [0 as RawFd; 2];
        // SAFETY: FFI, `fds` has room for two descriptors.
        from_c_ret(unsafe { libc::pipe(fds.as_mut_ptr()) })?;

        // SAFETY: both descriptors were just created and are owned by nobody else.
        let (rx, tx) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
        for fd in [&rx, &tx] {
            // SAFETY: FFI on a valid descriptor.
            let flags = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_GETFL) };
            if flags < 0 {
                return Err(io::Error::last_os_error());
            }
            // SAFETY: FFI on a valid descriptor.
            from_c_ret(unsafe {
                libc::fcntl(fd.as_raw_fd(), libc::F_SETFL, flags | libc::O_NONBLOCK)
            })?;
        }
        Ok(Self { rx, tx })
    }

    /// Get the descriptor to poll for readability.
    #[inline]
    pub fn fd(&self) -> RawFd {
        self.rx.as_raw_fd()
    }

    pub fn signal(&self) -> io::Result<()> {
        let byte = 1u8;
        // SAFETY: FFI, writing one byte from a valid local.
        let ret = unsafe { libc::write(self.tx.as_raw_fd(), (&byte as *const u8).cast(), 1) };
        match from_c_count(ret) {
            Ok(_) => Ok(()),
            // A full pipe is already readable.
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub fn wait(&self, timeout: Duration) -> io::Result<bool> {
        let mut pfd = libc::pollfd {
            fd: self.fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
        // SAFETY: FFI with a single valid `pollfd`.
        let ret = unsafe { libc::poll(&mut pfd, 1, ms) };
        match ret {
            0 => Ok(false),
            n if n > 0 => {
                self.drain()?;
                Ok(true)
            }
            _ => {
                let e = io::Error::last_os_error();
                if e.kind() == io::ErrorKind::Interrupted {
                    Ok(false)
                } else {
                    Err(e)
                }
            }
        }
    }

    fn drain(&self) -> io::Result<()> {
        let mut sink = [0u8; 64];
        loop {
            // SAFETY: FFI, reading into a valid local buffer.
            let ret = unsafe {
                libc::read(self.rx.as_raw_fd(), sink.as_mut_ptr().cast(), sink.len())
            };
            match from_c_count(ret) {
                Ok(n) if n == sink.len() => continue,
                Ok(_) => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }
}

/// Handle to a CQ's wait object, as returned by `Cq::control`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitHandle {
    /// Poll this descriptor for readability.
    Fd(RawFd),
    /// The wait set the CQ signals.
    Set(WaitSet),
    /// The CQ's mutex and condition variable.
    MutexCond(MutexCond),
}

/// The wait object owned by a CQ.
#[derive(Debug)]
pub(crate) enum WaitObject {
    Fd(PipeWait),
    Set(WaitSet),
    MutexCond(MutexCond),
}

impl WaitObject {
    /// Create the wait object requested by `attr`, if any.
    pub fn new(attr: &CqAttr) -> Result<Option<Self>> {
        let obj = match attr.wait_obj {
            WaitObj::None => return Ok(None),
            WaitObj::Unspec | WaitObj::Fd => WaitObject::Fd(PipeWait::new()?),
            WaitObj::MutexCond => WaitObject::MutexCond(MutexCond::default()),
            WaitObj::Set => match &attr.wait_set {
                Some(set) => WaitObject::Set(set.clone()),
                None => {
                    log::debug!("psmx: wait object Set requested without a wait set");
                    return Err(Error::InvalidArgument("wait set required"));
                }
            },
        };
        Ok(Some(obj))
    }

    pub fn signal(&self) {
        match self {
            WaitObject::Fd(pipe) => {
                if let Err(e) = pipe.signal() {
                    log::warn!("psmx: failed to signal wait fd: {}", e);
                }
            }
            WaitObject::Set(set) => set.signal(),
            WaitObject::MutexCond(mc) => mc.signal(),
        }
    }

    /// Block until signaled or `timeout` passes. Return whether signaled.
    pub fn wait(&self, timeout: Duration) -> Result<bool> {
        Ok(match self {
            WaitObject::Fd(pipe) => pipe.wait(timeout)?,
            WaitObject::Set(set) => set.wait(timeout),
            WaitObject::MutexCond(mc) => mc.wait(timeout),
        })
    }

    pub fn handle(&self) -> WaitHandle {
        match self {
            WaitObject::Fd(pipe) => WaitHandle::Fd(pipe.fd()),
            WaitObject::Set(set) => WaitHandle::Set(set.clone()),
            WaitObject::MutexCond(mc) => WaitHandle::MutexCond(mc.clone()),
        }
    }
}
