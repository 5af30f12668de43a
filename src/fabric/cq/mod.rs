//! Completion queue.
//!
//! A [`Cq`] delivers fixed-layout completion entries to the application.
//! Entries come from two producers: the progress engine, which drains the
//! transport whenever the CQ is read, and the application itself through
//! [`Cq::write`] and [`Cq::write_err`]. Error completions never reach the
//! normal read path; they stop it with [`Error::ErrorAvailable`] until
//! drained with [`Cq::read_err`].

mod attr;
mod entry;
mod event;
mod pool;
pub(crate) mod progress;
mod queue;
mod wait;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use quanta::Instant;

pub use self::attr::*;
pub use self::entry::*;
pub use self::event::{AppCompletion, Completion, CompletionEvent};
pub use self::pool::OverflowPolicy;
pub use self::wait::{MutexCond, WaitHandle, WaitSet};
pub use super::flags::CompletionFlags;

use self::event::*;
use self::pool::EventPool;
use self::progress::poll_mq;
use self::queue::EventQueue;
use self::wait::WaitObject;
use super::domain::Domain;
use super::error::{Error, Result};
use super::transport::{NativeStatus, TransportStatus};
use super::type_alias::*;
use crate::utils::interop::lock;

/// Commands accepted by [`Cq::control`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ControlCommand {
    /// Retrieve the wait object for use in an external polling loop.
    GetWait = 5,
}

impl TryFrom<i32> for ControlCommand {
    type Error = Error;

    fn try_from(cmd: i32) -> Result<Self> {
        match cmd {
            5 => Ok(Self::GetWait),
            x => {
                log::debug!("psmx: CQ control command {} unsupported", x);
                Err(Error::NotSupported)
            }
        }
    }
}

/// Mutable CQ state, guarded by a single lock.
#[derive(Debug)]
struct CqState {
    pool: EventPool,
    queue: EventQueue,

    /// The error completion `read_err` hands out next.
    pending_error: Option<Box<CompletionEvent>>,

    /// Which progress source `read` polls first; flips on every read.
    poll_am_before_mq: bool,

    closed: bool,
}

/// Ownership holder of a completion queue.
struct CqInner {
    domain: Domain,
    format: CqFormat,
    entry_size: usize,
    context: UserContext,
    wait: Mutex<Option<Arc<WaitObject>>>,
    state: Mutex<CqState>,
}

/// Completion queue.
pub struct Cq {
    inner: Arc<CqInner>,
}

impl_shared_handle!(Cq, "Cq");

impl Cq {
    /// Open a completion queue on `domain`.
    ///
    /// An unspecified format resolves to [`CqFormat::Tagged`]. A wait object
    /// is created if requested; [`WaitObj::Set`] requires a wait set in
    /// `attr`, and a threshold wait condition requires some wait object.
    pub fn open(domain: &Domain, attr: &CqAttr, context: UserContext) -> Result<Self> {
        let format = attr.format.resolve();
        let entry_size = format.entry_size();

        if attr.wait_cond == WaitCond::Threshold && attr.wait_obj == WaitObj::None {
            log::debug!("psmx: threshold wait condition requested without a wait object");
            return Err(Error::InvalidArgument("wait condition requires a wait object"));
        }
        let wait = WaitObject::new(attr)?.map(Arc::new);

        let config = domain.config();
        let state = CqState {
            pool: EventPool::new(config.cq_pool_capacity, config.pool_overflow),
            queue: EventQueue::new(),
            pending_error: None,
            poll_am_before_mq: false,
            closed: false,
        };
        Ok(Self {
            inner: Arc::new(CqInner {
                domain: domain.clone(),
                format,
                entry_size,
                context,
                wait: Mutex::new(wait),
                state: Mutex::new(state),
            }),
        })
    }

    /// Get the resolved entry format.
    #[inline]
    pub fn format(&self) -> CqFormat {
        self.inner.format
    }

    /// Get the fixed entry size; the minimum buffer length for reads and writes.
    #[inline]
    pub fn entry_size(&self) -> usize {
        self.inner.entry_size
    }

    /// Get the application context given at open.
    #[inline]
    pub fn context(&self) -> UserContext {
        self.inner.context
    }

    /// Get the owning domain.
    #[inline]
    pub fn domain(&self) -> &Domain {
        &self.inner.domain
    }

    /// Progress the transport, then copy at most one completion into `buf`.
    ///
    /// Return the entry size, or `0` if nothing completed.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.progress()?;
        match self.dequeue(buf.len())? {
            Some(ev) => Ok(ev.cqe.encode(buf)),
            None => Ok(0),
        }
    }

    /// Like [`Cq::read`], also resolving the sender of a receive completion.
    ///
    /// The address is [`FI_ADDR_UNSPEC`] when nothing was read or the sender
    /// cannot be resolved.
    pub fn read_from(&self, buf: &mut [u8]) -> Result<(usize, FiAddr)> {
        self.progress()?;
        match self.dequeue(buf.len())? {
            Some(ev) => {
                let n = ev.cqe.encode(buf);
                Ok((n, self.resolve_source(ev.source)))
            }
            None => Ok((0, FI_ADDR_UNSPEC)),
        }
    }

    /// Like [`Cq::read`], returning the completion as a value.
    pub fn read_entry(&self) -> Result<Option<Completion>> {
        self.progress()?;
        Ok(self.dequeue(self.entry_size())?.map(|ev| ev.cqe))
    }

    /// Copy the pending error completion into `buf`.
    ///
    /// Return the error entry size, or `0` if no error is pending. The error is
    /// cleared only when it was copied.
    pub fn read_err(&self, buf: &mut [u8], _flags: u64) -> Result<usize> {
        let mut state = self.state()?;
        let Some(ev) = Self::take_error(&mut state, Some(buf.len()))? else {
            return Ok(0);
        };
        let n = ev.cqe.encode(buf);
        state.pool.release(ev);
        Ok(n)
    }

    /// Take the pending error completion as a value.
    pub fn read_err_entry(&self) -> Result<Option<CqErrEntry>> {
        let mut state = self.state()?;
        let Some(ev) = Self::take_error(&mut state, None)? else {
            return Ok(None);
        };
        let entry = match ev.cqe {
            Completion::Error(e) => Some(e),
            _ => None,
        };
        state.pool.release(ev);
        Ok(entry)
    }

    /// Inject a success completion in this CQ's format.
    ///
    /// The transport is not involved. Return the entry size consumed.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        self.ensure_open()?;
        self.check_room(buf.len(), self.entry_size())?;
        let app = AppCompletion::decode(self.format(), buf)?;
        self.push_app(&app, true)?;
        Ok(self.entry_size())
    }

    /// Inject an error completion laid out as [`CqErrEntry`].
    ///
    /// `err` may be given with either sign and must not be zero.
    pub fn write_err(&self, buf: &[u8]) -> Result<usize> {
        self.ensure_open()?;
        self.check_room(buf.len(), CqErrEntry::SIZE)?;
        let app = AppCompletion::from_err_entry(&CqErrEntry::decode(buf));
        if app.err == 0 {
            return Err(Error::InvalidArgument("error completion without an error code"));
        }
        self.push_app(&app, true)?;
        Ok(CqErrEntry::SIZE)
    }

    /// Read, waiting on the wait object until a completion arrives or
    /// `timeout` passes. `None` waits forever.
    ///
    /// Fail with [`Error::Again`] on timeout and [`Error::NotSupported`] if
    /// the CQ has no wait object.
    pub fn sread(&self, buf: &mut [u8], timeout: Option<Duration>) -> Result<usize> {
        self.sread_with(timeout, || self.read(buf))
    }

    /// Like [`Cq::sread`], also resolving the sender.
    pub fn sread_from(
        &self,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<(usize, FiAddr)> {
        self.sread_with(timeout, || self.read_from(buf))
    }

    /// Perform a control command.
    pub fn control(&self, cmd: ControlCommand) -> Result<WaitHandle> {
        self.ensure_open()?;
        match cmd {
            ControlCommand::GetWait => self
                .wait_object()
                .map(|w| w.handle())
                .ok_or(Error::NoData),
        }
    }

    /// Describe a provider-specific error code found in an error entry.
    pub fn strerror(&self, prov_errno: i32) -> String {
        TransportStatus::from(prov_errno).to_string()
    }

    /// Close the CQ, releasing queued events and the wait object.
    ///
    /// Later operations, including another close, fail with [`Error::Closed`].
    pub fn close(&self) -> Result<()> {
        {
            let mut guard = self.state()?;
            let state = &mut *guard;
            state.closed = true;
            for ev in state.queue.drain() {
                state.pool.release(ev);
            }
            if let Some(ev) = state.pending_error.take() {
                state.pool.release(ev);
            }
            state.pool.finalize();
        }
        lock(&self.inner.wait).take();
        log::debug!("psmx: closed {:?}", self);
        Ok(())
    }
}

impl Cq {
    /// Number of queued completions, excluding a pending error.
    pub(crate) fn queued(&self) -> usize {
        lock(&self.inner.state).queue.len()
    }

    /// Enqueue a completion derived from a transport status.
    ///
    /// Return `false` if the CQ is closed and the completion was discarded.
    pub(crate) fn push_status(&self, status: &NativeStatus, data: ImmData) -> Result<bool> {
        {
            let mut state = lock(&self.inner.state);
            if state.closed {
                log::warn!("psmx: completion for closed {:?} discarded", self);
                return Ok(false);
            }
            let mut ev = state.pool.acquire_overflow();
            if let Err(e) = create_event_from_status(self.format(), &mut ev, status, data) {
                state.pool.release(ev);
                return Err(e);
            }
            state.queue.enqueue(ev);
        }
        self.signal();
        Ok(true)
    }

    /// Enqueue a provider-synthesized completion. Never fails for lack of storage.
    pub(crate) fn push_internal(&self, app: &AppCompletion) -> Result<bool> {
        self.push_app(app, false)
    }

    fn push_app(&self, app: &AppCompletion, from_app: bool) -> Result<bool> {
        {
            let mut state = lock(&self.inner.state);
            if state.closed {
                if from_app {
                    return Err(Error::Closed);
                }
                log::warn!("psmx: completion for closed {:?} discarded", self);
                return Ok(false);
            }
            let mut ev = if from_app {
                state.pool.acquire()?
            } else {
                state.pool.acquire_overflow()
            };
            if let Err(e) = create_event(self.format(), &mut ev, app) {
                state.pool.release(ev);
                return Err(e);
            }
            state.queue.enqueue(ev);
        }
        self.signal();
        Ok(true)
    }

    /// Lock the state of an open CQ.
    fn state(&self) -> Result<MutexGuard<'_, CqState>> {
        let state = lock(&self.inner.state);
        if state.closed {
            return Err(Error::Closed);
        }
        Ok(state)
    }

    #[inline]
    fn ensure_open(&self) -> Result<()> {
        self.state().map(drop)
    }

    #[inline]
    fn check_room(&self, provided: usize, required: usize) -> Result<()> {
        if provided < required {
            return Err(Error::TooSmall { required, provided });
        }
        Ok(())
    }

    /// One alternating progress step, then a drain of the transport
    /// targeted at this CQ.
    fn progress(&self) -> Result<()> {
        let am_first = {
            let mut state = self.state()?;
            state.poll_am_before_mq = !state.poll_am_before_mq;
            state.poll_am_before_mq
        };
        let domain = self.domain();
        if am_first {
            domain.am_progress()?;
        }
        poll_mq(domain, Some(self))?;
        if !am_first {
            domain.am_progress()?;
        }
        Ok(())
    }

    /// Take the next success completion.
    ///
    /// An error at the head of the queue becomes the pending error instead.
    fn dequeue(&self, room: usize) -> Result<Option<CompletionEvent>> {
        let mut state = self.state()?;
        if state.pending_error.is_some() {
            return Err(Error::ErrorAvailable);
        }
        self.check_room(room, self.entry_size())?;

        let Some(ev) = state.queue.dequeue() else {
            return Ok(None);
        };
        if ev.is_error() {
            state.pending_error = Some(ev);
            return Err(Error::ErrorAvailable);
        }
        let out = *ev;
        state.pool.release(ev);
        Ok(Some(out))
    }

    /// Take the pending error, promoting one from the queue head if needed.
    /// With `room`, the error stays pending if it does not fit.
    fn take_error(
        state: &mut CqState,
        room: Option<usize>,
    ) -> Result<Option<Box<CompletionEvent>>> {
        if state.pending_error.is_none() {
            state.pending_error = state.queue.dequeue_if(CompletionEvent::is_error);
        }
        if state.pending_error.is_none() {
            return Ok(None);
        }
        if let Some(provided) = room {
            if provided < CqErrEntry::SIZE {
                return Err(Error::TooSmall {
                    required: CqErrEntry::SIZE,
                    provided,
                });
            }
        }
        Ok(state.pending_error.take())
    }

    fn resolve_source(&self, source: Option<Tag>) -> FiAddr {
        let domain = self.domain();
        let reserved = domain.config().reserved_tag_bits;
        match source {
            Some(tag) if reserved & PSMX_MSG_BIT != 0 && tag & PSMX_MSG_BIT != 0 => {
                let epid = tag & !PSMX_MSG_BIT;
                domain.resolve(epid).unwrap_or_else(|e| {
                    log::debug!("psmx: cannot resolve source epid {:#x}: {}", epid, e);
                    FI_ADDR_UNSPEC
                })
            }
            _ => FI_ADDR_UNSPEC,
        }
    }

    fn wait_object(&self) -> Option<Arc<WaitObject>> {
        lock(&self.inner.wait).clone()
    }

    fn signal(&self) {
        if let Some(wait) = self.wait_object() {
            wait.signal();
        }
    }

    fn sread_with<T>(
        &self,
        timeout: Option<Duration>,
        mut read: impl FnMut() -> Result<T>,
    ) -> Result<T>
    where
        T: ReadCount,
    {
        self.ensure_open()?;
        let wait = self.wait_object().ok_or(Error::NotSupported)?;
        let slice = self.domain().config().sread_slice();
        // A timeout past the clock's range waits forever.
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));

        loop {
            let got = read()?;
            if got.count() > 0 {
                return Ok(got);
            }
            let step = match deadline {
                Some(deadline) => {
                    let left = deadline.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        return Err(Error::Again);
                    }
                    left.min(slice)
                }
                None => slice,
            };
            wait.wait(step)?;
        }
    }
}

/// Results of the read family that report how many bytes were copied.
trait ReadCount {
    fn count(&self) -> usize;
}

impl ReadCount for usize {
    fn count(&self) -> usize {
        *self
    }
}

impl ReadCount for (usize, FiAddr) {
    fn count(&self) -> usize {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use crate::fabric::error::errno::*;
    use crate::fabric::flags::BindFlags;
    use crate::fabric::transport::{Outcome, SimTransport};

    fn domain() -> (SimTransport, Domain) {
        let sim = SimTransport::new();
        let domain = Domain::new(sim.clone(), ProviderConfig::default());
        (sim, domain)
    }

    fn tagged_bytes(entry: CqTaggedEntry) -> [u8; CqTaggedEntry::SIZE] {
        let mut buf = [0u8; CqTaggedEntry::SIZE];
        entry.encode(&mut buf);
        buf
    }

    fn err_bytes(entry: CqErrEntry) -> [u8; CqErrEntry::SIZE] {
        let mut buf = [0u8; CqErrEntry::SIZE];
        entry.encode(&mut buf);
        buf
    }

    #[test]
    fn write_then_read_tagged() -> anyhow::Result<()> {
        let (_sim, domain) = domain();
        let cq = domain.open_cq(&CqAttr::new(CqFormat::Tagged), 0)?;
        assert_eq!(cq.entry_size(), CqTaggedEntry::SIZE);

        let written = CqTaggedEntry {
            op_context: 0x1234,
            flags: (CompletionFlags::RECV | CompletionFlags::TAGGED).bits(),
            len: 128,
            buf: 0x7000,
            data: 0,
            tag: 42,
        };
        assert_eq!(cq.write(&tagged_bytes(written))?, CqTaggedEntry::SIZE);

        let mut buf = [0u8; CqTaggedEntry::SIZE];
        assert_eq!(cq.read(&mut buf)?, CqTaggedEntry::SIZE);
        assert_eq!(CqTaggedEntry::decode(&buf), written);
        assert_eq!(cq.read(&mut buf)?, 0);
        Ok(())
    }

    #[test]
    fn fifo_over_writes() -> anyhow::Result<()> {
        let (_sim, domain) = domain();
        let cq = domain.open_cq(&CqAttr::new(CqFormat::Context), 0)?;
        for i in 0..10u64 {
            let mut buf = [0u8; CqEntry::SIZE];
            CqEntry { op_context: i }.encode(&mut buf);
            cq.write(&buf)?;
        }
        for i in 0..10u64 {
            assert_eq!(cq.read_entry()?, Some(Completion::Context(CqEntry { op_context: i })));
        }
        assert_eq!(cq.read_entry()?, None);
        Ok(())
    }

    #[test]
    fn short_buffers_leave_queue_untouched() -> anyhow::Result<()> {
        let (_sim, domain) = domain();
        let cq = domain.open_cq(&CqAttr::new(CqFormat::Msg), 0)?;

        let short = [0u8; CqMsgEntry::SIZE - 1];
        assert!(matches!(
            cq.write(&short),
            Err(Error::TooSmall { required: 24, provided: 23 })
        ));
        assert_eq!(cq.queued(), 0);

        cq.write(&[0u8; CqMsgEntry::SIZE])?;
        let mut small = [0u8; CqEntry::SIZE];
        assert!(matches!(cq.read(&mut small), Err(Error::TooSmall { .. })));
        assert_eq!(cq.queued(), 1);

        // Larger buffers are fine; only the entry size is written.
        let mut large = [0xffu8; 64];
        assert_eq!(cq.read(&mut large)?, CqMsgEntry::SIZE);
        assert!(large[CqMsgEntry::SIZE..].iter().all(|b| *b == 0xff));
        Ok(())
    }

    #[test]
    fn pending_error_blocks_reads() -> anyhow::Result<()> {
        let (_sim, domain) = domain();
        let cq = domain.open_cq(&CqAttr::new(CqFormat::Context), 0)?;

        let mut buf = [0u8; CqEntry::SIZE];
        CqEntry { op_context: 1 }.encode(&mut buf);
        cq.write(&buf)?;
        cq.write_err(&err_bytes(CqErrEntry {
            op_context: 2,
            err: FI_EIO,
            ..Default::default()
        }))?;
        CqEntry { op_context: 3 }.encode(&mut buf);
        cq.write(&buf)?;

        let mut out = [0u8; CqEntry::SIZE];
        assert_eq!(cq.read(&mut out)?, CqEntry::SIZE);
        for _ in 0..3 {
            assert!(matches!(cq.read(&mut out), Err(Error::ErrorAvailable)));
        }

        let mut tiny = [0u8; 8];
        assert!(matches!(cq.read_err(&mut tiny, 0), Err(Error::TooSmall { .. })));

        let mut err = [0u8; CqErrEntry::SIZE];
        assert_eq!(cq.read_err(&mut err, 0)?, CqErrEntry::SIZE);
        let e = CqErrEntry::decode(&err);
        assert_eq!(e.op_context, 2);
        assert_eq!(e.err, -FI_EIO);
        assert_eq!(cq.read_err(&mut err, 0)?, 0);

        assert_eq!(cq.read_entry()?, Some(Completion::Context(CqEntry { op_context: 3 })));
        Ok(())
    }

    #[test]
    fn errors_are_queued_not_overwritten() -> anyhow::Result<()> {
        let (sim, domain) = domain();
        let cq = domain.open_cq(&CqAttr::new(CqFormat::Tagged), 0)?;
        let ep = domain.endpoint();
        ep.bind_cq(&cq, BindFlags::RECV)?;

        ep.recv(0, 0, 0x100, 8, Some(10))?;
        ep.recv(0, 0, 0x200, 8, Some(11))?;
        sim.complete_next(Outcome::failed(TransportStatus::MqTruncation, 8).msg_length(20));
        sim.complete_next(Outcome::failed(TransportStatus::EpWasClosed, 0));
        domain.progress()?;

        let first = cq.read_err_entry()?.expect("first error");
        assert_eq!(first.op_context, 10);
        assert_eq!(first.err, -FI_ETRUNC);
        assert_eq!(first.olen, 12);
        assert_eq!(cq.strerror(first.prov_errno), "message truncated");

        let second = cq.read_err_entry()?.expect("second error");
        assert_eq!(second.op_context, 11);
        assert_eq!(second.err, -FI_ESHUTDOWN);
        assert!(cq.read_err_entry()?.is_none());
        Ok(())
    }

    #[test]
    fn write_err_rejects_success() -> anyhow::Result<()> {
        let (_sim, domain) = domain();
        let cq = domain.open_cq(&CqAttr::default(), 0)?;
        assert!(matches!(
            cq.write_err(&err_bytes(CqErrEntry::default())),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            cq.write_err(&[0u8; 16]),
            Err(Error::TooSmall { .. })
        ));
        assert_eq!(cq.queued(), 0);
        Ok(())
    }

    #[test]
    fn pool_exhaustion_fails_application_writes() -> anyhow::Result<()> {
        let sim = SimTransport::new();
        let config = ProviderConfig {
            cq_pool_capacity: 2,
            ..Default::default()
        };
        let domain = Domain::new(sim.clone(), config);
        let cq = domain.open_cq(&CqAttr::new(CqFormat::Context), 0)?;
        let ep = domain.endpoint();
        ep.bind_cq(&cq, BindFlags::SEND)?;

        let buf = [0u8; CqEntry::SIZE];
        cq.write(&buf)?;
        cq.write(&buf)?;
        assert!(matches!(cq.write(&buf), Err(Error::OutOfMemory)));

        // Transport completions still land.
        ep.send(1, 0, 0, 0, Some(9))?;
        sim.complete_next(Outcome::ok(0));
        domain.progress()?;
        assert_eq!(cq.queued(), 3);

        while cq.read_entry()?.is_some() {}
        cq.write(&buf)?;
        Ok(())
    }

    #[test]
    fn close_twice() -> anyhow::Result<()> {
        let (_sim, domain) = domain();
        let cq = domain.open_cq(&CqAttr::new(CqFormat::Context).wait(WaitObj::Fd), 0)?;
        cq.write(&[0u8; CqEntry::SIZE])?;

        cq.close()?;
        assert!(matches!(cq.close(), Err(Error::Closed)));
        let mut buf = [0u8; CqEntry::SIZE];
        assert!(matches!(cq.read(&mut buf), Err(Error::Closed)));
        assert!(matches!(cq.write(&buf), Err(Error::Closed)));
        assert!(matches!(cq.control(ControlCommand::GetWait), Err(Error::Closed)));
        Ok(())
    }

    #[test]
    fn get_wait_handles() -> anyhow::Result<()> {
        let (_sim, domain) = domain();

        let plain = domain.open_cq(&CqAttr::default(), 0)?;
        assert!(matches!(plain.control(ControlCommand::GetWait), Err(Error::NoData)));
        assert!(matches!(ControlCommand::try_from(99), Err(Error::NotSupported)));

        let fd = domain.open_cq(&CqAttr::default().wait(WaitObj::Unspec), 0)?;
        assert!(matches!(fd.control(ControlCommand::GetWait)?, WaitHandle::Fd(n) if n >= 0));

        let set = WaitSet::new();
        let shared = domain.open_cq(&CqAttr::default().wait_set(&set), 0)?;
        assert_eq!(shared.control(ControlCommand::GetWait)?, WaitHandle::Set(set));

        let bad = CqAttr {
            wait_cond: WaitCond::Threshold,
            ..Default::default()
        };
        assert!(matches!(domain.open_cq(&bad, 0), Err(Error::InvalidArgument(_))));
        Ok(())
    }

    #[test]
    fn sread_times_out_then_delivers() -> anyhow::Result<()> {
        let (sim, domain) = domain();
        let cq = domain.open_cq(&CqAttr::new(CqFormat::Context).wait(WaitObj::MutexCond), 0)?;
        let ep = domain.endpoint();
        ep.bind_cq(&cq, BindFlags::SEND)?;

        let mut buf = [0u8; CqEntry::SIZE];
        let start = Instant::now();
        assert!(matches!(
            cq.sread(&mut buf, Some(Duration::from_millis(5))),
            Err(Error::Again)
        ));
        assert!(Instant::now() - start >= Duration::from_millis(5));

        ep.send(1, 0, 0, 0, Some(0x42))?;
        sim.complete_next(Outcome::ok(0));
        let (n, addr) = cq.sread_from(&mut buf, Some(Duration::from_secs(5)))?;
        assert_eq!(n, CqEntry::SIZE);
        assert_eq!(addr, FI_ADDR_UNSPEC);
        assert_eq!(CqEntry::decode(&buf).op_context, 0x42);

        let plain = domain.open_cq(&CqAttr::default(), 0)?;
        assert!(matches!(plain.sread(&mut buf, None), Err(Error::NotSupported)));
        Ok(())
    }

    #[test]
    fn sread_with_unbounded_timeout() -> anyhow::Result<()> {
        let (_sim, domain) = domain();
        let cq = domain.open_cq(&CqAttr::new(CqFormat::Context).wait(WaitObj::MutexCond), 0)?;
        let mut buf = [0u8; CqEntry::SIZE];
        CqEntry { op_context: 0x55 }.encode(&mut buf);
        cq.write(&buf)?;

        let mut out = [0u8; CqEntry::SIZE];
        assert_eq!(cq.sread(&mut out, Some(Duration::MAX))?, CqEntry::SIZE);
        assert_eq!(CqEntry::decode(&out).op_context, 0x55);

        cq.write(&buf)?;
        let (n, _) = cq.sread_from(&mut out, Some(Duration::MAX))?;
        assert_eq!(n, CqEntry::SIZE);
        Ok(())
    }

    #[test]
    fn reads_alternate_progress_order() -> anyhow::Result<()> {
        let (sim, domain) = domain();
        let cq = domain.open_cq(&CqAttr::new(CqFormat::Data), 0)?;
        let mr = domain.reg_mr(0x5000, 4096, 0x77);
        mr.bind_cq(&cq);
        let mut buf = [0u8; CqDataEntry::SIZE];

        // First read runs active messages before the drain, so the write lands now.
        sim.remote_write(&mr, 1, 64);
        assert_eq!(cq.read(&mut buf)?, CqDataEntry::SIZE);
        assert_eq!(CqDataEntry::decode(&buf).data, 1);

        // Second read drains first; the staged write is only handed to the
        // transport afterwards.
        sim.remote_write(&mr, 2, 64);
        assert_eq!(cq.read(&mut buf)?, 0);
        assert_eq!(sim.ready(), 1);

        assert_eq!(cq.read(&mut buf)?, CqDataEntry::SIZE);
        assert_eq!(CqDataEntry::decode(&buf).data, 2);
        assert_eq!(cq.read(&mut buf)?, 0);
        Ok(())
    }

    #[test]
    fn pool_is_recycled_across_reads() -> anyhow::Result<()> {
        let sim = SimTransport::new();
        let config = ProviderConfig {
            cq_pool_capacity: 4,
            ..Default::default()
        };
        let domain = Domain::new(sim, config);
        let cq = domain.open_cq(&CqAttr::new(CqFormat::Context), 0)?;

        let mut buf = [0u8; CqEntry::SIZE];
        for i in 0..100u64 {
            CqEntry { op_context: i }.encode(&mut buf);
            cq.write(&buf)?;
            cq.write(&buf)?;
            assert_eq!(cq.read_entry()?, Some(Completion::Context(CqEntry { op_context: i })));
            assert_eq!(cq.read_entry()?, Some(Completion::Context(CqEntry { op_context: i })));

            let state = lock(&cq.inner.state);
            assert_eq!(state.pool.allocated(), 4);
            assert_eq!(state.pool.available(), 4);
        }
        Ok(())
    }

    #[test]
    fn enqueue_signals_wait_set() -> anyhow::Result<()> {
        let (_sim, domain) = domain();
        let set = WaitSet::new();
        let cq = domain.open_cq(&CqAttr::new(CqFormat::Context).wait_set(&set), 0)?;

        let waiter = set.clone();
        let t = std::thread::spawn(move || waiter.wait(Duration::from_secs(5)));
        std::thread::sleep(Duration::from_millis(20));
        cq.write(&[0u8; CqEntry::SIZE])?;
        assert!(t.join().unwrap());
        Ok(())
    }
}
