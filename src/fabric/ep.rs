//! Endpoints.
//!
//! An [`Endpoint`] posts operations to its domain's transport and names the
//! CQs and counters their completions go to. Operations posted without an
//! application context complete silently: they only retire the endpoint's
//! pending tallies and bump counters not restricted to events.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::cntr::Counter;
use super::context::{LocalOp, MultiRecvRequest, OpContext};
use super::cq::Cq;
use super::domain::Domain;
use super::error::{Error, Result};
use super::flags::BindFlags;
use super::transport::PostedOp;
use super::type_alias::*;
use crate::utils::interop::lock;

/// CQ and counter bindings of an endpoint.
#[derive(Clone, Default)]
pub(crate) struct EpBindings {
    pub send_cq: Option<Cq>,
    pub recv_cq: Option<Cq>,
    pub send_cntr: Option<Counter>,
    pub recv_cntr: Option<Counter>,
    pub read_cntr: Option<Counter>,
    pub write_cntr: Option<Counter>,

    // Counters bound with `BindFlags::EVENT` skip operations without completions.
    pub send_cntr_event: bool,
    pub recv_cntr_event: bool,
    pub read_cntr_event: bool,
    pub write_cntr_event: bool,
}

/// Ownership holder of an endpoint.
struct EpInner {
    domain: Domain,
    bindings: Mutex<EpBindings>,
    pending_sends: AtomicUsize,
    pending_writes: AtomicUsize,
    pending_reads: AtomicUsize,
}

/// Endpoint.
pub struct Endpoint {
    inner: Arc<EpInner>,
}

impl_shared_handle!(Endpoint, "Endpoint");

impl Endpoint {
    pub(crate) fn new(domain: &Domain) -> Self {
        Self {
            inner: Arc::new(EpInner {
                domain: domain.clone(),
                bindings: Mutex::new(EpBindings::default()),
                pending_sends: AtomicUsize::new(0),
                pending_writes: AtomicUsize::new(0),
                pending_reads: AtomicUsize::new(0),
            }),
        }
    }

    /// Get the owning domain.
    #[inline]
    pub fn domain(&self) -> &Domain {
        &self.inner.domain
    }

    /// Bind a CQ for send-side (including local RMA) and/or receive-side completions.
    pub fn bind_cq(&self, cq: &Cq, flags: BindFlags) -> Result<()> {
        if !flags.intersects(BindFlags::SEND | BindFlags::RECV) {
            log::debug!("psmx: CQ bind flags {:?} select no operations", flags);
            return Err(Error::InvalidArgument("CQ binding needs SEND or RECV"));
        }
        if cq.domain() != self.domain() {
            return Err(Error::InvalidArgument("CQ belongs to another domain"));
        }

        let mut b = lock(&self.inner.bindings);
        if flags.contains(BindFlags::SEND) {
            b.send_cq = Some(cq.clone());
        }
        if flags.contains(BindFlags::RECV) {
            b.recv_cq = Some(cq.clone());
        }
        Ok(())
    }

    /// Bind a counter for the operation kinds in `flags`.
    pub fn bind_cntr(&self, cntr: &Counter, flags: BindFlags) -> Result<()> {
        let kinds = BindFlags::SEND | BindFlags::RECV | BindFlags::READ | BindFlags::WRITE;
        if !flags.intersects(kinds) {
            log::debug!("psmx: counter bind flags {:?} select no operations", flags);
            return Err(Error::InvalidArgument("counter binding selects no operations"));
        }

        let event = flags.contains(BindFlags::EVENT);
        let mut b = lock(&self.inner.bindings);
        if flags.contains(BindFlags::SEND) {
            b.send_cntr = Some(cntr.clone());
            b.send_cntr_event = event;
        }
        if flags.contains(BindFlags::RECV) {
            b.recv_cntr = Some(cntr.clone());
            b.recv_cntr_event = event;
        }
        if flags.contains(BindFlags::READ) {
            b.read_cntr = Some(cntr.clone());
            b.read_cntr_event = event;
        }
        if flags.contains(BindFlags::WRITE) {
            b.write_cntr = Some(cntr.clone());
            b.write_cntr_event = event;
        }
        Ok(())
    }

    /// Post a tagged send. Without a `context`, no completion is generated.
    pub fn send(
        &self,
        dest: Epid,
        tag: Tag,
        buf: BufAddr,
        len: usize,
        context: Option<UserContext>,
    ) -> Result<()> {
        self.check_tag(tag)?;
        let op = match context {
            Some(context) => LocalOp::Send { context, buf },
            None => LocalOp::NocompSend,
        };
        let posted = PostedOp::Send {
            dest,
            tag,
            buf,
            len,
        };
        self.post_tracked(&self.inner.pending_sends, posted, op)
    }

    /// Post a send of a copy of `data`. Never generates a completion.
    pub fn inject(&self, dest: Epid, tag: Tag, data: &[u8]) -> Result<()> {
        self.check_tag(tag)?;
        let payload: Box<[u8]> = data.into();
        let posted = PostedOp::Send {
            dest,
            tag,
            buf: payload.as_ptr() as BufAddr,
            len: payload.len(),
        };
        self.post_tracked(&self.inner.pending_sends, posted, LocalOp::Inject { payload })
    }

    /// Post a tagged receive matching `tag` on the bits set in `tagsel`.
    pub fn recv(
        &self,
        tag: Tag,
        tagsel: Tag,
        buf: BufAddr,
        len: usize,
        context: Option<UserContext>,
    ) -> Result<()> {
        let op = match context {
            Some(context) => LocalOp::Recv { context, buf },
            None => LocalOp::NocompRecv,
        };
        let posted = PostedOp::Recv {
            tag,
            tagsel,
            buf,
            len,
        };
        self.post(posted, op)
    }

    /// Post a multi-receive over `len` bytes at `buf`.
    ///
    /// Incoming messages fill the buffer back to back. Every message
    /// completes on its own; once fewer than `min_buf_size` bytes remain, a
    /// final completion flagged `MULTI_RECV` releases the buffer.
    pub fn recv_multi(
        &self,
        tag: Tag,
        tagsel: Tag,
        buf: BufAddr,
        len: usize,
        min_buf_size: usize,
        context: UserContext,
    ) -> Result<()> {
        if len == 0 || min_buf_size > len {
            log::debug!(
                "psmx: multi-receive of {} bytes with minimum {} rejected",
                len,
                min_buf_size
            );
            return Err(Error::InvalidArgument("multi-receive buffer smaller than its minimum"));
        }
        let req = MultiRecvRequest {
            context,
            buf,
            len,
            offset: 0,
            min_buf_size,
            tag,
            tagsel,
        };
        let posted = PostedOp::Recv {
            tag,
            tagsel,
            buf,
            len,
        };
        self.post(posted, LocalOp::MultiRecv(Box::new(req)))
    }

    /// Post an RMA write, delivering `data` to the target unless it is zero.
    #[allow(clippy::too_many_arguments)]
    pub fn write(
        &self,
        dest: Epid,
        addr: u64,
        key: u64,
        buf: BufAddr,
        len: usize,
        data: ImmData,
        context: Option<UserContext>,
    ) -> Result<()> {
        let op = match context {
            Some(context) => LocalOp::Write { context },
            None => LocalOp::NocompWrite,
        };
        let posted = PostedOp::Write {
            dest,
            addr,
            key,
            buf,
            len,
            data,
        };
        self.post_tracked(&self.inner.pending_writes, posted, op)
    }

    /// Post an RMA write of a copy of `payload`. Never generates a completion.
    pub fn inject_write(
        &self,
        dest: Epid,
        addr: u64,
        key: u64,
        payload: &[u8],
        data: ImmData,
    ) -> Result<()> {
        let payload: Box<[u8]> = payload.into();
        let posted = PostedOp::Write {
            dest,
            addr,
            key,
            buf: payload.as_ptr() as BufAddr,
            len: payload.len(),
            data,
        };
        self.post_tracked(
            &self.inner.pending_writes,
            posted,
            LocalOp::InjectWrite { payload },
        )
    }

    /// Post an RMA read into `len` bytes at `buf`.
    pub fn read(
        &self,
        dest: Epid,
        addr: u64,
        key: u64,
        buf: BufAddr,
        len: usize,
        context: Option<UserContext>,
    ) -> Result<()> {
        let op = match context {
            Some(context) => LocalOp::Read { context },
            None => LocalOp::NocompRead,
        };
        let posted = PostedOp::Read {
            dest,
            addr,
            key,
            buf,
            len,
        };
        self.post_tracked(&self.inner.pending_reads, posted, op)
    }

    /// Number of sends not yet completed.
    #[inline]
    pub fn pending_sends(&self) -> usize {
        self.inner.pending_sends.load(Ordering::Acquire)
    }

    /// Number of RMA writes not yet completed.
    #[inline]
    pub fn pending_writes(&self) -> usize {
        self.inner.pending_writes.load(Ordering::Acquire)
    }

    /// Number of RMA reads not yet completed.
    #[inline]
    pub fn pending_reads(&self) -> usize {
        self.inner.pending_reads.load(Ordering::Acquire)
    }
}

impl Endpoint {
    pub(crate) fn bindings(&self) -> EpBindings {
        lock(&self.inner.bindings).clone()
    }

    pub(crate) fn retire_send(&self) {
        retire(&self.inner.pending_sends);
    }

    pub(crate) fn retire_write(&self) {
        retire(&self.inner.pending_writes);
    }

    pub(crate) fn retire_read(&self) {
        retire(&self.inner.pending_reads);
    }

    /// Reject tags that use bits reserved by the provider.
    fn check_tag(&self, tag: Tag) -> Result<()> {
        if tag & self.domain().config().reserved_tag_bits != 0 {
            return Err(Error::InvalidArgument("tag uses reserved bits"));
        }
        Ok(())
    }

    fn post(&self, posted: PostedOp, op: LocalOp) -> Result<()> {
        let context = OpContext::Local {
            ep: self.clone(),
            op,
        };
        self.domain().post(posted, context)?;
        Ok(())
    }

    fn post_tracked(&self, tally: &AtomicUsize, posted: PostedOp, op: LocalOp) -> Result<()> {
        tally.fetch_add(1, Ordering::AcqRel);
        self.post(posted, op).inspect_err(|_| retire(tally))
    }
}

fn retire(tally: &AtomicUsize) {
    let _ = tally.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
}
