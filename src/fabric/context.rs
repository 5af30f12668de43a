//! Operation contexts.
//!
//! Every operation handed to the transport carries an [`OpContext`] that the
//! transport returns with the operation's completion. The context records
//! what kind of operation it was and the objects its completion must be
//! routed to.

use super::cq::CompletionFlags;
use super::ep::Endpoint;
use super::mr::Mr;
use super::type_alias::*;

/// A standing receive over a large buffer that absorbs consecutive messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiRecvRequest {
    /// Application context reported with the final completion.
    pub context: UserContext,

    /// Start of the buffer.
    pub buf: BufAddr,

    /// Total length of the buffer.
    pub len: usize,

    /// Bytes consumed so far.
    pub offset: usize,

    /// The request retires once fewer than this many bytes remain.
    pub min_buf_size: usize,

    /// Matching tag.
    pub tag: Tag,

    /// Tag selector; zero bits are ignored when matching.
    pub tagsel: Tag,
}

impl MultiRecvRequest {
    /// Whether another segment of at least `min_buf_size` bytes still fits.
    #[inline]
    pub fn has_room(&self) -> bool {
        self.offset + self.min_buf_size <= self.len
    }

    /// Address of the next unfilled byte.
    #[inline]
    pub fn cursor(&self) -> BufAddr {
        self.buf + self.offset as u64
    }

    /// Bytes not yet consumed.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.len - self.offset
    }

    /// Account for a segment of `nbytes` bytes.
    #[inline]
    pub(crate) fn consume(&mut self, nbytes: usize) {
        self.offset = (self.offset + nbytes).min(self.len);
    }
}

/// Locally initiated operation kinds.
#[derive(Debug)]
pub enum LocalOp {
    /// Send without a requested completion.
    NocompSend,
    /// Receive without a requested completion.
    NocompRecv,
    /// RMA write without a requested completion.
    NocompWrite,
    /// RMA read without a requested completion.
    NocompRead,
    /// Injected send; owns the copied payload until the transport is done with it.
    Inject { payload: Box<[u8]> },
    /// Injected RMA write; owns the copied payload.
    InjectWrite { payload: Box<[u8]> },
    /// Send with a completion.
    Send { context: UserContext, buf: BufAddr },
    /// Receive with a completion.
    Recv { context: UserContext, buf: BufAddr },
    /// One segment of a multi-receive.
    MultiRecv(Box<MultiRecvRequest>),
    /// RMA read with a completion.
    Read { context: UserContext },
    /// RMA write with a completion.
    Write { context: UserContext },
}

/// Context attached to every operation posted to the transport.
#[derive(Debug)]
pub enum OpContext {
    /// An operation issued by a local endpoint.
    Local { ep: Endpoint, op: LocalOp },

    /// A peer wrote into a local memory region.
    RemoteWrite { mr: Mr, data: ImmData },

    /// A peer read from a local memory region.
    RemoteRead { mr: Mr },
}

/// What the event factory needs to know about a context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ContextView {
    /// Application-visible operation context.
    pub op_context: UserContext,

    /// Application buffer, zero when the operation has none.
    pub buf: BufAddr,

    /// Receive-side completions keep the incoming tag as a source hint.
    pub is_recv: bool,

    /// Operation flags reported in the entry.
    pub flags: CompletionFlags,
}

impl OpContext {
    /// Resolve the application-visible parts of the context.
    pub(crate) fn view(&self) -> ContextView {
        match self {
            OpContext::Local { op, .. } => match op {
                LocalOp::Send { context, buf } => ContextView {
                    op_context: *context,
                    buf: *buf,
                    is_recv: false,
                    flags: CompletionFlags::SEND | CompletionFlags::MSG,
                },
                LocalOp::Recv { context, buf } => ContextView {
                    op_context: *context,
                    buf: *buf,
                    is_recv: true,
                    flags: CompletionFlags::RECV | CompletionFlags::MSG,
                },
                LocalOp::MultiRecv(req) => ContextView {
                    op_context: req.context,
                    buf: req.cursor(),
                    is_recv: true,
                    flags: CompletionFlags::RECV | CompletionFlags::MSG,
                },
                LocalOp::Read { context } => ContextView {
                    op_context: *context,
                    flags: CompletionFlags::READ | CompletionFlags::RMA,
                    ..Default::default()
                },
                LocalOp::Write { context } => ContextView {
                    op_context: *context,
                    flags: CompletionFlags::WRITE | CompletionFlags::RMA,
                    ..Default::default()
                },
                LocalOp::NocompSend
                | LocalOp::NocompRecv
                | LocalOp::NocompWrite
                | LocalOp::NocompRead
                | LocalOp::Inject { .. }
                | LocalOp::InjectWrite { .. } => ContextView::default(),
            },
            OpContext::RemoteWrite { mr, .. } => ContextView {
                op_context: mr.context(),
                flags: CompletionFlags::REMOTE_WRITE | CompletionFlags::RMA,
                ..Default::default()
            },
            OpContext::RemoteRead { mr } => ContextView {
                op_context: mr.context(),
                flags: CompletionFlags::REMOTE_READ | CompletionFlags::RMA,
                ..Default::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multi_recv_window() {
        let mut req = MultiRecvRequest {
            context: 1,
            buf: 0x1000,
            len: 100,
            offset: 0,
            min_buf_size: 30,
            tag: 0,
            tagsel: 0,
        };
        assert!(req.has_room());
        req.consume(60);
        assert_eq!(req.cursor(), 0x1000 + 60);
        assert_eq!(req.remaining(), 40);
        assert!(req.has_room());
        req.consume(20);
        assert!(!req.has_room());
        req.consume(1000);
        assert_eq!(req.offset, 100);
    }
}
