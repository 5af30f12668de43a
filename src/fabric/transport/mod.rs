//! The tag-matching transport underneath the provider.

mod sim;
mod status;

pub use self::sim::*;
pub use self::status::*;

use super::context::OpContext;
use super::type_alias::*;

/// Transport-level request handle.
pub type RequestId = u64;

/// Materialized status of a finished transport request.
#[derive(Debug)]
pub struct NativeStatus {
    /// The context the operation was posted with, handed back to the provider.
    pub context: OpContext,

    /// Completion status; anything but [`TransportStatus::Ok`] is an error completion.
    pub error: TransportStatus,

    /// Tag of the matched message. On receives, this identifies the sender.
    pub msg_tag: Tag,

    /// Length of the message as sent by the peer.
    pub msg_length: usize,

    /// Bytes actually transferred.
    pub nbytes: usize,
}

impl NativeStatus {
    /// Bytes the peer sent beyond what was transferred.
    #[inline]
    pub fn overrun(&self) -> usize {
        self.msg_length.saturating_sub(self.nbytes)
    }
}

/// An operation request handed to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostedOp {
    /// Tagged send of `len` bytes at `buf`.
    Send {
        dest: Epid,
        tag: Tag,
        buf: BufAddr,
        len: usize,
    },

    /// Tagged receive into `len` bytes at `buf`.
    Recv {
        tag: Tag,
        tagsel: Tag,
        buf: BufAddr,
        len: usize,
    },

    /// RMA write to the peer's `addr`, optionally delivering immediate data.
    Write {
        dest: Epid,
        addr: u64,
        key: u64,
        buf: BufAddr,
        len: usize,
        data: ImmData,
    },

    /// RMA read from the peer's `addr`.
    Read {
        dest: Epid,
        addr: u64,
        key: u64,
        buf: BufAddr,
        len: usize,
    },
}

/// The transport contract the provider core is built on.
///
/// All calls are non-blocking. The progress engine peeks for a finished
/// request, then materializes its status; an empty completion source is
/// reported as `Ok(None)` (or the [`TransportStatus::MqNoCompletions`]
/// sentinel), never as a failure.
pub trait Transport: Send {
    /// Peek the next finished request without consuming it.
    fn ipeek(&mut self) -> Result<Option<RequestId>, TransportStatus>;

    /// Consume a finished request and hand back its status and context.
    fn test(&mut self, req: RequestId) -> Result<NativeStatus, TransportStatus>;

    /// Post an operation. The context comes back with its completion.
    fn post(&mut self, op: PostedOp, context: OpContext) -> Result<RequestId, TransportStatus>;

    /// Run active-message handlers (RMA emulation and remote notifications).
    fn am_progress(&mut self) -> Result<(), TransportStatus> {
        Ok(())
    }

    /// Resolve a peer's endpoint id to an address handle.
    fn epid_to_addr(&mut self, epid: Epid) -> Result<FiAddr, TransportStatus>;
}
