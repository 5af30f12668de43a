//! In-process transport simulation.
//!
//! [`SimTransport`] keeps posted operations until its owner decides how they
//! finish, so provider behavior can be driven deterministically without
//! hardware. It is a cloneable handle: give one clone to the [`Domain`] and
//! keep another to complete operations.
//!
//! [`Domain`]: crate::Domain

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex};

use super::*;
use crate::fabric::mr::Mr;
use crate::utils::interop::lock;

/// How a simulated operation finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    /// Completion status.
    pub error: TransportStatus,

    /// Tag of the matched message; defaults to the posted tag.
    pub msg_tag: Option<Tag>,

    /// Length sent by the peer; defaults to `nbytes`.
    pub msg_length: Option<usize>,

    /// Bytes transferred.
    pub nbytes: usize,
}

impl Outcome {
    /// A successful transfer of `nbytes` bytes.
    pub fn ok(nbytes: usize) -> Self {
        Self {
            error: TransportStatus::Ok,
            msg_tag: None,
            msg_length: None,
            nbytes,
        }
    }

    /// A failed operation that moved `nbytes` bytes before failing.
    pub fn failed(error: TransportStatus, nbytes: usize) -> Self {
        Self {
            error,
            ..Self::ok(nbytes)
        }
    }

    /// Set the tag of the matched message.
    pub fn tag(mut self, tag: Tag) -> Self {
        self.msg_tag = Some(tag);
        self
    }

    /// Set the length the peer sent.
    pub fn msg_length(mut self, len: usize) -> Self {
        self.msg_length = Some(len);
        self
    }
}

struct Posted {
    op: PostedOp,
    context: OpContext,
}

#[derive(Default)]
struct SimState {
    next_req: RequestId,
    posted: BTreeMap<RequestId, Posted>,
    ready: VecDeque<RequestId>,
    finished: HashMap<RequestId, NativeStatus>,
    staged_am: VecDeque<NativeStatus>,
    peers: HashMap<Epid, FiAddr>,
    fail_peek: Option<TransportStatus>,
    fail_post: Option<TransportStatus>,
}

impl SimState {
    fn alloc_req(&mut self) -> RequestId {
        self.next_req += 1;
        self.next_req
    }

    fn finish(&mut self, status: NativeStatus) -> RequestId {
        let req = self.alloc_req();
        self.finished.insert(req, status);
        self.ready.push_back(req);
        req
    }
}

/// Simulated tag-matching transport.
#[derive(Clone, Default)]
pub struct SimTransport {
    inner: Arc<Mutex<SimState>>,
}

impl fmt::Debug for SimTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("SimTransport<{:p}>", Arc::as_ptr(&self.inner)))
    }
}

impl SimTransport {
    /// Create an empty simulated transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of outstanding operations, oldest first.
    pub fn posted(&self) -> Vec<(RequestId, PostedOp)> {
        lock(&self.inner)
            .posted
            .iter()
            .map(|(req, p)| (*req, p.op))
            .collect()
    }

    /// Number of outstanding operations.
    pub fn outstanding(&self) -> usize {
        lock(&self.inner).posted.len()
    }

    /// Number of finished requests not yet consumed by the provider.
    pub fn ready(&self) -> usize {
        lock(&self.inner).ready.len()
    }

    /// Finish an outstanding operation.
    pub fn complete(&self, req: RequestId, outcome: Outcome) -> Result<(), TransportStatus> {
        let mut state = lock(&self.inner);
        let Posted { op, context } = state
            .posted
            .remove(&req)
            .ok_or(TransportStatus::ParamErr)?;

        let posted_tag = match op {
            PostedOp::Send { tag, .. } | PostedOp::Recv { tag, .. } => tag,
            PostedOp::Write { .. } | PostedOp::Read { .. } => 0,
        };
        let status = NativeStatus {
            context,
            error: outcome.error,
            msg_tag: outcome.msg_tag.unwrap_or(posted_tag),
            msg_length: outcome.msg_length.unwrap_or(outcome.nbytes),
            nbytes: outcome.nbytes,
        };
        state.finished.insert(req, status);
        state.ready.push_back(req);
        Ok(())
    }

    /// Finish the oldest outstanding operation. Return its request id.
    pub fn complete_next(&self, outcome: Outcome) -> Option<RequestId> {
        let req = *lock(&self.inner).posted.keys().next()?;
        self.complete(req, outcome).ok()?;
        Some(req)
    }

    /// Stage a peer's write into `mr`. It becomes visible on the next active-message progress.
    pub fn remote_write(&self, mr: &Mr, data: ImmData, nbytes: usize) {
        lock(&self.inner).staged_am.push_back(NativeStatus {
            context: OpContext::RemoteWrite {
                mr: mr.clone(),
                data,
            },
            error: TransportStatus::Ok,
            msg_tag: PSMX_RMA_BIT,
            msg_length: nbytes,
            nbytes,
        });
    }

    /// Stage a peer's read from `mr`. It becomes visible on the next active-message progress.
    pub fn remote_read(&self, mr: &Mr, nbytes: usize) {
        lock(&self.inner).staged_am.push_back(NativeStatus {
            context: OpContext::RemoteRead { mr: mr.clone() },
            error: TransportStatus::Ok,
            msg_tag: PSMX_RMA_BIT,
            msg_length: nbytes,
            nbytes,
        });
    }

    /// Register a peer so that its epid resolves to `addr`.
    pub fn add_peer(&self, epid: Epid, addr: FiAddr) {
        lock(&self.inner).peers.insert(epid, addr);
    }

    /// Make the next peek fail with `status`.
    pub fn fail_next_peek(&self, status: TransportStatus) {
        lock(&self.inner).fail_peek = Some(status);
    }

    /// Make the next post fail with `status`.
    pub fn fail_next_post(&self, status: TransportStatus) {
        lock(&self.inner).fail_post = Some(status);
    }
}

impl Transport for SimTransport {
    fn ipeek(&mut self) -> Result<Option<RequestId>, TransportStatus> {
        let mut state = lock(&self.inner);
        if let Some(status) = state.fail_peek.take() {
            return Err(status);
        }
        Ok(state.ready.front().copied())
    }

    fn test(&mut self, req: RequestId) -> Result<NativeStatus, TransportStatus> {
        let mut state = lock(&self.inner);
        let status = state
            .finished
            .remove(&req)
            .ok_or(TransportStatus::ParamErr)?;
        state.ready.retain(|r| *r != req);
        Ok(status)
    }

    fn post(&mut self, op: PostedOp, context: OpContext) -> Result<RequestId, TransportStatus> {
        let mut state = lock(&self.inner);
        if let Some(status) = state.fail_post.take() {
            return Err(status);
        }
        let req = state.alloc_req();
        state.posted.insert(req, Posted { op, context });
        Ok(req)
    }

    fn am_progress(&mut self) -> Result<(), TransportStatus> {
        let mut state = lock(&self.inner);
        while let Some(status) = state.staged_am.pop_front() {
            state.finish(status);
        }
        Ok(())
    }

    fn epid_to_addr(&mut self, epid: Epid) -> Result<FiAddr, TransportStatus> {
        lock(&self.inner)
            .peers
            .get(&epid)
            .copied()
            .ok_or(TransportStatus::EpidUnknown)
    }
}
