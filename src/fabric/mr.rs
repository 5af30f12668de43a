//! Memory regions.

use std::sync::{Arc, Mutex};

use super::cntr::Counter;
use super::cq::Cq;
use super::type_alias::*;
use crate::utils::interop::lock;

/// Where remote-access notifications on a region go.
#[derive(Clone, Default)]
pub(crate) struct MrBindings {
    pub cq: Option<Cq>,
    pub cntr: Option<Counter>,
}

/// Ownership holder of a memory region.
struct MrInner {
    addr: BufAddr,
    len: usize,
    key: u64,
    context: UserContext,
    bindings: Mutex<MrBindings>,
}

/// Memory region registered for remote access.
///
/// Peers' reads and writes into the region produce completions on the bound
/// CQ and bump the bound counter, since there is no local operation to
/// attribute them to.
pub struct Mr {
    inner: Arc<MrInner>,
}

impl_shared_handle!(Mr, "Mr");

impl Mr {
    pub(crate) fn new(addr: BufAddr, len: usize, key: u64, context: UserContext) -> Self {
        Self {
            inner: Arc::new(MrInner {
                addr,
                len,
                key,
                context,
                bindings: Mutex::new(MrBindings::default()),
            }),
        }
    }

    /// Route remote-access completions to `cq`.
    pub fn bind_cq(&self, cq: &Cq) {
        lock(&self.inner.bindings).cq = Some(cq.clone());
    }

    /// Count remote accesses on `cntr`.
    pub fn bind_cntr(&self, cntr: &Counter) {
        lock(&self.inner.bindings).cntr = Some(cntr.clone());
    }

    /// Get the application context reported in remote-access completions.
    #[inline]
    pub fn context(&self) -> UserContext {
        self.inner.context
    }

    /// Get the start address of the region.
    #[inline]
    pub fn addr(&self) -> BufAddr {
        self.inner.addr
    }

    /// Get the length of the region.
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len
    }

    /// Whether the region is zero-length.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.len == 0
    }

    /// Get the remote access key.
    #[inline]
    pub fn key(&self) -> u64 {
        self.inner.key
    }

    pub(crate) fn bindings(&self) -> MrBindings {
        lock(&self.inner.bindings).clone()
    }
}
