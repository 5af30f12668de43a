//! Provider domain.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::cntr::Counter;
use super::context::OpContext;
use super::cq::progress::poll_mq;
use super::cq::{Cq, CqAttr};
use super::ep::Endpoint;
use super::error::Result;
use super::mr::Mr;
use super::transport::{PostedOp, RequestId, Transport};
use super::type_alias::*;
use crate::config::ProviderConfig;
use crate::utils::interop::lock;

/// Ownership holder of a domain.
struct DomainInner {
    transport: Mutex<Box<dyn Transport>>,
    config: ProviderConfig,
    next_key: AtomicU64,
}

/// A provider domain: one transport instance and the objects opened on it.
///
/// All progress on the domain's transport is serialized by the domain. CQs,
/// endpoints, counters and memory regions opened here keep the domain alive.
pub struct Domain {
    inner: Arc<DomainInner>,
}

impl_shared_handle!(Domain, "Domain");

impl Domain {
    /// Create a domain over `transport`.
    pub fn new(transport: impl Transport + 'static, config: ProviderConfig) -> Self {
        Self {
            inner: Arc::new(DomainInner {
                transport: Mutex::new(Box::new(transport)),
                config,
                next_key: AtomicU64::new(1),
            }),
        }
    }

    /// Get the provider configuration.
    #[inline]
    pub fn config(&self) -> &ProviderConfig {
        &self.inner.config
    }

    /// Open a completion queue.
    pub fn open_cq(&self, attr: &CqAttr, context: UserContext) -> Result<Cq> {
        Cq::open(self, attr, context)
    }

    /// Create an endpoint.
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self)
    }

    /// Create a counter.
    pub fn counter(&self) -> Counter {
        Counter::new()
    }

    /// Register `len` bytes at `addr` for remote access.
    pub fn reg_mr(&self, addr: BufAddr, len: usize, context: UserContext) -> Mr {
        let key = self.inner.next_key.fetch_add(1, Ordering::Relaxed);
        Mr::new(addr, len, key, context)
    }

    /// Run active-message handlers, then route every finished request.
    ///
    /// Applications that only use counters call this to make progress.
    pub fn progress(&self) -> Result<()> {
        self.am_progress()?;
        poll_mq(self, None)?;
        Ok(())
    }
}

impl Domain {
    /// Lock the transport. Never take a CQ state lock before this one.
    pub(crate) fn transport(&self) -> MutexGuard<'_, Box<dyn Transport>> {
        lock(&self.inner.transport)
    }

    pub(crate) fn am_progress(&self) -> Result<()> {
        Ok(self.transport().am_progress()?)
    }

    pub(crate) fn post(&self, op: PostedOp, context: OpContext) -> Result<RequestId> {
        Ok(self.transport().post(op, context)?)
    }

    /// Resolve a peer's epid to its address.
    pub(crate) fn resolve(&self, epid: Epid) -> Result<FiAddr> {
        Ok(self.transport().epid_to_addr(epid)?)
    }
}
