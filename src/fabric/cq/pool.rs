use serde::{Deserialize, Serialize};

use super::event::CompletionEvent;
use crate::fabric::error::{Error, Result};

/// What an event pool does when it runs dry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Application-synthesized completions fail with [`Error::OutOfMemory`].
    #[default]
    Fail,
    /// Allocate beyond the pool capacity; the surplus is freed on release.
    Grow,
}

/// Recycled storage for completion events.
///
/// Events are preallocated when the pool is created and handed back on
/// release. Completions arriving from the transport are never dropped for
/// lack of storage: they use overflow events, which are freed instead of
/// recycled once the pool is back above its capacity.
#[derive(Debug)]
pub(crate) struct EventPool {
    free: Vec<Box<CompletionEvent>>,
    capacity: usize,
    allocated: usize,
    policy: OverflowPolicy,
}

impl EventPool {
    /// Create a pool and preallocate `capacity` events.
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let free = (0..capacity)
            .map(|_| Box::<CompletionEvent>::default())
            .collect();
        Self {
            free,
            capacity,
            allocated: capacity,
            policy,
        }
    }

    /// Take a reset event for an application-synthesized completion.
    pub fn acquire(&mut self) -> Result<Box<CompletionEvent>> {
        if let Some(ev) = self.take_free() {
            return Ok(ev);
        }
        match self.policy {
            OverflowPolicy::Fail => {
                log::debug!(
                    "psmx: event pool exhausted ({} events outstanding)",
                    self.allocated
                );
                Err(Error::OutOfMemory)
            }
            OverflowPolicy::Grow => {
                log::warn!(
                    "psmx: event pool grows beyond its capacity of {}",
                    self.capacity
                );
                Ok(self.alloc())
            }
        }
    }

    /// Take a reset event for a transport-derived completion. Never fails.
    pub fn acquire_overflow(&mut self) -> Box<CompletionEvent> {
        match self.take_free() {
            Some(ev) => ev,
            None => {
                log::warn!(
                    "psmx: event pool overflow, {} events outstanding",
                    self.allocated
                );
                self.alloc()
            }
        }
    }

    /// Hand an event back.
    pub fn release(&mut self, ev: Box<CompletionEvent>) {
        if self.allocated > self.capacity {
            self.allocated -= 1;
            drop(ev);
        } else {
            self.free.push(ev);
        }
    }

    /// Free every idle event. Events still outstanding are freed when
    /// dropped by their holders.
    pub fn finalize(&mut self) {
        self.allocated -= self.free.len();
        self.free.clear();
        self.free.shrink_to_fit();
    }

    /// Number of events currently owned by this pool, idle or not.
    #[inline]
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    /// Number of idle events.
    #[inline]
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Nominal pool capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn take_free(&mut self) -> Option<Box<CompletionEvent>> {
        let mut ev = self.free.pop()?;
        *ev = CompletionEvent::default();
        Some(ev)
    }

    fn alloc(&mut self) -> Box<CompletionEvent> {
        self.allocated += 1;
        Box::default()
    }
}
