use std::collections::VecDeque;

use super::event::CompletionEvent;

/// FIFO of completion events awaiting delivery.
#[derive(Debug, Default)]
pub(crate) struct EventQueue {
    events: VecDeque<Box<CompletionEvent>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn enqueue(&mut self, ev: Box<CompletionEvent>) {
        self.events.push_back(ev);
    }

    #[inline]
    pub fn dequeue(&mut self) -> Option<Box<CompletionEvent>> {
        self.events.pop_front()
    }

    #[inline]
    pub fn front(&self) -> Option<&CompletionEvent> {
        self.events.front().map(|ev| &**ev)
    }

    /// Remove the head only if it satisfies `pred`.
    pub fn dequeue_if(
        &mut self,
        pred: impl FnOnce(&CompletionEvent) -> bool,
    ) -> Option<Box<CompletionEvent>> {
        if self.front().is_some_and(pred) {
            self.events.pop_front()
        } else {
            None
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = Box<CompletionEvent>> + '_ {
        self.events.drain(..)
    }
}
