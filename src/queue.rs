use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::types::ServerMessage;

/// FIFO buffer decoupling the transport's asynchronous arrival from
/// the single-consumer decode loop.
///
/// `try_begin_drain` hands out at most one [`DrainGuard`] at a time:
/// a decode trigger that fires while a pass is still running observes
/// the guard and no-ops instead of starting a second pass. That is
/// what keeps the decoder's partial buffer single-writer.
pub struct InboundQueue {
    pending: Mutex<VecDeque<ServerMessage>>,
    draining: AtomicBool,
}

impl InboundQueue {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            draining: AtomicBool::new(false),
        }
    }

    pub fn push(&self, message: ServerMessage) {
        self.pending().push_back(message);
    }

    pub fn pop(&self) -> Option<ServerMessage> {
        self.pending().pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending().is_empty()
    }

    pub fn clear(&self) {
        self.pending().clear();
    }

    /// Claims the consumer slot. Returns `None` while another pass is
    /// in progress.
    pub fn try_begin_drain(&self) -> Option<DrainGuard<'_>> {
        if self.draining.swap(true, Ordering::AcqRel) {
            None
        } else {
            Some(DrainGuard { queue: self })
        }
    }

    fn pending(&self) -> MutexGuard<'_, VecDeque<ServerMessage>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for InboundQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Held for the duration of one decode pass; releases the consumer
/// slot on drop.
pub struct DrainGuard<'a> {
    queue: &'a InboundQueue,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.queue.draining.store(false, Ordering::Release);
    }
}
