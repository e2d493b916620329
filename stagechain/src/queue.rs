//! Bounded, closable FIFO used as the work queue of every executor.
//!
//! Producers block while the queue is full (backpressure) and consumers block
//! while it is empty. Closing the queue is the one-shot shutdown signal: it
//! drops whatever is still queued and wakes every blocked producer and
//! consumer, after which `push` hands the item back and `pop` returns `None`.

use crate::errors::{Result, StagechainError};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Queue capacity used when a configuration does not name one.
pub const DEFAULT_QUEUE_CAPACITY: usize = 20;

/// Returned by [`BoundedQueue::push`] when the queue is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Closed<T>(pub T);

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// A capacity-limited, blocking FIFO.
pub struct BoundedQueue<T> {
    state: Mutex<QueueState<T>>,
    not_full: Condvar,
    not_empty: Condvar,
    capacity: usize,
    blocked_pushes: AtomicU64,
}

impl<T> BoundedQueue<T> {
    /// Creates a queue holding at most `capacity` items.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(StagechainError::InvalidCapacity(capacity));
        }
        Ok(Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            capacity,
            blocked_pushes: AtomicU64::new(0),
        })
    }

    /// Appends an item, blocking while the queue is full.
    ///
    /// Returns the item inside [`Closed`] if the queue is closed before a
    /// slot frees up.
    pub fn push(&self, item: T) -> std::result::Result<(), Closed<T>> {
        let mut state = self.state.lock();
        if state.items.len() >= self.capacity && !state.closed {
            self.blocked_pushes.fetch_add(1, Ordering::Relaxed);
            while state.items.len() >= self.capacity && !state.closed {
                self.not_full.wait(&mut state);
            }
        }
        if state.closed {
            return Err(Closed(item));
        }
        state.items.push_back(item);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Removes the oldest item, blocking while the queue is empty.
    ///
    /// Returns `None` once the queue is closed.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(item) = state.items.pop_front() {
                drop(state);
                self.not_full.notify_one();
                return Some(item);
            }
            self.not_empty.wait(&mut state);
        }
    }

    /// Closes the queue, discards queued items and wakes every blocked
    /// thread.
    ///
    /// Discarded items are dropped after the lock is released, so their
    /// destructors may touch the queue. Returns `true` for the call that
    /// actually closed it.
    pub fn close(&self) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        state.closed = true;
        let discarded = std::mem::take(&mut state.items);
        drop(state);
        self.not_empty.notify_all();
        self.not_full.notify_all();
        drop(discarded);
        true
    }

    /// Returns whether the queue has been closed.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Snapshot of the number of queued items.
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Snapshot of whether the queue holds no items.
    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    /// Maximum number of queued items.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of pushes that had to wait for a free slot.
    pub fn blocked_pushes(&self) -> u64 {
        self.blocked_pushes.load(Ordering::Relaxed)
    }
}

impl<T> fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("BoundedQueue")
            .field("len", &state.items.len())
            .field("capacity", &self.capacity)
            .field("closed", &state.closed)
            .finish()
    }
}
