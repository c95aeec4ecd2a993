// Thread-safe FIFO of completed rows
//
// The scanner pushes, consumers wait and pop. Every accessor takes the same
// lock, including len/peek, and iteration is only offered as a drain into an
// owned Vec.

use super::row::Row;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::Duration;

struct Inner<T> {
    queue: VecDeque<T>,
    stop_waiting: bool,
}

/// Blocking, ordered queue bridging the scanner and its consumers.
pub struct RowChannel<T = Row> {
    inner: Mutex<Inner<T>>,
    cond: Condvar,
}

impl<T> RowChannel<T> {
    /// New empty channel. Waiters block until data arrives or
    /// [`signal_stop`](Self::signal_stop) is called.
    pub fn new() -> Self {
        RowChannel {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                stop_waiting: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// Append an item and wake every waiter. Never blocks on capacity.
    pub fn push(&self, item: T) {
        let mut inner = self.inner.lock();
        inner.queue.push_back(item);
        drop(inner);
        self.cond.notify_all();
    }

    /// Block until the queue is non-empty or a stop was signalled.
    /// Callers still have to check emptiness afterwards.
    pub fn wait_until_nonempty_or_stopped(&self) {
        let mut inner = self.inner.lock();
        while inner.queue.is_empty() && !inner.stop_waiting {
            self.cond.wait(&mut inner);
        }
    }

    /// Like [`wait_until_nonempty_or_stopped`](Self::wait_until_nonempty_or_stopped)
    /// but gives up after `timeout`. Returns `true` if the queue is non-empty.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut inner = self.inner.lock();
        if inner.queue.is_empty() && !inner.stop_waiting {
            let _ = self.cond.wait_while_for(
                &mut inner,
                |i| i.queue.is_empty() && !i.stop_waiting,
                timeout,
            );
        }
        !inner.queue.is_empty()
    }

    /// Remove the oldest item.
    ///
    /// # Panics
    ///
    /// Panics if the channel is empty; wait first.
    pub fn pop_front(&self) -> T {
        match self.inner.lock().queue.pop_front() {
            Some(item) => item,
            None => panic!("pop_front on an empty RowChannel"),
        }
    }

    pub fn try_pop_front(&self) -> Option<T> {
        self.inner.lock().queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().queue.is_empty()
    }

    pub fn clear(&self) {
        self.inner.lock().queue.clear();
    }

    /// Take everything currently queued, in push order.
    pub fn drain(&self) -> Vec<T> {
        self.inner.lock().queue.drain(..).collect()
    }

    /// Take at most `max` of the oldest items.
    pub fn drain_up_to(&self, max: usize) -> Vec<T> {
        let mut inner = self.inner.lock();
        let n = max.min(inner.queue.len());
        inner.queue.drain(..n).collect()
    }

    /// Let waiters return even when the queue is empty (end of stream).
    pub fn signal_stop(&self) {
        self.inner.lock().stop_waiting = true;
        self.cond.notify_all();
    }

    /// Make waiters block on an empty queue again.
    pub fn signal_resume(&self) {
        self.inner.lock().stop_waiting = false;
        self.cond.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.lock().stop_waiting
    }
}

impl<T: Clone> RowChannel<T> {
    /// Clone of the oldest item, if any.
    pub fn peek_front(&self) -> Option<T> {
        self.inner.lock().queue.front().cloned()
    }
}

impl<T> Default for RowChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}
