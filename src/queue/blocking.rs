//! Mutex-guarded FIFO with broadcast wake-ups and out-of-order removal
//!
//! The queue is a classic monitor: every operation takes the same mutex and
//! `push` wakes every blocked waiter so that each one re-evaluates its own
//! predicate (a worker waiting for two entries must see every single push).

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// A blocking queue of waiting entries for a single tier
#[derive(Debug)]
pub struct BlockingTierQueue<T> {
    state: Mutex<QueueState<T>>,
    signal: Condvar,
}

impl<T> BlockingTierQueue<T> {
    /// Create an empty, open queue
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                closed: false,
            }),
            signal: Condvar::new(),
        }
    }

    // No operation panics while mutating, so a poisoned guard still holds
    // a consistent queue.
    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of queued entries
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// Whether the queue currently holds no entries
    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Append to the tail and wake all waiters
    pub fn push(&self, item: T) {
        let mut state = self.lock();
        state.items.push_back(item);
        self.signal.notify_all();
    }

    /// Remove and return the head without blocking
    pub fn pop(&self) -> Option<T> {
        self.lock().items.pop_front()
    }

    /// Suspend the calling thread until the next push (or close)
    ///
    /// There is no predicate inside: callers loop and re-check whatever
    /// condition they are waiting for. Spurious wake-ups are possible.
    pub fn wait_for_signal(&self) {
        let state = self.lock();
        if state.closed {
            return;
        }
        let _state = self
            .signal
            .wait(state)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Like [`wait_for_signal`](Self::wait_for_signal) but gives up after `timeout`.
    ///
    /// Returns `false` when the wait timed out.
    pub fn wait_for_signal_timeout(&self, timeout: Duration) -> bool {
        let state = self.lock();
        if state.closed {
            return true;
        }
        let (_state, result) = self
            .signal
            .wait_timeout(state, timeout)
            .unwrap_or_else(PoisonError::into_inner);
        !result.timed_out()
    }

    /// Block until at least `min` entries are queued or the queue is closed.
    ///
    /// The length is re-checked under the lock after every wake, so a push
    /// landing between a caller's check and its wait cannot be missed.
    /// Returns `false` if the queue was closed before the threshold was met.
    pub fn wait_until_len(&self, min: usize) -> bool {
        let mut state = self.lock();
        while state.items.len() < min {
            if state.closed {
                return false;
            }
            state = self
                .signal
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        true
    }

    /// Bounded variant of [`wait_until_len`](Self::wait_until_len).
    ///
    /// Returns `false` on close or when `timeout` elapses first.
    pub fn wait_until_len_timeout(&self, min: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        while state.items.len() < min {
            if state.closed {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .signal
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
        true
    }

    /// Mark the queue closed and wake every waiter
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        self.signal.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

impl<T: PartialEq> BlockingTierQueue<T> {
    /// Delete the first entry equal to `item`; returns whether one was found
    pub fn remove(&self, item: &T) -> bool {
        let mut state = self.lock();
        match state.items.iter().position(|queued| queued == item) {
            Some(index) => {
                state.items.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, item: &T) -> bool {
        self.lock().items.contains(item)
    }
}

impl<T: Clone> BlockingTierQueue<T> {
    /// Copy of the current contents in queue order
    pub fn snapshot(&self) -> Vec<T> {
        self.lock().items.iter().cloned().collect()
    }
}

impl<T> Default for BlockingTierQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fifo_order() {
        let queue = BlockingTierQueue::new();
        queue.push(1u64);
        queue.push(2);
        queue.push(3);

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(3));
        assert_eq!(queue.pop(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_remove_interior_entry() {
        let queue = BlockingTierQueue::new();
        for id in [10u64, 20, 30, 20] {
            queue.push(id);
        }

        assert!(queue.remove(&20));
        assert_eq!(queue.snapshot(), vec![10, 30, 20]);

        assert!(!queue.remove(&99));
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_waiter_blocks_until_two_entries() {
        let queue = Arc::new(BlockingTierQueue::new());
        let released = Arc::new(AtomicBool::new(false));

        let waiter = {
            let queue = queue.clone();
            let released = released.clone();
            thread::spawn(move || {
                let ready = queue.wait_until_len(2);
                released.store(true, Ordering::SeqCst);
                ready
            })
        };

        queue.push(1u64);
        thread::sleep(Duration::from_millis(50));
        assert!(!released.load(Ordering::SeqCst), "one entry must not release the waiter");

        queue.push(2);
        assert!(waiter.join().unwrap());
        assert!(released.load(Ordering::SeqCst));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_push_wakes_every_waiter() {
        let queue = Arc::new(BlockingTierQueue::<u64>::new());
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let queue = queue.clone();
                thread::spawn(move || queue.wait_until_len(1))
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        queue.push(5);

        for waiter in waiters {
            assert!(waiter.join().unwrap());
        }
    }

    #[test]
    fn test_close_releases_waiters() {
        let queue = Arc::new(BlockingTierQueue::<u64>::new());
        let waiter = {
            let queue = queue.clone();
            thread::spawn(move || queue.wait_until_len(2))
        };

        thread::sleep(Duration::from_millis(20));
        queue.close();

        assert!(!waiter.join().unwrap());
        assert!(queue.is_closed());

        // Once closed a waiter returns immediately
        queue.wait_for_signal();
    }

    #[test]
    fn test_wait_timeouts() {
        let queue = BlockingTierQueue::<u64>::new();
        assert!(!queue.wait_for_signal_timeout(Duration::from_millis(10)));
        assert!(!queue.wait_until_len_timeout(1, Duration::from_millis(10)));

        queue.push(1);
        assert!(queue.wait_until_len_timeout(1, Duration::from_millis(10)));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Push(u8),
        Pop,
        Remove(u8),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..8).prop_map(Op::Push),
            Just(Op::Pop),
            (0u8..8).prop_map(Op::Remove),
        ]
    }

    proptest! {
        #[test]
        fn prop_no_entry_lost_or_duplicated(ops in proptest::collection::vec(op_strategy(), 0..64)) {
            let queue = BlockingTierQueue::new();
            let mut counts = [0i64; 8];

            for op in ops {
                match op {
                    Op::Push(v) => {
                        queue.push(v);
                        counts[v as usize] += 1;
                    }
                    Op::Pop => {
                        if let Some(v) = queue.pop() {
                            counts[v as usize] -= 1;
                        }
                    }
                    Op::Remove(v) => {
                        if queue.remove(&v) {
                            counts[v as usize] -= 1;
                        }
                    }
                }
            }

            let mut remaining = [0i64; 8];
            for v in queue.snapshot() {
                remaining[v as usize] += 1;
            }
            prop_assert_eq!(remaining, counts);
        }
    }
}
