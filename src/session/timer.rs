//! Timer facility used to expire sessions
//!
//! Cancellation is best-effort: once a callback has started (or is about to
//! start) a `cancel()` call cannot stop it. Anything scheduled here must be
//! safe to run after its handle was cancelled.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::trace;

/// Work to run when a timer fires
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a scheduled callback
pub trait TimerHandle: Send + Sync {
    /// Request that the callback not run. Not guaranteed to win a race with
    /// a callback that is already firing.
    fn cancel(&self);
}

/// Schedules callbacks after a delay
pub trait TimerService: Send + Sync {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> Box<dyn TimerHandle>;
}

/// Timer service backed by a tokio runtime
#[derive(Debug, Clone)]
pub struct TokioTimerService {
    runtime: Handle,
}

impl TokioTimerService {
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }

    /// Use the runtime of the calling context
    ///
    /// Panics when called outside of a tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }
}

struct TokioTimer {
    task: AbortHandle,
}

impl TimerHandle for TokioTimer {
    fn cancel(&self) {
        self.task.abort();
    }
}

impl TimerService for TokioTimerService {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> Box<dyn TimerHandle> {
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        });

        Box::new(TokioTimer {
            task: task.abort_handle(),
        })
    }
}

struct PendingTimer {
    callback: TimerCallback,
    cancelled: Arc<AtomicBool>,
}

#[derive(Default)]
struct ManualClock {
    now: Duration,
    next_seq: u64,
    pending: BTreeMap<(Duration, u64), PendingTimer>,
}

/// Deterministic timer service driven by [`advance`](ManualTimerService::advance)
///
/// With [`lagging_cancel`](ManualTimerService::lagging_cancel) a cancelled
/// callback still fires at its deadline, reproducing a callback that was
/// already in flight when it was cancelled.
#[derive(Clone, Default)]
pub struct ManualTimerService {
    clock: Arc<Mutex<ManualClock>>,
    ignore_cancel: bool,
}

struct ManualTimer {
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle for ManualTimer {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

impl ManualTimerService {
    pub fn new() -> Self {
        Self::default()
    }

    /// A service whose `cancel()` never prevents a callback from running
    pub fn lagging_cancel() -> Self {
        Self {
            clock: Arc::default(),
            ignore_cancel: true,
        }
    }

    /// Current virtual time
    pub fn now(&self) -> Duration {
        self.clock.lock().unwrap_or_else(PoisonError::into_inner).now
    }

    /// Callbacks scheduled and not yet fired (cancelled ones included)
    pub fn pending(&self) -> usize {
        self.clock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .len()
    }

    /// Move virtual time forward, running every callback that becomes due
    ///
    /// Callbacks run in deadline order on the calling thread without the
    /// clock lock held, so they may schedule further timers; those fire in
    /// the same call if they fall inside the window.
    pub fn advance(&self, by: Duration) {
        let target = self.now() + by;

        loop {
            let due = {
                let mut clock = self.clock.lock().unwrap_or_else(PoisonError::into_inner);
                let key = match clock.pending.keys().next() {
                    Some(&key) if key.0 <= target => key,
                    _ => {
                        clock.now = target;
                        break;
                    }
                };
                clock.now = key.0;
                clock.pending.remove(&key)
            };

            if let Some(timer) = due {
                if timer.cancelled.load(Ordering::SeqCst) && !self.ignore_cancel {
                    trace!("Skipping cancelled manual timer");
                    continue;
                }
                (timer.callback)();
            }
        }
    }
}

impl TimerService for ManualTimerService {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> Box<dyn TimerHandle> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut clock = self.clock.lock().unwrap_or_else(PoisonError::into_inner);
        let deadline = clock.now + delay;
        let seq = clock.next_seq;
        clock.next_seq += 1;
        clock.pending.insert(
            (deadline, seq),
            PendingTimer {
                callback,
                cancelled: cancelled.clone(),
            },
        );

        Box::new(ManualTimer { cancelled })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter_callback(counter: &Arc<AtomicUsize>) -> TimerCallback {
        let counter = counter.clone();
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_manual_timer_fires_at_deadline() {
        let timers = ManualTimerService::new();
        let fired = Arc::new(AtomicUsize::new(0));

        timers.schedule(Duration::from_millis(100), counter_callback(&fired));
        timers.advance(Duration::from_millis(99));
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        timers.advance(Duration::from_millis(1));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(timers.now(), Duration::from_millis(100));
        assert_eq!(timers.pending(), 0);
    }

    #[test]
    fn test_manual_timer_cancel() {
        let timers = ManualTimerService::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let handle = timers.schedule(Duration::from_millis(10), counter_callback(&fired));
        handle.cancel();
        timers.advance(Duration::from_millis(20));

        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_lagging_cancel_still_fires() {
        let timers = ManualTimerService::lagging_cancel();
        let fired = Arc::new(AtomicUsize::new(0));

        let handle = timers.schedule(Duration::from_millis(10), counter_callback(&fired));
        handle.cancel();
        timers.advance(Duration::from_millis(20));

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callbacks_may_schedule_more_timers() {
        let timers = ManualTimerService::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let chained = {
            let timers = timers.clone();
            let fired = fired.clone();
            Box::new(move || {
                timers.schedule(Duration::ZERO, counter_callback(&fired));
            })
        };
        timers.schedule(Duration::from_millis(5), chained);
        timers.advance(Duration::from_millis(5));

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_tokio_timer_fires_and_cancels() {
        let timers = TokioTimerService::current();
        let fired = Arc::new(AtomicUsize::new(0));

        timers.schedule(Duration::from_millis(10), counter_callback(&fired));
        let cancelled = timers.schedule(Duration::from_millis(10), counter_callback(&fired));
        cancelled.cancel();

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
