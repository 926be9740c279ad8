//! Session registry with revocable expiry timers
//!
//! The timer service cannot promise that a cancelled callback will not run,
//! so each armed timer captures the session's expiry generation. Changing
//! the expiry bumps the generation; a callback whose generation is stale
//! finds nothing to do. This keeps a session alive after it was told to
//! live forever even if the old expiry callback was already in flight, and
//! makes sure an old short timer cannot cut a newly extended lifetime short.

use crate::error::{HallError, Result};
use crate::metrics::MetricsCollector;
use crate::session::session::{ExpiryState, Session};
use crate::session::timer::TimerService;
use crate::types::{Expiry, LoginState, SessionId, UserId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};
use std::time::Duration;
use tracing::{debug, error, info};

struct RegistryInner {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    next_id: AtomicU64,
    timers: Arc<dyn TimerService>,
    metrics: Arc<MetricsCollector>,
}

/// Concurrent map of live sessions
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

impl SessionRegistry {
    /// Create a registry that arms its expiry timers on `timers`
    pub fn new(timers: Arc<dyn TimerService>) -> Self {
        Self::with_metrics(timers, Arc::new(MetricsCollector::default()))
    }

    pub fn with_metrics(timers: Arc<dyn TimerService>, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                sessions: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                timers,
                metrics,
            }),
        }
    }

    /// Create a logged-in session for `user_id`; it starts without expiry
    pub fn create(&self, user_id: UserId) -> Result<Arc<Session>> {
        self.create_with_state(user_id, LoginState::LoggedIn)
    }

    pub fn create_with_state(&self, user_id: UserId, state: LoginState) -> Result<Arc<Session>> {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let session = Arc::new(Session::new(id, user_id, state));

        let active = {
            let mut sessions = self
                .inner
                .sessions
                .write()
                .map_err(|_| HallError::poisoned("sessions"))?;
            sessions.insert(id, session.clone());
            sessions.len()
        };

        self.inner.metrics.record_session_created(active);
        info!("Created session {} for user {}", id, user_id);
        Ok(session)
    }

    pub fn find(&self, session_id: SessionId) -> Result<Option<Arc<Session>>> {
        let sessions = self
            .inner
            .sessions
            .read()
            .map_err(|_| HallError::poisoned("sessions"))?;
        Ok(sessions.get(&session_id).cloned())
    }

    /// Insert an existing session handle, replacing any entry with its id
    pub fn append(&self, session: Arc<Session>) -> Result<()> {
        let mut sessions = self
            .inner
            .sessions
            .write()
            .map_err(|_| HallError::poisoned("sessions"))?;
        sessions.insert(session.id(), session);
        Ok(())
    }

    /// Delete a session; returns whether it existed
    pub fn remove(&self, session_id: SessionId) -> Result<bool> {
        let (removed, active) = {
            let mut sessions = self
                .inner
                .sessions
                .write()
                .map_err(|_| HallError::poisoned("sessions"))?;
            let removed = sessions.remove(&session_id);
            (removed, sessions.len())
        };

        match removed {
            Some(session) => {
                disarm(&mut session.expiry());
                self.inner.metrics.record_session_removed(active);
                info!("Removed session {}", session_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Change how long a session lives
    ///
    /// `Expiry::Forever` exempts it from expiry; `Expiry::After(d)` removes
    /// it once `d` elapses unless the expiry is changed again first.
    /// Returns `false` when the session does not exist.
    ///
    /// The map's write lock is held throughout, in the same order as the
    /// expiry callback takes it, so an in-flight callback either removes
    /// the session before this call looks it up or sees the new generation.
    pub fn set_expiry(&self, session_id: SessionId, expiry: Expiry) -> Result<bool> {
        let sessions = self
            .inner
            .sessions
            .write()
            .map_err(|_| HallError::poisoned("sessions"))?;
        let session = match sessions.get(&session_id) {
            Some(session) => session.clone(),
            None => {
                debug!("Cannot set expiry of unknown session {}", session_id);
                return Ok(false);
            }
        };

        let mut state = session.expiry();
        let transition = match (state.timer.is_some(), expiry) {
            (false, Expiry::Forever) => return Ok(true),
            (false, Expiry::After(delay)) => {
                self.arm(&mut state, session_id, delay);
                "arm"
            }
            (true, Expiry::Forever) => {
                disarm(&mut state);
                "disarm"
            }
            (true, Expiry::After(delay)) => {
                disarm(&mut state);
                self.arm(&mut state, session_id, delay);
                "rearm"
            }
        };
        drop(state);
        drop(sessions);

        self.inner.metrics.record_expiry_change(transition);
        debug!(
            "Session {} expiry {} ({:?})",
            session_id, transition, expiry
        );
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.inner
            .sessions
            .read()
            .map(|sessions| sessions.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn arm(&self, state: &mut ExpiryState, session_id: SessionId, delay: Duration) {
        state.generation += 1;
        let generation = state.generation;
        let registry: Weak<RegistryInner> = Arc::downgrade(&self.inner);

        let handle = self.inner.timers.schedule(
            delay,
            Box::new(move || {
                if let Some(inner) = registry.upgrade() {
                    inner.expire(session_id, generation);
                }
            }),
        );
        state.timer = Some(handle);
    }
}

/// Cancel the armed timer (best-effort) and invalidate its generation
fn disarm(state: &mut ExpiryState) {
    if let Some(timer) = state.timer.take() {
        timer.cancel();
    }
    state.generation += 1;
}

impl RegistryInner {
    /// Timer callback: remove the session if `generation` is still current
    fn expire(&self, session_id: SessionId, generation: u64) {
        let mut sessions = match self.sessions.write() {
            Ok(sessions) => sessions,
            Err(_) => {
                error!("Session map lock poisoned while expiring {}", session_id);
                return;
            }
        };

        let current = match sessions.get(&session_id) {
            Some(session) => session.clone(),
            None => return,
        };

        {
            let mut state = current.expiry();
            if state.generation != generation || state.timer.is_none() {
                debug!(
                    "Ignoring stale expiry of session {} (generation {} != {})",
                    session_id, generation, state.generation
                );
                return;
            }
            state.timer = None;
        }

        sessions.remove(&session_id);
        let active = sessions.len();
        drop(sessions);

        self.metrics.record_session_expired(active);
        info!("Session {} expired", session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::timer::ManualTimerService;
    use crate::types::SESSION_TIMEOUT;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn registry_with(timers: &ManualTimerService) -> SessionRegistry {
        SessionRegistry::new(Arc::new(timers.clone()))
    }

    #[test]
    fn test_create_assigns_increasing_ids() {
        let timers = ManualTimerService::new();
        let registry = registry_with(&timers);

        let first = registry.create(10).unwrap();
        let second = registry.create(20).unwrap();

        assert_eq!(first.id(), 1);
        assert_eq!(second.id(), 2);
        assert_eq!(second.user_id(), 20);
        assert!(first.is_logged_in());
        assert!(!first.is_bounded());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_bounded_session_expires() {
        let timers = ManualTimerService::new();
        let registry = registry_with(&timers);
        let session = registry.create(1).unwrap();

        assert!(registry.set_expiry(session.id(), SESSION_TIMEOUT.into()).unwrap());
        assert!(session.is_bounded());

        timers.advance(SESSION_TIMEOUT - ms(1));
        assert!(registry.find(session.id()).unwrap().is_some());

        timers.advance(ms(1));
        assert!(registry.find(session.id()).unwrap().is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unbounded_session_never_expires() {
        let timers = ManualTimerService::new();
        let registry = registry_with(&timers);
        let session = registry.create(1).unwrap();

        assert!(registry.set_expiry(session.id(), Expiry::Forever).unwrap());
        assert!(registry.set_expiry(session.id(), Expiry::Forever).unwrap());
        assert_eq!(timers.pending(), 0);

        timers.advance(ms(10_000_000));
        assert!(registry.find(session.id()).unwrap().is_some());
    }

    #[test]
    fn test_forever_survives_in_flight_expiry() {
        // The first timer still fires after being cancelled
        let timers = ManualTimerService::lagging_cancel();
        let registry = registry_with(&timers);
        let session = registry.create(1).unwrap();

        registry.set_expiry(session.id(), ms(30_000).into()).unwrap();
        timers.advance(ms(10));
        registry.set_expiry(session.id(), Expiry::Forever).unwrap();
        assert!(!session.is_bounded());

        timers.advance(ms(29_991));
        assert_eq!(timers.now(), ms(30_001));
        assert!(registry.find(session.id()).unwrap().is_some());
    }

    #[test]
    fn test_forever_racing_expiry_callback() {
        for _ in 0..2_000 {
            let timers = ManualTimerService::lagging_cancel();
            let registry = registry_with(&timers);
            let id = registry.create(1).unwrap().id();
            registry.set_expiry(id, ms(100).into()).unwrap();

            let start = Arc::new(std::sync::Barrier::new(2));
            let setter = {
                let registry = registry.clone();
                let start = start.clone();
                std::thread::spawn(move || {
                    start.wait();
                    registry.set_expiry(id, Expiry::Forever).unwrap()
                })
            };
            let firer = {
                let timers = timers.clone();
                std::thread::spawn(move || {
                    start.wait();
                    timers.advance(ms(100));
                })
            };

            let kept_forever = setter.join().unwrap();
            firer.join().unwrap();
            // Either the timer won and the session is gone, or it stays for good
            assert_eq!(registry.find(id).unwrap().is_some(), kept_forever);
            if kept_forever {
                timers.advance(ms(10_000));
                assert!(registry.find(id).unwrap().is_some());
            }
        }
    }

    #[test]
    fn test_rearm_racing_expiry_callback_keeps_new_lifetime() {
        for _ in 0..2_000 {
            let timers = ManualTimerService::lagging_cancel();
            let registry = registry_with(&timers);
            let id = registry.create(1).unwrap().id();
            registry.set_expiry(id, ms(100).into()).unwrap();

            let start = Arc::new(std::sync::Barrier::new(2));
            let setter = {
                let registry = registry.clone();
                let start = start.clone();
                std::thread::spawn(move || {
                    start.wait();
                    registry.set_expiry(id, ms(1_000).into()).unwrap()
                })
            };
            let firer = {
                let timers = timers.clone();
                std::thread::spawn(move || {
                    start.wait();
                    timers.advance(ms(100));
                })
            };

            let rearmed = setter.join().unwrap();
            firer.join().unwrap();
            assert_eq!(registry.find(id).unwrap().is_some(), rearmed);
            if rearmed {
                assert!(timers.pending() >= 1, "a live timer must be armed");
            }
        }
    }

    #[test]
    fn test_rearm_ignores_old_timer() {
        let timers = ManualTimerService::lagging_cancel();
        let registry = registry_with(&timers);
        let session = registry.create(1).unwrap();

        registry.set_expiry(session.id(), ms(100).into()).unwrap();
        timers.advance(ms(50));
        registry.set_expiry(session.id(), ms(1000).into()).unwrap();

        timers.advance(ms(100));
        assert!(
            registry.find(session.id()).unwrap().is_some(),
            "the stale 100ms timer must not remove the session"
        );

        timers.advance(ms(900));
        assert!(registry.find(session.id()).unwrap().is_none());
    }

    #[test]
    fn test_bounded_again_after_forever() {
        let timers = ManualTimerService::new();
        let registry = registry_with(&timers);
        let session = registry.create(1).unwrap();

        registry.set_expiry(session.id(), ms(100).into()).unwrap();
        registry.set_expiry(session.id(), Expiry::Forever).unwrap();
        registry.set_expiry(session.id(), ms(200).into()).unwrap();

        timers.advance(ms(199));
        assert!(registry.find(session.id()).unwrap().is_some());
        timers.advance(ms(1));
        assert!(registry.find(session.id()).unwrap().is_none());
    }

    #[test]
    fn test_remove_is_idempotent_and_disarms() {
        let timers = ManualTimerService::lagging_cancel();
        let registry = registry_with(&timers);
        let session = registry.create(1).unwrap();
        registry.set_expiry(session.id(), ms(100).into()).unwrap();

        assert!(registry.remove(session.id()).unwrap());
        assert!(!registry.remove(session.id()).unwrap());

        // Re-inserting the handle must not let the old timer remove it
        registry.append(session.clone()).unwrap();
        timers.advance(ms(200));
        assert!(registry.find(session.id()).unwrap().is_some());
    }

    #[test]
    fn test_set_expiry_unknown_session() {
        let timers = ManualTimerService::new();
        let registry = registry_with(&timers);

        assert!(!registry.set_expiry(99, Expiry::Forever).unwrap());
        assert!(!registry.set_expiry(99, ms(5).into()).unwrap());
        assert_eq!(timers.pending(), 0);
    }

    #[test]
    fn test_login_state_is_mutable() {
        let timers = ManualTimerService::new();
        let registry = registry_with(&timers);
        let session = registry
            .create_with_state(5, LoginState::LoggedOut)
            .unwrap();

        assert!(!session.is_logged_in());
        session.set_state(LoginState::LoggedIn);
        assert!(session.is_logged_in());
    }

    #[test]
    fn test_concurrent_expiry_changes_leave_single_outcome() {
        let timers = ManualTimerService::lagging_cancel();
        let registry = registry_with(&timers);
        let session = registry.create(1).unwrap();
        let id = session.id();

        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for round in 0..50u64 {
                        let expiry = if (worker + round) % 2 == 0 {
                            Expiry::Forever
                        } else {
                            Expiry::After(ms(100 + round))
                        };
                        registry.set_expiry(id, expiry).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        registry.set_expiry(id, Expiry::Forever).unwrap();
        timers.advance(ms(10_000));
        assert!(registry.find(id).unwrap().is_some());
    }
}
