//! The session record shared between the registry and its callers

use crate::session::timer::TimerHandle;
use crate::types::{LoginState, SessionId, UserId};
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};

/// Expiry bookkeeping guarded by the session's own lock.
///
/// `generation` is bumped every time the expiry changes; a timer callback
/// only removes the session if the generation it captured is still current.
#[derive(Default)]
pub(crate) struct ExpiryState {
    pub(crate) generation: u64,
    pub(crate) timer: Option<Box<dyn TimerHandle>>,
}

/// A logged-in user's server-side session
pub struct Session {
    id: SessionId,
    user_id: UserId,
    state: RwLock<LoginState>,
    expiry: Mutex<ExpiryState>,
    created_at: DateTime<Utc>,
}

impl Session {
    pub(crate) fn new(id: SessionId, user_id: UserId, state: LoginState) -> Self {
        Self {
            id,
            user_id,
            state: RwLock::new(state),
            expiry: Mutex::new(ExpiryState::default()),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn state(&self) -> LoginState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_state(&self, state: LoginState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    pub fn is_logged_in(&self) -> bool {
        self.state() == LoginState::LoggedIn
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Whether an expiry timer is currently armed
    pub fn is_bounded(&self) -> bool {
        self.expiry().timer.is_some()
    }

    pub(crate) fn expiry(&self) -> MutexGuard<'_, ExpiryState> {
        self.expiry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("state", &self.state())
            .field("bounded", &self.is_bounded())
            .finish()
    }
}
