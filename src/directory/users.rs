//! Read access to user records

use crate::error::{HallError, Result};
use crate::types::{UserId, UserRecord};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

/// Lookup of user records by id
#[cfg_attr(test, mockall::automock)]
pub trait UserDirectory: Send + Sync {
    /// Fetch a user's record; `Ok(None)` when the user is unknown
    fn find_user(&self, user_id: UserId) -> Result<Option<UserRecord>>;
}

/// Directory kept entirely in memory
#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<UserId, UserRecord>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a user record
    pub fn insert(&self, user: UserRecord) -> Result<()> {
        let mut users = self
            .users
            .write()
            .map_err(|_| HallError::poisoned("user directory"))?;
        debug!("Registered user {} ({})", user.id, user.username);
        users.insert(user.id, user);
        Ok(())
    }

    pub fn set_score(&self, user_id: UserId, score: u32) -> Result<()> {
        let mut users = self
            .users
            .write()
            .map_err(|_| HallError::poisoned("user directory"))?;
        let user = users
            .get_mut(&user_id)
            .ok_or(HallError::UserNotFound { user_id })?;
        user.score = score;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.users.read().map(|users| users.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl UserDirectory for InMemoryUserDirectory {
    fn find_user(&self, user_id: UserId) -> Result<Option<UserRecord>> {
        let users = self
            .users
            .read()
            .map_err(|_| HallError::poisoned("user directory"))?;
        Ok(users.get(&user_id).cloned())
    }
}
