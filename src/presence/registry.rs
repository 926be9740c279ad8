//! Registry of online users keyed by area
//!
//! Each area has its own lock so that hall traffic from the matchmaking
//! workers never waits on room bookkeeping.

use crate::error::{HallError, Result};
use crate::presence::connection::SharedConnection;
use crate::types::{Area, UserId};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

type ConnectionMap = RwLock<HashMap<UserId, SharedConnection>>;

/// Tracks which users are attached to the hall or to a room
#[derive(Default)]
pub struct OnlineUserRegistry {
    hall: ConnectionMap,
    room: ConnectionMap,
}

impl OnlineUserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self, area: Area) -> &ConnectionMap {
        match area {
            Area::Hall => &self.hall,
            Area::Room => &self.room,
        }
    }

    /// Attach a user's connection to an area, replacing any previous one
    pub fn enter(&self, area: Area, user_id: UserId, conn: SharedConnection) -> Result<()> {
        let mut users = self
            .map(area)
            .write()
            .map_err(|_| HallError::poisoned("presence"))?;
        users.insert(user_id, conn);

        debug!("User {} entered the {} ({} online)", user_id, area, users.len());
        Ok(())
    }

    /// Detach a user from an area; returns whether they were present
    pub fn exit(&self, area: Area, user_id: UserId) -> Result<bool> {
        let mut users = self
            .map(area)
            .write()
            .map_err(|_| HallError::poisoned("presence"))?;
        let removed = users.remove(&user_id).is_some();

        if removed {
            debug!("User {} left the {} ({} online)", user_id, area, users.len());
        }
        Ok(removed)
    }

    pub fn contains(&self, area: Area, user_id: UserId) -> Result<bool> {
        let users = self
            .map(area)
            .read()
            .map_err(|_| HallError::poisoned("presence"))?;
        Ok(users.contains_key(&user_id))
    }

    /// Live connection of a user in the given area, if attached
    pub fn connection_of(&self, area: Area, user_id: UserId) -> Result<Option<SharedConnection>> {
        let users = self
            .map(area)
            .read()
            .map_err(|_| HallError::poisoned("presence"))?;
        Ok(users.get(&user_id).cloned())
    }

    /// Whether the user is attached to either area
    pub fn is_online(&self, user_id: UserId) -> Result<bool> {
        Ok(self.contains(Area::Hall, user_id)? || self.contains(Area::Room, user_id)?)
    }

    pub fn count(&self, area: Area) -> Result<usize> {
        let users = self
            .map(area)
            .read()
            .map_err(|_| HallError::poisoned("presence"))?;
        Ok(users.len())
    }
}
