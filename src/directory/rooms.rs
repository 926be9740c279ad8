//! Room creation and membership

use crate::error::{HallError, Result};
use crate::types::{RoomHandle, RoomId, UserId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use tracing::{debug, info};

/// Creates and tracks two-player rooms
#[cfg_attr(test, mockall::automock)]
pub trait RoomService: Send + Sync {
    /// Open a room with `white` moving first
    fn create_room(&self, white: UserId, black: UserId) -> Result<RoomHandle>;

    /// Room a user currently belongs to
    fn room_of_user(&self, user_id: UserId) -> Result<Option<RoomHandle>>;

    /// Take a user out of their room; the room is destroyed once empty.
    /// Returns whether the user was in a room.
    fn remove_room_user(&self, user_id: UserId) -> Result<bool>;
}

#[derive(Default)]
struct RoomTable {
    rooms: HashMap<RoomId, RoomEntry>,
    by_user: HashMap<UserId, RoomId>,
}

struct RoomEntry {
    handle: RoomHandle,
    members: usize,
}

/// Room bookkeeping kept in memory
pub struct InMemoryRoomService {
    table: RwLock<RoomTable>,
    next_id: AtomicU64,
}

impl Default for InMemoryRoomService {
    fn default() -> Self {
        Self {
            table: RwLock::new(RoomTable::default()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl InMemoryRoomService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn room_count(&self) -> usize {
        self.table.read().map(|table| table.rooms.len()).unwrap_or(0)
    }

    pub fn find_room(&self, room_id: RoomId) -> Result<RoomHandle> {
        let table = self
            .table
            .read()
            .map_err(|_| HallError::poisoned("rooms"))?;
        table
            .rooms
            .get(&room_id)
            .map(|entry| entry.handle)
            .ok_or_else(|| HallError::UnknownRoom { room_id }.into())
    }
}

impl RoomService for InMemoryRoomService {
    fn create_room(&self, white: UserId, black: UserId) -> Result<RoomHandle> {
        if white == black {
            return Err(HallError::RoomCreationFailed {
                white,
                black,
                reason: "a player cannot face themselves".to_string(),
            }
            .into());
        }

        let mut table = self
            .table
            .write()
            .map_err(|_| HallError::poisoned("rooms"))?;

        for user_id in [white, black] {
            if let Some(room_id) = table.by_user.get(&user_id) {
                return Err(HallError::RoomCreationFailed {
                    white,
                    black,
                    reason: format!("user {} is already in room {}", user_id, room_id),
                }
                .into());
            }
        }

        let room_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let handle = RoomHandle {
            room_id,
            white_id: white,
            black_id: black,
        };
        table.rooms.insert(
            room_id,
            RoomEntry {
                handle,
                members: 2,
            },
        );
        table.by_user.insert(white, room_id);
        table.by_user.insert(black, room_id);

        info!("Created room {} ({} vs {})", room_id, white, black);
        Ok(handle)
    }

    fn room_of_user(&self, user_id: UserId) -> Result<Option<RoomHandle>> {
        let table = self
            .table
            .read()
            .map_err(|_| HallError::poisoned("rooms"))?;
        Ok(table
            .by_user
            .get(&user_id)
            .and_then(|room_id| table.rooms.get(room_id))
            .map(|entry| entry.handle))
    }

    fn remove_room_user(&self, user_id: UserId) -> Result<bool> {
        let mut table = self
            .table
            .write()
            .map_err(|_| HallError::poisoned("rooms"))?;

        let room_id = match table.by_user.remove(&user_id) {
            Some(room_id) => room_id,
            None => return Ok(false),
        };

        let empty = match table.rooms.get_mut(&room_id) {
            Some(entry) => {
                entry.members = entry.members.saturating_sub(1);
                entry.members == 0
            }
            None => false,
        };
        if empty {
            table.rooms.remove(&room_id);
            info!("Destroyed empty room {}", room_id);
        } else {
            debug!("User {} left room {}", user_id, room_id);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_room_assigns_colours() {
        let rooms = InMemoryRoomService::new();
        let room = rooms.create_room(1, 2).unwrap();

        assert_eq!(room.room_id, 1);
        assert_eq!(room.white_id, 1);
        assert_eq!(room.black_id, 2);
        assert_eq!(rooms.room_of_user(2).unwrap(), Some(room));
        assert_eq!(rooms.find_room(room.room_id).unwrap(), room);

        let next = rooms.create_room(3, 4).unwrap();
        assert_eq!(next.room_id, 2);
    }

    #[test]
    fn test_create_room_rejects_busy_players() {
        let rooms = InMemoryRoomService::new();
        rooms.create_room(1, 2).unwrap();

        assert!(rooms.create_room(2, 3).is_err());
        assert!(rooms.create_room(5, 5).is_err());
        assert_eq!(rooms.room_count(), 1);
    }

    #[test]
    fn test_room_destroyed_when_empty() {
        let rooms = InMemoryRoomService::new();
        let room = rooms.create_room(1, 2).unwrap();

        assert!(rooms.remove_room_user(1).unwrap());
        assert!(!rooms.remove_room_user(1).unwrap());
        assert_eq!(rooms.room_count(), 1);

        assert!(rooms.remove_room_user(2).unwrap());
        assert_eq!(rooms.room_count(), 0);
        assert!(rooms.find_room(room.room_id).is_err());
        assert!(rooms.room_of_user(2).unwrap().is_none());
    }
}
