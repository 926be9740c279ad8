//! External collaborators consumed by the hall core
//!
//! The user store and the room engine live outside this crate. The traits
//! here describe the part of them the matchmaker and the connection layer
//! rely on; the in-memory implementations back tests and the standalone
//! binary.

pub mod rooms;
pub mod users;

pub use rooms::{InMemoryRoomService, RoomService};
pub use users::{InMemoryUserDirectory, UserDirectory};
