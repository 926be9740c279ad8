//! Online user tracking for the game hall and game rooms
//!
//! A user with a live connection is attached either to the hall (waiting,
//! possibly matchmaking) or to a room (playing). The two areas are tracked
//! independently; keeping a user out of both at once is the caller's job.

pub mod connection;
pub mod registry;

pub use connection::{ChannelConnection, ConnectionHandle, SharedConnection};
pub use registry::OnlineUserRegistry;
