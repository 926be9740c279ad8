//! Gobang Hall - live backend of a two-player board game service
//!
//! This crate keeps login sessions whose expiry follows the client's
//! screen, tracks which users are present in the hall or in a room, and
//! pairs waiting players by ladder score on one worker thread per tier.

pub mod config;
pub mod directory;
pub mod error;
pub mod hall;
pub mod matchmaker;
pub mod metrics;
pub mod presence;
pub mod queue;
pub mod service;
pub mod session;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{HallError, Result};
pub use types::*;

// Re-export key components
pub use directory::{RoomService, UserDirectory};
pub use hall::HallService;
pub use matchmaker::Matchmaker;
pub use presence::{ConnectionHandle, OnlineUserRegistry};
pub use queue::BlockingTierQueue;
pub use session::{SessionRegistry, TimerService};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
