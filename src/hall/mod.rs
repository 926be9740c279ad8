//! Connection lifecycle layer
//!
//! Drives the session, presence and matchmaking components from the events
//! of a client's life: login, opening and closing the hall or room
//! connection, and hall requests.

pub mod service;

pub use service::HallService;
