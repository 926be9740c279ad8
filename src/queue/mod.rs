//! Blocking queues feeding the matchmaking workers
//!
//! Each skill tier owns one [`BlockingTierQueue`]; producers push waiting
//! players and a dedicated worker blocks until enough of them are present.

pub mod blocking;

pub use blocking::BlockingTierQueue;
