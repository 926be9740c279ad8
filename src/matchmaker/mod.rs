//! Tiered matchmaking
//!
//! Players are bucketed by ladder score into three independent markets.
//! Each market has its own blocking queue and one dedicated worker thread
//! that pairs players in arrival order:
//!
//! ```text
//!   add(uid) ──score──▶ tier queue ──wake──▶ worker
//!                                              │ pop a, pop b
//!                                              │ both still in the hall?
//!                                              │ create room
//!                                              ▼
//!                                   match_success ──▶ a, b
//! ```
//!
//! Every failure inside a worker step is handled by putting the affected
//! players back in line; workers only stop when the matchmaker shuts down.

pub mod manager;
pub mod pairing;

pub use manager::{Matchmaker, MatchmakerConfig, MatchmakerStats};
pub use pairing::{PairOutcome, RequeueReason};
