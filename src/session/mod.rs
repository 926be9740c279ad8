//! Login session management
//!
//! A session binds a logged-in user to the clients that present its id.
//! While the user has a live hall or room connection the session never
//! expires; once they leave it is given a bounded lifetime so that an
//! abandoned login eventually disappears.
//!
//! ```text
//! create() ──→ [unbounded] ──set_expiry(After)──→ [bounded] ──timer fires──→ removed
//!                   ↑                                  │
//!                   └────────set_expiry(Forever)───────┘
//! ```

pub mod registry;
pub mod session;
pub mod timer;

pub use registry::SessionRegistry;
pub use session::Session;
pub use timer::{
    ManualTimerService, TimerCallback, TimerHandle, TimerService, TokioTimerService,
};
