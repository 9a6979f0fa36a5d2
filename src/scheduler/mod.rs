//! Deferred message deletion scheduler.
//!
//! Deletes messages the bot sent once their delay has elapsed,
//! independently of any dialogue state.

mod runner;
mod state;

pub use runner::DeletionScheduler;
pub use state::{DeletionId, PendingEntry};
