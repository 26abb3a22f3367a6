//! Checkpoint protocol: a suspend-and-wait decision point per (session, resolution).
//!
//! The protocol itself lives in [`protocol`]. Observers learn an outcome
//! through [`watch`], which races the bus subscription against a point-query
//! poll using the combinator in [`race`]. [`sweep`] clears abandoned waits.

pub mod protocol;
pub mod race;
pub mod sweep;
pub mod watch;

pub use protocol::{CheckpointProtocol, OpenOutcome, ResolveStatus};
pub use race::first_some;
pub use sweep::StaleSweeper;
pub use watch::{
    observe, CheckpointFeed, CheckpointWatch, Delivery, ResolvedCheckpoint, WatchTarget,
    DEFAULT_POLL_INTERVAL,
};
