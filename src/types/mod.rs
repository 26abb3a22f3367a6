//! Record types shared by the store, the gateway and the REST surface.

mod event;
mod gameplan;
mod session;

pub use event::{CheckpointStatus, CheckpointView, DualOutcome, Event, EventBody, EventId};
pub use gameplan::{Gameplan, Page, StepState};
pub use session::{Session, SessionId, SessionOrigin, SessionStatus};
