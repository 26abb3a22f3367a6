//! Gameplan step control: page sequences, the current step and live reordering

pub mod edit;
pub mod manager;
pub mod reorder;

pub use edit::{EditEffect, GameplanEdit, GameplanEdited};
pub use manager::{classify, format_progress, PagePhase, Redirect, StepController};
pub use reorder::{move_item, remap_index};
