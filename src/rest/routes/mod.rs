//! Route handlers for the REST API.

pub mod checkpoints;
pub mod events;
pub mod gameplan;
pub mod health;
pub mod sessions;
pub mod settings;
pub mod steps;
