//! Waypoint - operator-guided multi-step sessions
//!
//! A visiting client walks an ordered sequence of pages while an operator
//! watches its input live and can approve, reject, redirect or reorder the
//! flow. Checkpoints suspend the client until the operator decides; the
//! decision is delivered over push and poll and consumed exactly once.

pub mod bus;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod flow;
pub mod gateway;
pub mod identity;
pub mod logging;
pub mod rest;
pub mod services;
pub mod sessions;
pub mod steps;
pub mod store;
pub mod types;
