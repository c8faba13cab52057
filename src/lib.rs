#![forbid(unsafe_code)]

//! Liveness supervisor for terminal-bound coding agents.
//!
//! A fixed-interval control loop samples each project's terminal session,
//! classifies it as healthy, stuck or dead, and applies the corrective
//! action the intervention policy picks.

pub mod backend;
pub mod bus;
pub mod classifier;
pub mod config;
pub mod errors;
pub mod http;
pub mod ipc;
pub mod models;
pub mod orchestrator;
pub mod persistence;
pub mod policy;
pub mod probe;
pub mod store;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
