//! Core infrastructure.
//!
//! - [`config`] - Configuration parsing and validation
//! - [`error`] - Error types
//! - [`time`] - Clock abstraction and timestamps
//! - [`telemetry`] - Optional tracing subscriber setup

pub mod config;
pub mod error;
pub mod telemetry;
pub mod time;
