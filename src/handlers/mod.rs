//! Handler pipeline wrapping mutating operations.
//!
//! - [`matcher`] - Which keys a handler sees
//! - [`context`] - Operations and the context handlers rewrite
//! - [`pipeline`] - Registration and dispatch

pub mod context;
pub mod matcher;
pub mod pipeline;

pub use context::{FetchOptions, HandlerContext, Method, Operation, SetEntry, WriteOptions};
pub use matcher::{KeyPattern, Matcher};
pub use pipeline::{handler, Handler, Pipeline, PipelineStage};
