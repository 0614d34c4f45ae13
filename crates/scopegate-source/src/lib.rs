//! Event source for scopegate
//!
//! This crate provides a logger with nested scopes that feeds a pipeline,
//! and a background task that emits sample events.

mod emitter;
mod logger;
mod scope;

pub use emitter::{EmitterSettings, SampleEmitter};
pub use logger::{Logger, LoggerOptions};
pub use scope::{LiveScopes, ScopeGuard, ScopeStack};
