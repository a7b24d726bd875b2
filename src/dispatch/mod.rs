//! Event dispatch: handler registry, ingest protocol, and the engine.
//!
//! # Module Structure
//!
//! - [`registry`]: the startup-populated handler table and the context
//!   handlers run under
//! - [`engine`]: the assembled engine (ingest, job dispatch, lifecycle)

mod engine;
mod registry;


pub use engine::{DispatchError, Engine, EngineConfig, IngestOutcome, Responder, Result};
pub use registry::{Handler, HandlerContext, HandlerError, HandlerRegistry};
