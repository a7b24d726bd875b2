//! Work items carried by the worker pool's channel.
//!
//! A job is either an interaction to dispatch (a resolved route plus the
//! external event that fired it) or an internal maintenance signal. Jobs are
//! transient and in-memory only; nothing about them is persisted.

use serde::{Deserialize, Serialize};

use crate::types::Route;

/// The external event object delivered by the transport, opaque to the
/// engine.
///
/// The `interaction_id` is the transport's own identifier for the event and
/// serves as the correlating identifier in fault logs; `data` is passed
/// through to the handler untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionEvent {
    /// Transport-assigned identifier, used to correlate log lines with
    /// transport-side records.
    pub interaction_id: String,

    /// Arbitrary event payload, passed through to the handler.
    pub data: serde_json::Value,
}

impl InteractionEvent {
    pub fn new(interaction_id: impl Into<String>, data: serde_json::Value) -> Self {
        InteractionEvent {
            interaction_id: interaction_id.into(),
            data,
        }
    }
}

/// A unit of work for the pool.
///
/// `Job` is `Clone` so a repeating registration can re-enqueue the same job
/// on every tick.
#[derive(Debug, Clone)]
pub enum Job {
    /// Dispatch an inbound interaction through its resolved route.
    Interaction {
        /// The route as resolved at ingest time. The dispatch body
        /// re-resolves by id before invoking, so a route purged in the
        /// meantime is treated as expired rather than replayed.
        route: Route,
        event: InteractionEvent,
    },

    /// Run one session-expiry cleanup pass.
    Cleanup,
}

impl Job {
    /// Short job type tag for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Job::Interaction { .. } => "interaction",
            Job::Cleanup => "cleanup",
        }
    }

    /// Correlating identifier for logs: the transport's interaction id, or
    /// a fixed tag for internal jobs.
    pub fn correlation(&self) -> &str {
        match self {
            Job::Interaction { event, .. } => &event.interaction_id,
            Job::Cleanup => "scheduled",
        }
    }
}
