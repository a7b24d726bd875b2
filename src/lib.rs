//! Callback Relay - session-scoped job dispatch and persistent callback
//! routing for chat-platform interactions.
//!
//! An application renders UI elements (buttons, modals) whose callback
//! identifiers are persisted routes; when the transport delivers an event
//! for such an identifier, this crate routes it back to the exact handler
//! and session that produced it: ordered per session, bounded in
//! concurrency, and persisted transactionally.

pub mod cleanup;
pub mod dispatch;
pub mod queue;
pub mod store;
pub mod turn;
pub mod types;
pub mod worker;
