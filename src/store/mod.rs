//! Store boundary: durable persistence for sessions and routes.
//!
//! The engine does not bring its own persistence engine; it talks to an
//! external transactional store through the [`Store`] and [`UnitOfWork`]
//! traits. A unit of work is a buffered, read-your-writes overlay: writes
//! are visible to reads *within* the unit immediately, become durable only
//! at [`commit`](UnitOfWork::commit), and are discarded when the unit is
//! dropped without committing. That overlay is also what keeps a freshly
//! created route "pending" until its owning session is actually persisted:
//! the two land in the same commit or not at all.
//!
//! A fresh unit of work is opened per job; none is shared across jobs or
//! suspension points, so the only cross-job coordination is the
//! TurnManager's logical gate and the store's own transaction isolation.
//!
//! [`MemoryStore`] is the in-process implementation used by tests and
//! embeddings; [`routes`] holds the route lifecycle operations that run on
//! top of any implementation.

pub mod memory;
pub mod routes;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::{Route, RouteId, SessionId, SessionState};

/// Errors from the durable store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store rejected or failed the operation.
    #[error("store backend error: {0}")]
    Backend(String),

    /// A row could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// A durable store that can open transactional units of work.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Opens a fresh unit of work.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;
}

/// One transactional unit of work over the session and route tables.
///
/// Reads observe this unit's own pending writes first (read-your-writes),
/// then the durable rows. Dropping the unit without calling `commit`
/// discards every pending write; that is the rollback path.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Loads a session by id.
    async fn session(&mut self, id: &SessionId) -> Result<Option<SessionState>>;

    /// Upserts a session.
    async fn put_session(&mut self, session: SessionState) -> Result<()>;

    /// Deletes a session row. Deleting an absent row is a no-op.
    async fn delete_session(&mut self, id: &SessionId) -> Result<()>;

    /// Ids of all sessions with `expires_on <= now`.
    async fn expired_sessions(&mut self, now: DateTime<Utc>) -> Result<Vec<SessionId>>;

    /// Loads a route by id.
    async fn route(&mut self, id: &RouteId) -> Result<Option<Route>>;

    /// Loads a route by its stable `(session, name)` identity.
    async fn route_by_name(&mut self, session: &SessionId, name: &str) -> Result<Option<Route>>;

    /// All routes owned by a session.
    async fn routes_for_session(&mut self, session: &SessionId) -> Result<Vec<Route>>;

    /// Upserts a route.
    async fn put_route(&mut self, route: Route) -> Result<()>;

    /// Deletes a route. Deleting an absent route is a no-op.
    async fn delete_route(&mut self, id: &RouteId) -> Result<()>;

    /// Applies every pending write atomically.
    async fn commit(self: Box<Self>) -> Result<()>;
}

pub use memory::MemoryStore;
