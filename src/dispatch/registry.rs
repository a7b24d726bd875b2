//! Handler registry and the context handlers run under.
//!
//! A route persists a [`HandlerKey`]; dispatch resolves it here against an
//! explicit registry populated at startup. This replaces runtime
//! type/method reflection with a typed lookup while preserving the "route
//! stores an opaque handler reference, resolved later" behavior. The
//! registry is built once, handed to the engine, and never mutated again;
//! there is no ambient global state.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::warn;

use crate::queue::InteractionEvent;
use crate::store::{StoreError, UnitOfWork, routes};
use crate::types::{HandlerKey, Route, RouteSpec, SessionState};

/// An error raised inside invoked business logic.
///
/// Handler faults are caught at the pool level: the transaction rolls
/// back, the turn is released, the fault is logged once, and the job is
/// never retried.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        HandlerError {
            message: message.into(),
        }
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        HandlerError::new(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        HandlerError::new(message)
    }
}

impl From<StoreError> for HandlerError {
    fn from(error: StoreError) -> Self {
        HandlerError::new(error.to_string())
    }
}

/// A registered unit of business logic, invoked when a route fires.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Handles one interaction.
    ///
    /// The context exposes the loaded session for mutation, route creation
    /// for the re-rendered UI, and session lifecycle controls. Everything
    /// the handler does through the context lands in one transaction,
    /// committed after this method returns `Ok`.
    async fn handle(
        &self,
        cx: &mut HandlerContext<'_>,
        event: &InteractionEvent,
        route: &Route,
    ) -> Result<(), HandlerError>;
}

/// What a handler sees while it runs: the loaded session plus the pending
/// unit of work.
pub struct HandlerContext<'a> {
    uow: &'a mut dyn UnitOfWork,
    session: SessionState,
    delete_session: bool,
}

impl<'a> HandlerContext<'a> {
    pub(crate) fn new(uow: &'a mut dyn UnitOfWork, session: SessionState) -> Self {
        HandlerContext {
            uow,
            session,
            delete_session: false,
        }
    }

    /// The owning session, as loaded for this event.
    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Mutable access to the owning session; mutations persist on commit.
    pub fn session_mut(&mut self) -> &mut SessionState {
        &mut self.session
    }

    /// Creates a route owned by this session.
    ///
    /// The route becomes durable together with the session when the
    /// surrounding transaction commits; its id can be embedded in the
    /// outbound UI payload immediately.
    pub async fn create_route(&mut self, spec: RouteSpec) -> Result<Route, StoreError> {
        let session_id = self.session.id.clone();
        routes::create_route(&mut *self.uow, &session_id, spec).await
    }

    /// Sets an absolute expiry on the session.
    pub fn expire_at(&mut self, at: DateTime<Utc>) {
        self.session.expires_on = Some(at);
    }

    /// Sets the session to expire `ttl` from now.
    pub fn expire_in(&mut self, ttl: chrono::Duration) {
        self.session.expires_on = Some(Utc::now() + ttl);
    }

    /// Exempts the session from expiry cleanup.
    pub fn clear_expiry(&mut self) {
        self.session.expires_on = None;
    }

    /// Requests deletion of this session (and all its routes) instead of
    /// persisting it.
    pub fn delete_session(&mut self) {
        self.delete_session = true;
    }

    pub(crate) fn into_parts(self) -> (SessionState, bool) {
        (self.session, self.delete_session)
    }
}

impl fmt::Debug for HandlerContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerContext")
            .field("session", &self.session.id)
            .field("delete_session", &self.delete_session)
            .finish()
    }
}

/// The handler table, populated at startup.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<HandlerKey, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        HandlerRegistry::default()
    }

    /// Registers a handler under `key`, replacing (with a warning) any
    /// previous registration.
    pub fn register(&mut self, key: HandlerKey, handler: Arc<dyn Handler>) -> &mut Self {
        if self.handlers.insert(key.clone(), handler).is_some() {
            warn!(handler = %key, "handler re-registered; previous registration replaced");
        }
        self
    }

    /// Resolves a handler key to its registered handler.
    pub fn resolve(&self, key: &HandlerKey) -> Option<Arc<dyn Handler>> {
        self.handlers.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<String> = self.handlers.keys().map(|k| k.to_string()).collect();
        keys.sort();
        f.debug_struct("HandlerRegistry").field("keys", &keys).finish()
    }
}
