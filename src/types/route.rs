//! The persisted route entity and its creation request.
//!
//! A route maps an opaque callback identifier (embedded in an outbound UI
//! payload) to a handler method and an owning session. Routes are the only
//! bridge between the transport's "a button was pressed" notification and
//! the session-scoped code that must run in response.
//!
//! # Named vs. unnamed routes
//!
//! A route created with a `name` has a stable identity: re-creating it with
//! the same `(session_id, name)` pair returns the existing route, so a
//! recurring UI element (a pagination arrow, say) keeps one callback
//! identifier across re-renders. An unnamed route is ephemeral: it is
//! single-use and purged whenever its owning session is re-rendered, so a
//! stale button from a superseded render cannot be replayed.

use serde::{Deserialize, Serialize};

use super::ids::{HandlerKey, RouteId, SessionId};

/// The kind of transport callback a route answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteKind {
    /// A message component interaction (button, select menu).
    Component,
    /// A modal submission.
    Modal,
}

/// Free-form parameter slots passed through to the handler.
///
/// Three slots, mirroring what fits in a compact persisted row; typical use
/// is a pagination offset or a target entity id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteParams([Option<String>; 3]);

impl RouteParams {
    /// Returns the parameter in slot `idx` (0..3), if set.
    pub fn get(&self, idx: usize) -> Option<&str> {
        self.0.get(idx).and_then(|p| p.as_deref())
    }

    fn set(&mut self, idx: usize, value: impl Into<String>) {
        if let Some(slot) = self.0.get_mut(idx) {
            *slot = Some(value.into());
        }
    }
}

/// A persisted mapping from an opaque callback identifier to a handler and
/// an owning session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// The opaque callback identifier, globally unique.
    pub id: RouteId,

    /// Stable key for idempotent re-creation, or `None` for a single-use
    /// ephemeral route.
    pub name: Option<String>,

    /// The kind of callback this route answers.
    pub kind: RouteKind,

    /// The handler method to invoke when the route fires.
    pub handler: HandlerKey,

    /// The owning session. A route cannot exist without one.
    pub session_id: SessionId,

    /// Whether invocation must be serialized against other synchronous
    /// invocations for the same session.
    pub synchronous: bool,

    /// Whether the transport should acknowledge receipt before the handler
    /// runs.
    pub deferred: bool,

    /// A session to delete when this route fires, commonly a now-obsolete
    /// session this route superseded.
    pub session_to_delete: Option<SessionId>,

    /// Free-form parameters passed through to the handler.
    pub params: RouteParams,
}

impl Route {
    /// True when the route is ephemeral (unnamed, single-use).
    pub fn is_ephemeral(&self) -> bool {
        self.name.is_none()
    }
}

/// A request to create a route, consumed by
/// [`create_route`](crate::store::routes::create_route).
///
/// Follows the builder style: start from [`RouteSpec::component`] or
/// [`RouteSpec::modal`], then chain the optional pieces.
///
/// # Examples
///
/// ```
/// use callback_relay::types::{HandlerKey, RouteSpec};
///
/// let spec = RouteSpec::component(HandlerKey::new("poll", "next_page"))
///     .named("next")
///     .param(0, "20");
/// assert_eq!(spec.name.as_deref(), Some("next"));
/// ```
#[derive(Debug, Clone)]
pub struct RouteSpec {
    pub kind: RouteKind,
    pub handler: HandlerKey,
    pub name: Option<String>,
    pub synchronous: bool,
    pub deferred: bool,
    pub session_to_delete: Option<SessionId>,
    pub params: RouteParams,
}

impl RouteSpec {
    /// Creates a spec for a message-component callback.
    ///
    /// Defaults: unnamed, synchronous, not deferred, no parameters.
    /// Synchronous-by-default means handlers opt *out* of ordering, never
    /// discover too late that they needed it.
    pub fn component(handler: HandlerKey) -> Self {
        RouteSpec::new(RouteKind::Component, handler)
    }

    /// Creates a spec for a modal callback.
    pub fn modal(handler: HandlerKey) -> Self {
        RouteSpec::new(RouteKind::Modal, handler)
    }

    fn new(kind: RouteKind, handler: HandlerKey) -> Self {
        RouteSpec {
            kind,
            handler,
            name: None,
            synchronous: true,
            deferred: false,
            session_to_delete: None,
            params: RouteParams::default(),
        }
    }

    /// Gives the route a stable name, making re-creation idempotent per
    /// `(session_id, name)`.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets whether invocation is serialized against sibling synchronous
    /// events for the same session.
    pub fn synchronous(mut self, synchronous: bool) -> Self {
        self.synchronous = synchronous;
        self
    }

    /// Sets whether the transport acknowledges receipt before the handler
    /// runs.
    pub fn deferred(mut self, deferred: bool) -> Self {
        self.deferred = deferred;
        self
    }

    /// Requests deletion of another (superseded) session when this route
    /// fires.
    pub fn delete_session(mut self, session: SessionId) -> Self {
        self.session_to_delete = Some(session);
        self
    }

    /// Sets parameter slot `idx` (0..3).
    pub fn param(mut self, idx: usize, value: impl Into<String>) -> Self {
        self.params.set(idx, value);
        self
    }

    /// Materializes the spec into a route owned by `session_id`, minting a
    /// fresh id.
    pub(crate) fn into_route(self, session_id: SessionId) -> Route {
        Route {
            id: RouteId::generate(),
            name: self.name,
            kind: self.kind,
            handler: self.handler,
            session_id,
            synchronous: self.synchronous,
            deferred: self.deferred,
            session_to_delete: self.session_to_delete,
            params: self.params,
        }
    }
}
