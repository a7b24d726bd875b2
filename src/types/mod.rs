//! Domain types: identifiers and the persisted route/session entities.

mod ids;
mod route;
mod session;

pub use ids::{HandlerKey, ROUTE_ID_PREFIX, RouteId, SESSION_ID_PREFIX, SessionId};
pub use route::{Route, RouteKind, RouteParams, RouteSpec};
pub use session::SessionState;
