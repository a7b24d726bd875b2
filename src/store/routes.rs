//! Route lifecycle operations.
//!
//! These run on top of any [`UnitOfWork`] implementation and encode the
//! route lifecycle rules: idempotent creation for named routes, single-use
//! purging for unnamed ones, and full purge on session deletion.

use tracing::{debug, trace};

use crate::types::{Route, RouteId, RouteSpec, SessionId};

use super::{Result, UnitOfWork};

/// Resolves an inbound route id.
///
/// Checks the unit's pending overlay first, then the durable rows. `None`
/// is the normal outcome for an expired or already-consumed route: the
/// caller surfaces a generic "expired, please retry" response, nothing is
/// logged as an error.
pub async fn resolve(uow: &mut dyn UnitOfWork, id: &RouteId) -> Result<Option<Route>> {
    uow.route(id).await
}

/// Creates a route owned by `session`.
///
/// When the spec carries a name and a route with the same `(session, name)`
/// pair already exists, that route is returned unchanged: recurring UI
/// elements keep a stable identity across re-renders. Otherwise a fresh
/// high-entropy id is minted and the route is marked pending-insert; it
/// becomes durable together with its session at commit.
pub async fn create_route(
    uow: &mut dyn UnitOfWork,
    session: &SessionId,
    spec: RouteSpec,
) -> Result<Route> {
    if let Some(name) = spec.name.clone() {
        if let Some(existing) = uow.route_by_name(session, &name).await? {
            trace!(route = %existing.id, name = %name, "reusing named route");
            return Ok(existing);
        }
    }

    let route = spec.into_route(session.clone());
    trace!(route = %route.id, session = %session, "creating route");
    uow.put_route(route.clone()).await?;
    Ok(route)
}

/// Deletes all unnamed routes owned by `session`, returning how many were
/// removed.
///
/// Invoked whenever the session is about to be re-rendered: unnamed routes
/// are single-use, and purging them here means a stale button from a
/// superseded render can no longer be replayed. Named routes are untouched.
pub async fn purge_ephemeral(uow: &mut dyn UnitOfWork, session: &SessionId) -> Result<usize> {
    let mut removed = 0;
    for route in uow.routes_for_session(session).await? {
        if route.is_ephemeral() {
            uow.delete_route(&route.id).await?;
            removed += 1;
        }
    }
    if removed > 0 {
        debug!(session = %session, removed, "purged ephemeral routes");
    }
    Ok(removed)
}

/// Deletes every route owned by `session` (named and unnamed), returning
/// how many were removed. Invoked when the session itself is deleted.
pub async fn purge_all(uow: &mut dyn UnitOfWork, session: &SessionId) -> Result<usize> {
    let mut removed = 0;
    for route in uow.routes_for_session(session).await? {
        uow.delete_route(&route.id).await?;
        removed += 1;
    }
    if removed > 0 {
        debug!(session = %session, removed, "purged all routes");
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use crate::store::{MemoryStore, Store};
    use crate::types::{HandlerKey, SessionState};

    use super::*;

    fn spec() -> RouteSpec {
        RouteSpec::component(HandlerKey::new("poll", "vote"))
    }

    async fn store_with_session() -> (MemoryStore, SessionId) {
        let store = MemoryStore::new();
        let session = SessionState::new(Vec::new());
        let id = session.id.clone();
        let mut uow = store.begin().await.unwrap();
        uow.put_session(session).await.unwrap();
        uow.commit().await.unwrap();
        (store, id)
    }

    // ─── Creation ───

    #[tokio::test]
    async fn named_route_recreation_returns_identical_route() {
        let (store, session) = store_with_session().await;
        let mut uow = store.begin().await.unwrap();

        let first = create_route(uow.as_mut(), &session, spec().named("next"))
            .await
            .unwrap();
        let second = create_route(uow.as_mut(), &session, spec().named("next"))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        uow.commit().await.unwrap();

        // Still idempotent across commits.
        let mut again = store.begin().await.unwrap();
        let third = create_route(again.as_mut(), &session, spec().named("next"))
            .await
            .unwrap();
        assert_eq!(first.id, third.id);
        assert_eq!(store.route_count().await, 1);
    }

    #[tokio::test]
    async fn same_name_different_sessions_are_distinct_routes() {
        let (store, session_a) = store_with_session().await;
        let session_b = SessionId::generate();

        let mut uow = store.begin().await.unwrap();
        let a = create_route(uow.as_mut(), &session_a, spec().named("next"))
            .await
            .unwrap();
        let b = create_route(uow.as_mut(), &session_b, spec().named("next"))
            .await
            .unwrap();
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn unnamed_routes_are_always_fresh() {
        let (store, session) = store_with_session().await;
        let mut uow = store.begin().await.unwrap();

        let first = create_route(uow.as_mut(), &session, spec()).await.unwrap();
        let second = create_route(uow.as_mut(), &session, spec()).await.unwrap();

        assert_ne!(first.id, second.id);
    }

    // ─── Resolution ───

    #[tokio::test]
    async fn resolve_sees_pending_and_committed_routes() {
        let (store, session) = store_with_session().await;

        let mut uow = store.begin().await.unwrap();
        let pending = create_route(uow.as_mut(), &session, spec()).await.unwrap();
        assert!(resolve(uow.as_mut(), &pending.id).await.unwrap().is_some());
        uow.commit().await.unwrap();

        let mut later = store.begin().await.unwrap();
        assert!(resolve(later.as_mut(), &pending.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn resolve_unknown_route_is_none_not_error() {
        let (store, _) = store_with_session().await;
        let mut uow = store.begin().await.unwrap();
        assert!(resolve(uow.as_mut(), &RouteId::generate())
            .await
            .unwrap()
            .is_none());
    }

    // ─── Purging ───

    #[tokio::test]
    async fn purge_ephemeral_spares_named_routes() {
        let (store, session) = store_with_session().await;

        let mut uow = store.begin().await.unwrap();
        let named = create_route(uow.as_mut(), &session, spec().named("next"))
            .await
            .unwrap();
        let ephemeral_a = create_route(uow.as_mut(), &session, spec()).await.unwrap();
        let ephemeral_b = create_route(uow.as_mut(), &session, spec()).await.unwrap();
        uow.commit().await.unwrap();

        let mut uow = store.begin().await.unwrap();
        let removed = purge_ephemeral(uow.as_mut(), &session).await.unwrap();
        assert_eq!(removed, 2);
        uow.commit().await.unwrap();

        let mut check = store.begin().await.unwrap();
        assert!(resolve(check.as_mut(), &named.id).await.unwrap().is_some());
        assert!(resolve(check.as_mut(), &ephemeral_a.id).await.unwrap().is_none());
        assert!(resolve(check.as_mut(), &ephemeral_b.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn purge_all_removes_named_routes_too() {
        let (store, session) = store_with_session().await;

        let mut uow = store.begin().await.unwrap();
        create_route(uow.as_mut(), &session, spec().named("next"))
            .await
            .unwrap();
        create_route(uow.as_mut(), &session, spec()).await.unwrap();
        uow.commit().await.unwrap();

        let mut uow = store.begin().await.unwrap();
        let removed = purge_all(uow.as_mut(), &session).await.unwrap();
        assert_eq!(removed, 2);
        uow.commit().await.unwrap();

        assert_eq!(store.route_count().await, 0);
    }

    #[tokio::test]
    async fn purge_only_touches_the_given_session() {
        let (store, session_a) = store_with_session().await;
        let session_b = SessionId::generate();

        let mut uow = store.begin().await.unwrap();
        create_route(uow.as_mut(), &session_a, spec()).await.unwrap();
        let other = create_route(uow.as_mut(), &session_b, spec()).await.unwrap();
        uow.commit().await.unwrap();

        let mut uow = store.begin().await.unwrap();
        purge_all(uow.as_mut(), &session_a).await.unwrap();
        uow.commit().await.unwrap();

        let mut check = store.begin().await.unwrap();
        assert!(resolve(check.as_mut(), &other.id).await.unwrap().is_some());
    }
}
