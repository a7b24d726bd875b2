//! In-memory store implementation.
//!
//! Reference implementation of the [`Store`] traits: a pair of tables
//! behind a mutex, with per-unit overlays applied in a single atomic step
//! at commit. Suitable for tests and single-process embeddings; durability
//! across restarts is the job of a real backing store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::types::{Route, RouteId, SessionId, SessionState};

use super::{Result, Store, UnitOfWork};

#[derive(Debug, Default)]
struct Tables {
    sessions: HashMap<SessionId, SessionState>,
    routes: HashMap<RouteId, Route>,
}

/// An in-memory transactional store.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Number of committed sessions. Introspection for tests and metrics.
    pub async fn session_count(&self) -> usize {
        self.tables.lock().await.sessions.len()
    }

    /// Number of committed routes.
    pub async fn route_count(&self) -> usize {
        self.tables.lock().await.routes.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        Ok(Box::new(MemoryUnit {
            tables: Arc::clone(&self.tables),
            sessions: HashMap::new(),
            routes: HashMap::new(),
        }))
    }
}

/// A unit of work over [`MemoryStore`].
///
/// Overlay maps hold pending writes: `Some` is an upsert, `None` a delete.
struct MemoryUnit {
    tables: Arc<Mutex<Tables>>,
    sessions: HashMap<SessionId, Option<SessionState>>,
    routes: HashMap<RouteId, Option<Route>>,
}

#[async_trait]
impl UnitOfWork for MemoryUnit {
    async fn session(&mut self, id: &SessionId) -> Result<Option<SessionState>> {
        if let Some(pending) = self.sessions.get(id) {
            return Ok(pending.clone());
        }
        Ok(self.tables.lock().await.sessions.get(id).cloned())
    }

    async fn put_session(&mut self, session: SessionState) -> Result<()> {
        self.sessions.insert(session.id.clone(), Some(session));
        Ok(())
    }

    async fn delete_session(&mut self, id: &SessionId) -> Result<()> {
        self.sessions.insert(id.clone(), None);
        Ok(())
    }

    async fn expired_sessions(&mut self, now: DateTime<Utc>) -> Result<Vec<SessionId>> {
        let tables = self.tables.lock().await;
        let mut expired: Vec<SessionId> = tables
            .sessions
            .values()
            .filter(|s| s.is_expired(now) && !self.sessions.contains_key(&s.id))
            .map(|s| s.id.clone())
            .collect();
        expired.extend(
            self.sessions
                .values()
                .flatten()
                .filter(|s| s.is_expired(now))
                .map(|s| s.id.clone()),
        );
        expired.sort();
        Ok(expired)
    }

    async fn route(&mut self, id: &RouteId) -> Result<Option<Route>> {
        if let Some(pending) = self.routes.get(id) {
            return Ok(pending.clone());
        }
        Ok(self.tables.lock().await.routes.get(id).cloned())
    }

    async fn route_by_name(&mut self, session: &SessionId, name: &str) -> Result<Option<Route>> {
        let matches =
            |route: &Route| &route.session_id == session && route.name.as_deref() == Some(name);
        if let Some(route) = self.routes.values().flatten().find(|r| matches(r)) {
            return Ok(Some(route.clone()));
        }
        let tables = self.tables.lock().await;
        Ok(tables
            .routes
            .values()
            .find(|r| matches(r) && !self.routes.contains_key(&r.id))
            .cloned())
    }

    async fn routes_for_session(&mut self, session: &SessionId) -> Result<Vec<Route>> {
        let mut routes: Vec<Route> = self
            .routes
            .values()
            .flatten()
            .filter(|r| &r.session_id == session)
            .cloned()
            .collect();
        let tables = self.tables.lock().await;
        routes.extend(
            tables
                .routes
                .values()
                .filter(|r| &r.session_id == session && !self.routes.contains_key(&r.id))
                .cloned(),
        );
        Ok(routes)
    }

    async fn put_route(&mut self, route: Route) -> Result<()> {
        self.routes.insert(route.id.clone(), Some(route));
        Ok(())
    }

    async fn delete_route(&mut self, id: &RouteId) -> Result<()> {
        self.routes.insert(id.clone(), None);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut tables = self.tables.lock().await;
        for (id, pending) in self.sessions {
            match pending {
                Some(session) => {
                    tables.sessions.insert(id, session);
                }
                None => {
                    tables.sessions.remove(&id);
                }
            }
        }
        for (id, pending) in self.routes {
            match pending {
                Some(route) => {
                    tables.routes.insert(id, route);
                }
                None => {
                    tables.routes.remove(&id);
                }
            }
        }
        Ok(())
    }
}
