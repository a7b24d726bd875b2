//! The assembled engine: ingest protocol, job dispatch, and lifecycle.
//!
//! # Dispatch protocol
//!
//! Per inbound event: `Received → Resolved → [Ordered] → Invoked →
//! Persisted`, or `Received → Unresolved` (the expired outcome), or
//! `→ Faulted` (logged once at the pool, dropped, never retried).
//!
//! [`Engine::ingest`] covers Received/Resolved: the opaque identifier is
//! validated against the route id shape, resolved against the store, the
//! transport is asked to acknowledge deferred routes, and a job is
//! enqueued. The [`Dispatcher`] (the engine's [`JobRunner`]) covers the
//! rest on a worker slot: wait for the session's turn (synchronous routes
//! only), re-resolve, load the session, purge superseded routes, invoke the
//! handler, persist, commit. The turn releases on every exit path.
//!
//! # No hidden globals
//!
//! Everything dispatch needs (store, handler registry, turn manager,
//! responder) is constructed once and carried by the engine, which is
//! passed explicitly to whatever needs to enqueue jobs or create routes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, instrument, trace};

use crate::cleanup::{self, CleanupConfig};
use crate::queue::{ChannelClosed, InteractionEvent, Job, Priority};
use crate::store::{Store, StoreError, UnitOfWork, routes};
use crate::turn::{Turn, TurnManager};
use crate::types::{Route, RouteId, RouteSpec, SessionId, SessionState};
use crate::worker::{JobError, JobRunner, PoolConfig, WorkerPool};

use super::registry::{HandlerContext, HandlerError, HandlerRegistry};

/// Default concurrency for the interaction pool.
const DEFAULT_MAX_CONCURRENCY: usize = 16;

/// The transport-side collaborator.
///
/// The engine never builds UI payloads itself; it only asks the transport
/// to acknowledge an event before its handler runs (deferred routes) or to
/// show generic fallback content for an event whose route no longer exists.
#[async_trait]
pub trait Responder: Send + Sync + 'static {
    /// Acknowledge receipt of `event` before its handler runs.
    async fn acknowledge(&self, event: &InteractionEvent);

    /// Show the generic "this interaction has expired, please retry"
    /// content for `event`.
    async fn show_expired(&self, event: &InteractionEvent);
}

/// Errors that can occur while dispatching an event.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A resolved route points at a session that does not exist. This is a
    /// data-integrity fault, distinct from the normal "route not found"
    /// outcome: the event is dropped and nothing is committed.
    #[error("session {0} missing for resolved route")]
    SessionMissing(SessionId),

    /// A resolved route names a handler that was never registered. Also a
    /// data-integrity fault: routes are only minted from registered keys.
    #[error("no handler registered for {0}")]
    HandlerNotFound(crate::types::HandlerKey),

    /// The invoked business logic failed. The transaction is rolled back
    /// and the event dropped.
    #[error("handler fault: {0}")]
    Handler(#[from] HandlerError),

    /// The store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The pool's channel is closed (engine shutting down).
    #[error("job queue closed")]
    QueueClosed(#[from] ChannelClosed),
}

/// Result type for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;

/// The terminal state of an ingested event, as seen by the transport
/// adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The identifier is not a route id at all; the event belongs to some
    /// other subsystem and was ignored.
    NotARoute,

    /// The identifier is shaped like a route id but no longer resolves;
    /// fallback content was shown.
    Expired,

    /// The event was enqueued for dispatch.
    Enqueued,
}

/// Classifies the queue priority of a resolved route's event.
///
/// A route the transport has *not* acknowledged yet must preempt backlog so
/// the user never perceives the interaction as hung; an already-deferred
/// route can wait behind other work.
fn classify_priority(route: &Route) -> Priority {
    if route.deferred {
        Priority::Normal
    } else {
        Priority::High
    }
}

/// Executes jobs on behalf of the engine's pools.
pub(crate) struct Dispatcher {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) registry: HandlerRegistry,
    pub(crate) turns: TurnManager,
    pub(crate) responder: Arc<dyn Responder>,
}

impl JobRunner for Dispatcher {
    fn prepare(&self, job: &Job) -> Option<Turn> {
        // Turns must be registered in dequeue order; this runs on the
        // dispatch loop, never in the spawned body.
        match job {
            Job::Interaction { route, .. } if route.synchronous => {
                Some(self.turns.acquire(&route.session_id))
            }
            _ => None,
        }
    }

    async fn run(&self, job: Job, turn: Option<Turn>) -> std::result::Result<(), JobError> {
        match job {
            Job::Interaction { route, event } => {
                self.dispatch(route, event, turn).await?;
                Ok(())
            }
            Job::Cleanup => {
                cleanup::run_cleanup_pass(self.store.as_ref()).await?;
                let swept = self.turns.sweep();
                if swept > 0 {
                    debug!(swept, "swept settled turn entries");
                }
                Ok(())
            }
        }
    }
}

impl Dispatcher {
    /// Runs one interaction job: Ordered → Invoked → Persisted.
    #[instrument(
        skip(self, route, event, turn),
        fields(route = %route.id, session = %route.session_id, interaction = %event.interaction_id)
    )]
    async fn dispatch(
        &self,
        route: Route,
        event: InteractionEvent,
        turn: Option<Turn>,
    ) -> Result<()> {
        if let Some(turn) = &turn {
            turn.wait().await;
        }

        let mut uow = self.store.begin().await?;

        // Re-resolve under the turn: a sibling's re-render may have purged
        // this route between enqueue and execution. Stale single-use
        // buttons must not be replayed.
        let Some(route) = routes::resolve(uow.as_mut(), &route.id).await? else {
            debug!("route purged between enqueue and execution; showing fallback");
            self.responder.show_expired(&event).await;
            return Ok(());
        };

        let Some(session) = uow.session(&route.session_id).await? else {
            return Err(DispatchError::SessionMissing(route.session_id.clone()));
        };

        let Some(handler) = self.registry.resolve(&route.handler) else {
            return Err(DispatchError::HandlerNotFound(route.handler.clone()));
        };

        // Purge-before-invoke: the session is about to be re-rendered, so
        // its single-use routes (including this one, when unnamed) are
        // consumed now.
        routes::purge_ephemeral(uow.as_mut(), &route.session_id).await?;

        if let Some(obsolete) = &route.session_to_delete {
            debug!(obsolete = %obsolete, "cascading deletion of superseded session");
            routes::purge_all(uow.as_mut(), obsolete).await?;
            uow.delete_session(obsolete).await?;
        }

        let mut cx = HandlerContext::new(uow.as_mut(), session);
        handler.handle(&mut cx, &event, &route).await?;
        let (mut session, delete_session) = cx.into_parts();

        if delete_session {
            routes::purge_all(uow.as_mut(), &session.id).await?;
            uow.delete_session(&session.id).await?;
        } else {
            session.touch(Utc::now());
            uow.put_session(session).await?;
        }

        uow.commit().await?;
        trace!("interaction persisted");
        Ok(())
        // The turn (when present) drops here, and on every early return
        // and unwind above, releasing the session to the next event.
    }
}

/// Configuration for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Concurrency cap for the interaction pool.
    pub max_concurrency: usize,

    /// Start with the interaction pool paused; call [`Engine::resume`]
    /// once the transport connection is established.
    pub start_paused: bool,

    /// Cleanup job configuration.
    pub cleanup: CleanupConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        EngineConfig {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            start_paused: false,
            cleanup: CleanupConfig::new(),
        }
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_start_paused(mut self, start_paused: bool) -> Self {
        self.start_paused = start_paused;
        self
    }

    pub fn with_cleanup(mut self, cleanup: CleanupConfig) -> Self {
        self.cleanup = cleanup;
        self
    }
}

/// The session dispatch engine.
///
/// Owns the interaction pool, the serial maintenance pool, and the
/// dispatcher they share. Constructed once at startup and passed to the
/// transport adapter and to UI-building code.
pub struct Engine {
    dispatcher: Arc<Dispatcher>,
    interactions: Arc<WorkerPool<Dispatcher>>,
    maintenance: Arc<WorkerPool<Dispatcher>>,
    cleanup: CleanupConfig,
}

impl Engine {
    /// Assembles an engine from its collaborators.
    pub fn new(
        store: Arc<dyn Store>,
        registry: HandlerRegistry,
        responder: Arc<dyn Responder>,
        config: EngineConfig,
    ) -> Self {
        info!(
            handlers = registry.len(),
            max_concurrency = config.max_concurrency,
            "assembling engine"
        );
        let dispatcher = Arc::new(Dispatcher {
            store,
            registry,
            turns: TurnManager::new(),
            responder,
        });
        let interactions = Arc::new(WorkerPool::new(
            PoolConfig::new("interactions", config.max_concurrency)
                .with_start_paused(config.start_paused),
            Arc::clone(&dispatcher),
        ));
        // Concurrent cleanup passes would race each other; one at a time.
        let maintenance = Arc::new(WorkerPool::new(
            PoolConfig::new("maintenance", 1),
            Arc::clone(&dispatcher),
        ));
        Engine {
            dispatcher,
            interactions,
            maintenance,
            cleanup: config.cleanup,
        }
    }

    /// Starts both dispatch loops and arms the repeating cleanup job (with
    /// an immediate first pass).
    pub fn start(&self) {
        Arc::clone(&self.interactions).start();
        Arc::clone(&self.maintenance).start();
        self.maintenance
            .schedule_repeating(self.cleanup.interval, Job::Cleanup, true);
    }

    /// Pauses the interaction pool without losing enqueued events.
    pub fn pause(&self) {
        self.interactions.pause();
    }

    /// Resumes the interaction pool.
    pub fn resume(&self) {
        self.interactions.resume();
    }

    /// Ingests one inbound transport event.
    ///
    /// Validates the opaque identifier, resolves it to a route,
    /// acknowledges deferred routes, and enqueues the dispatch job. See
    /// [`IngestOutcome`] for the terminal states visible to the caller.
    #[instrument(skip(self, event), fields(interaction = %event.interaction_id))]
    pub async fn ingest(&self, callback_id: &str, event: InteractionEvent) -> Result<IngestOutcome> {
        let Some(route_id) = RouteId::parse(callback_id) else {
            trace!(callback_id, "identifier is not a route; ignoring");
            return Ok(IngestOutcome::NotARoute);
        };

        let route = {
            let mut uow = self.dispatcher.store.begin().await?;
            routes::resolve(uow.as_mut(), &route_id).await?
            // Read-only unit; dropped without commit.
        };
        let Some(route) = route else {
            debug!(route = %route_id, "route expired or consumed; showing fallback");
            self.dispatcher.responder.show_expired(&event).await;
            return Ok(IngestOutcome::Expired);
        };

        if route.deferred {
            self.dispatcher.responder.acknowledge(&event).await;
        }

        let priority = classify_priority(&route);
        self.interactions
            .enqueue(Job::Interaction { route, event }, priority)?;
        Ok(IngestOutcome::Enqueued)
    }

    /// Enqueues a job on the interaction pool.
    pub fn enqueue_job(&self, job: Job, priority: Priority) -> std::result::Result<(), ChannelClosed> {
        self.interactions.enqueue(job, priority)
    }

    /// Arms a repeating job on the interaction pool.
    pub fn schedule_repeating(&self, interval: Duration, job: Job, run_immediately: bool) {
        self.interactions.schedule_repeating(interval, job, run_immediately);
    }

    /// Persists a session (create or update), stamping `updated_on`.
    pub async fn save_session(
        &self,
        session: &mut SessionState,
    ) -> std::result::Result<(), StoreError> {
        session.touch(Utc::now());
        let mut uow = self.dispatcher.store.begin().await?;
        uow.put_session(session.clone()).await?;
        uow.commit().await
    }

    /// Deletes a session and every route it owns.
    pub async fn delete_session(&self, id: &SessionId) -> std::result::Result<(), StoreError> {
        let mut uow = self.dispatcher.store.begin().await?;
        routes::purge_all(uow.as_mut(), id).await?;
        uow.delete_session(id).await?;
        uow.commit().await
    }

    /// Creates (or, for named specs, idempotently re-creates) a route owned
    /// by `session`, committing immediately.
    ///
    /// UI-building code embeds the returned route's id in the outbound
    /// payload as the callback identifier.
    pub async fn create_route(
        &self,
        session: &SessionId,
        spec: RouteSpec,
    ) -> std::result::Result<Route, StoreError> {
        let mut uow = self.dispatcher.store.begin().await?;
        let route = routes::create_route(uow.as_mut(), session, spec).await?;
        uow.commit().await?;
        Ok(route)
    }

    /// Purges a session's single-use routes ahead of an out-of-band
    /// re-render (renders that happen inside a handler purge automatically).
    pub async fn purge_ephemeral(
        &self,
        session: &SessionId,
    ) -> std::result::Result<usize, StoreError> {
        let mut uow = self.dispatcher.store.begin().await?;
        let removed = routes::purge_ephemeral(uow.as_mut(), session).await?;
        uow.commit().await?;
        Ok(removed)
    }

    /// Shuts down both pools, draining in-flight jobs.
    pub async fn shutdown(&self) {
        self.interactions.shutdown().await;
        self.maintenance.shutdown().await;
    }
}
