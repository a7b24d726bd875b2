//! Session expiry cleanup.
//!
//! A repeating job on the serial maintenance pool: each pass selects every
//! session whose `expires_on` has passed and removes it together with all
//! of its routes. Each session is removed in its own transaction, so one
//! bad row never rolls back a whole pass, and a pass that races a previous
//! one simply finds nothing left to do; the pass is idempotent.

use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info};

use crate::store::{Result, Store, UnitOfWork, routes};

/// Default interval between cleanup passes (60 seconds).
const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 60;

/// Configuration for the cleanup job.
#[derive(Debug, Clone)]
pub struct CleanupConfig {
    /// Interval between passes.
    ///
    /// Default: 60 seconds. Configure via
    /// `CALLBACK_RELAY_CLEANUP_INTERVAL_SECS`.
    pub interval: Duration,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl CleanupConfig {
    /// Creates a `CleanupConfig` with default values.
    pub fn new() -> Self {
        CleanupConfig {
            interval: Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS),
        }
    }

    /// Creates a `CleanupConfig` from environment variables.
    ///
    /// Reads `CALLBACK_RELAY_CLEANUP_INTERVAL_SECS` for the pass interval;
    /// anything unset or unparsable falls back to the default.
    pub fn from_env() -> Self {
        let secs = std::env::var("CALLBACK_RELAY_CLEANUP_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_CLEANUP_INTERVAL_SECS);
        CleanupConfig {
            interval: Duration::from_secs(secs),
        }
    }

    /// Overrides the pass interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Summary of one cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupStats {
    pub sessions_removed: usize,
    pub routes_removed: usize,
}

/// Runs one cleanup pass: for every session with `expires_on <= now`, purge
/// all of its routes, delete the session row, and commit.
pub async fn run_cleanup_pass(store: &dyn Store) -> Result<CleanupStats> {
    let now = Utc::now();

    let expired = {
        let mut uow = store.begin().await?;
        uow.expired_sessions(now).await?
        // Read-only unit; dropped without commit.
    };

    let mut stats = CleanupStats::default();
    for session_id in expired {
        let mut uow = store.begin().await?;

        // Re-check inside the transaction: a concurrent deletion (or an
        // overlapping pass) may already have removed the row.
        let Some(session) = uow.session(&session_id).await? else {
            continue;
        };
        if !session.is_expired(now) {
            continue;
        }

        let routes_removed = routes::purge_all(uow.as_mut(), &session_id).await?;
        uow.delete_session(&session_id).await?;
        uow.commit().await?;

        debug!(session = %session_id, routes = routes_removed, "expired session removed");
        stats.sessions_removed += 1;
        stats.routes_removed += routes_removed;
    }

    if stats.sessions_removed > 0 {
        info!(
            sessions = stats.sessions_removed,
            routes = stats.routes_removed,
            "cleanup pass complete"
        );
    }
    Ok(stats)
}
