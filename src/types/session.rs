//! The persisted session entity.
//!
//! A session is the serialized state of one long-lived interactive unit (a
//! paginated list, a multi-step form). The engine treats the payload as
//! opaque bytes; handlers read and write it through the typed accessors,
//! which keep the round-trip invariant: deserializing and re-serializing an
//! unmutated payload yields semantically identical data.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

use super::ids::SessionId;

/// Persisted, serialized application state for one long-lived interactive
/// unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    /// Unique identifier, generated at first use.
    pub id: SessionId,

    /// Serialized consumer-defined session data. May reference issued
    /// route identifiers by id only, never by ownership, so the serialized
    /// form stays cycle-free.
    pub payload: Vec<u8>,

    /// Timestamp of the last persist.
    pub updated_on: DateTime<Utc>,

    /// Absolute expiry, or `None` for a session the cleanup job never
    /// touches.
    pub expires_on: Option<DateTime<Utc>>,
}

impl SessionState {
    /// Creates a new session with a fresh id and the given payload bytes.
    pub fn new(payload: Vec<u8>) -> Self {
        SessionState {
            id: SessionId::generate(),
            payload,
            updated_on: Utc::now(),
            expires_on: None,
        }
    }

    /// Creates a new session with a payload serialized from `value`.
    pub fn from_value<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(SessionState::new(serde_json::to_vec(value)?))
    }

    /// Sets an absolute expiry and returns the session.
    pub fn expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_on = Some(at);
        self
    }

    /// Sets the expiry `ttl` from now and returns the session.
    pub fn expires_in(self, ttl: Duration) -> Self {
        let at = Utc::now() + ttl;
        self.expires_at(at)
    }

    /// Deserializes the payload into a consumer type.
    pub fn read_payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }

    /// Replaces the payload with the serialized form of `value`.
    pub fn write_payload<T: Serialize>(&mut self, value: &T) -> Result<(), serde_json::Error> {
        self.payload = serde_json::to_vec(value)?;
        Ok(())
    }

    /// True when the session has an expiry at or before `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_on.is_some_and(|at| at <= now)
    }

    /// Marks the session as persisted at `now`.
    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_on = now;
    }
}
