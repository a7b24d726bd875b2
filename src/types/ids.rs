//! Newtype wrappers for domain identifiers.
//!
//! These types prevent accidental mixing of different ID types (e.g., using a
//! SessionId where a RouteId is expected) and make the code more
//! self-documenting. Route and session identifiers are high-entropy tokens
//! minted from v4 UUIDs, carrying a short prefix so an inbound callback
//! identifier can be recognized as ours before any store lookup.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix carried by every route identifier.
pub const ROUTE_ID_PREFIX: &str = "cb_";

/// Prefix carried by every session identifier.
pub const SESSION_ID_PREFIX: &str = "ss_";

/// Number of hex characters following the prefix (a v4 UUID in simple form).
const ID_HEX_LEN: usize = 32;

fn is_well_formed(s: &str, prefix: &str) -> bool {
    let Some(hex) = s.strip_prefix(prefix) else {
        return false;
    };
    hex.len() == ID_HEX_LEN
        && hex
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// An opaque route identifier, embedded verbatim in outbound UI payloads as
/// the callback identifier.
///
/// Minted via [`RouteId::generate`]; inbound strings are validated with
/// [`RouteId::parse`] before any store lookup. A string that does not parse
/// is simply "not ours", not an error.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteId(pub String);

impl RouteId {
    /// Mints a fresh high-entropy route identifier.
    pub fn generate() -> Self {
        RouteId(format!("{}{}", ROUTE_ID_PREFIX, Uuid::new_v4().simple()))
    }

    /// Validates an inbound callback identifier against the expected
    /// prefix and shape.
    ///
    /// Returns `None` for anything that is not a route identifier. This is
    /// the expected outcome for callback identifiers belonging to other
    /// subsystems and must not be treated as an error.
    ///
    /// # Examples
    ///
    /// ```
    /// use callback_relay::types::RouteId;
    ///
    /// let id = RouteId::generate();
    /// assert_eq!(RouteId::parse(id.as_str()), Some(id));
    /// assert_eq!(RouteId::parse("some-other-button"), None);
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        is_well_formed(s, ROUTE_ID_PREFIX).then(|| RouteId(s.to_string()))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Mints a fresh session identifier.
    pub fn generate() -> Self {
        SessionId(format!("{}{}", SESSION_ID_PREFIX, Uuid::new_v4().simple()))
    }

    /// Creates a SessionId from a string.
    ///
    /// Note: this does not validate the format; stores hand back whatever
    /// they persisted.
    pub fn new(s: impl Into<String>) -> Self {
        SessionId(s.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stable key identifying a registered handler method.
///
/// Replaces runtime type/method reflection with an explicit registry lookup:
/// a route persists the key, and dispatch resolves it against the
/// [`HandlerRegistry`](crate::dispatch::HandlerRegistry) populated at
/// startup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandlerKey {
    /// Handler group (the "type" half of the key, e.g. `"poll"`).
    pub group: String,
    /// Method within the group (e.g. `"next_page"`).
    pub method: String,
}

impl HandlerKey {
    pub fn new(group: impl Into<String>, method: impl Into<String>) -> Self {
        HandlerKey {
            group: group.into(),
            method: method.into(),
        }
    }
}

impl fmt::Display for HandlerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.group, self.method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_route_id_parses() {
        let id = RouteId::generate();
        assert_eq!(RouteId::parse(id.as_str()), Some(id));
    }

    #[test]
    fn generated_route_ids_are_distinct() {
        assert_ne!(RouteId::generate(), RouteId::generate());
    }

    #[test]
    fn parse_rejects_foreign_identifiers() {
        assert_eq!(RouteId::parse(""), None);
        assert_eq!(RouteId::parse("not-a-route"), None);
        assert_eq!(RouteId::parse("cb_"), None);
        assert_eq!(RouteId::parse("cb_short"), None);
        // Right length, wrong alphabet.
        assert_eq!(RouteId::parse(&format!("cb_{}", "Z".repeat(32))), None);
        // Session ids are not route ids.
        let session = SessionId::generate();
        assert_eq!(RouteId::parse(session.as_str()), None);
    }

    #[test]
    fn parse_accepts_lowercase_hex_only() {
        let ok = "cb_0123456789abcdef0123456789abcdef";
        assert!(RouteId::parse(ok).is_some());
        let bad = "cb_0123456789ABCDEF0123456789ABCDEF";
        assert_eq!(RouteId::parse(bad), None);
    }

    #[test]
    fn handler_key_display() {
        let key = HandlerKey::new("poll", "next_page");
        assert_eq!(key.to_string(), "poll::next_page");
    }
}
