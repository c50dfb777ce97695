//! # Presence Tracking
//!
//! In-memory registry of active client sessions. Nothing is persisted; a
//! restart clears all presence.
//!
//! Expiry is lazy: every operation prunes sessions whose expiry has passed
//! before doing its own work. No background timer is needed because the
//! only consumers are poll-driven HTTP handlers.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::errors::{PresenceError, PresenceResult};

/// Default session lifetime without a heartbeat
pub const DEFAULT_TTL_SECS: i64 = 45;

/// One client session
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceSession {
    pub session_id: String,

    /// Tab the client last reported viewing
    pub tab: Option<String>,

    pub last_seen: DateTime<Utc>,

    pub expires_at: DateTime<Utc>,
}

impl PresenceSession {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Result of a presence read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceSnapshot {
    pub online_users: usize,
}

#[derive(Debug)]
pub struct PresenceTracker {
    ttl: Duration,
    sessions: RwLock<HashMap<String, PresenceSession>>,
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::with_ttl(Duration::seconds(DEFAULT_TTL_SECS))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Register or refresh a session.
    pub fn heartbeat(&self, session_id: &str, tab: Option<&str>) -> PresenceResult<PresenceSnapshot> {
        self.heartbeat_at(session_id, tab, Utc::now())
    }

    /// `heartbeat` against an explicit clock.
    pub fn heartbeat_at(
        &self,
        session_id: &str,
        tab: Option<&str>,
        now: DateTime<Utc>,
    ) -> PresenceResult<PresenceSnapshot> {
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return Err(PresenceError::InvalidSessionId);
        }

        let tab = tab.map(str::trim).filter(|t| !t.is_empty()).map(str::to_string);
        let session = PresenceSession {
            session_id: session_id.to_string(),
            tab,
            last_seen: now,
            expires_at: now + self.ttl,
        };

        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| PresenceError::Internal("presence lock poisoned".into()))?;
        sessions.insert(session.session_id.clone(), session);
        sessions.retain(|_, s| !s.is_expired(now));

        Ok(PresenceSnapshot {
            online_users: sessions.len(),
        })
    }

    /// Prune expired sessions and count the rest.
    pub fn snapshot(&self) -> PresenceResult<PresenceSnapshot> {
        self.snapshot_at(Utc::now())
    }

    /// `snapshot` against an explicit clock.
    pub fn snapshot_at(&self, now: DateTime<Utc>) -> PresenceResult<PresenceSnapshot> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| PresenceError::Internal("presence lock poisoned".into()))?;
        sessions.retain(|_, s| !s.is_expired(now));

        Ok(PresenceSnapshot {
            online_users: sessions.len(),
        })
    }

    /// Live sessions at `now`, most recent first.
    #[cfg(test)]
    pub(crate) fn sessions_at(&self, now: DateTime<Utc>) -> PresenceResult<Vec<PresenceSession>> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| PresenceError::Internal("presence lock poisoned".into()))?;
        sessions.retain(|_, s| !s.is_expired(now));

        let mut live: Vec<PresenceSession> = sessions.values().cloned().collect();
        live.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        Ok(live)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_blank_session_id_rejected() {
        let tracker = PresenceTracker::new();
        assert!(matches!(
            tracker.heartbeat_at("   ", None, t0()),
            Err(PresenceError::InvalidSessionId)
        ));
        assert_eq!(tracker.snapshot_at(t0()).unwrap().online_users, 0);
    }

    #[test]
    fn test_ttl_boundary() {
        let tracker = PresenceTracker::new();
        tracker.heartbeat_at("abc", Some("leads"), t0()).unwrap();

        assert_eq!(
            tracker.snapshot_at(t0() + Duration::seconds(44)).unwrap().online_users,
            1
        );
        // Expiry is inclusive: now == expiresAt is gone.
        assert_eq!(
            tracker.snapshot_at(t0() + Duration::seconds(45)).unwrap().online_users,
            0
        );
    }

    #[test]
    fn test_expired_sessions_pruned_on_heartbeat() {
        let tracker = PresenceTracker::new();
        tracker.heartbeat_at("old", None, t0()).unwrap();

        let later = t0() + Duration::seconds(46);
        let snap = tracker.heartbeat_at("new", None, later).unwrap();
        assert_eq!(snap.online_users, 1);
        assert_eq!(tracker.sessions_at(later).unwrap()[0].session_id, "new");
    }

    #[test]
    fn test_heartbeat_refreshes_and_overwrites() {
        let tracker = PresenceTracker::new();
        tracker.heartbeat_at("abc", Some("leads"), t0()).unwrap();
        let refreshed = t0() + Duration::seconds(30);
        tracker.heartbeat_at(" abc ", Some("ag4Sep"), refreshed).unwrap();

        let sessions = tracker.sessions_at(t0() + Duration::seconds(60)).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].tab.as_deref(), Some("ag4Sep"));
        assert_eq!(sessions[0].expires_at, refreshed + Duration::seconds(45));
    }

    #[test]
    fn test_custom_ttl() {
        let tracker = PresenceTracker::with_ttl(Duration::seconds(5));
        tracker.heartbeat_at("a", None, t0()).unwrap();
        tracker.heartbeat_at("b", None, t0()).unwrap();
        assert_eq!(tracker.snapshot_at(t0()).unwrap().online_users, 2);
        assert_eq!(
            tracker.snapshot_at(t0() + Duration::seconds(5)).unwrap().online_users,
            0
        );
    }
}
