// In-memory session store: maps persistent session ids to the last known identity.
//
// Independent of the live connection map. A session outlives any number of
// connections and is never removed while the process runs.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Last known identity for a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub name: String,
    pub last_seen: DateTime<Utc>,
}

/// Outcome of resolving a join request's session id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSession {
    pub session_id: String,
    /// True when the requested id was already known.
    pub reconnected: bool,
}

#[derive(Debug, Default)]
pub struct SessionStore {
    inner: Mutex<HashMap<String, SessionInfo>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, SessionInfo>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register sessions known from an earlier run, e.g. persisted records.
    pub fn seed<I>(&self, sessions: I)
    where
        I: IntoIterator<Item = (String, SessionInfo)>,
    {
        self.sessions().extend(sessions);
    }

    /// Resolve a requested session id. Known ids are returned unchanged; an
    /// absent or unknown id yields a freshly generated one that has never
    /// been issued by this store.
    pub fn resolve(&self, requested: Option<&str>, name: &str) -> ResolvedSession {
        let now = Utc::now();
        let mut sessions = self.sessions();

        if let Some(id) = requested.map(str::trim).filter(|id| !id.is_empty()) {
            if let Some(info) = sessions.get_mut(id) {
                info.name = name.to_string();
                info.last_seen = now;
                return ResolvedSession {
                    session_id: id.to_string(),
                    reconnected: true,
                };
            }
        }

        let session_id = loop {
            let candidate = Uuid::new_v4().to_string();
            if !sessions.contains_key(&candidate) {
                break candidate;
            }
        };
        sessions.insert(
            session_id.clone(),
            SessionInfo {
                name: name.to_string(),
                last_seen: now,
            },
        );
        ResolvedSession {
            session_id,
            reconnected: false,
        }
    }

    /// Refresh a session's identity, e.g. on disconnect.
    pub fn touch(&self, session_id: &str, name: &str) {
        if let Some(info) = self.sessions().get_mut(session_id) {
            info.name = name.to_string();
            info.last_seen = Utc::now();
        }
    }

    #[cfg(test)]
    pub fn get(&self, session_id: &str) -> Option<SessionInfo> {
        self.sessions().get(session_id).cloned()
    }

    #[cfg(test)]
    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions().contains_key(session_id)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
