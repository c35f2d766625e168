//! The process-wide session manager (spec §4.4, §5, §9 "Global session
//! manager with LRU"): a bounded LRU map of connections plus a
//! user→session index for fan-out, constructed once at server start and
//! swept on a fixed interval for idle eviction.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use uuid::Uuid;

/// Per-connection transient state (spec §3 "Session (transient)").
#[derive(Debug, Clone)]
pub struct Session {
    pub connection_id: Uuid,
    pub user_id: Option<Uuid>,
    pub username: Option<String>,
    pub last_activity: Instant,
    pub upload_ids: HashSet<Uuid>,
    pub download_ids: HashSet<Uuid>,
}

impl Session {
    fn new(connection_id: Uuid) -> Self {
        Self {
            connection_id,
            user_id: None,
            username: None,
            last_activity: Instant::now(),
            upload_ids: HashSet::new(),
            download_ids: HashSet::new(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }
}

/// Bounded LRU map of active connections, indexed additionally by bound
/// user id for group fan-out (spec §4.4 "server also indexes sessions by
/// user"). The LRU cache itself is behind a single reentrant-friendly
/// `parking_lot::Mutex`; the user index is a separate `DashMap` since it
/// is read far more often than the LRU ordering changes.
pub struct SessionManager {
    sessions: Mutex<LruCache<Uuid, Session>>,
    by_user: DashMap<Uuid, HashSet<Uuid>>,
    timeout: Duration,
}

impl SessionManager {
    pub fn new(max_sessions: usize, timeout: Duration) -> Self {
        let capacity = NonZeroUsize::new(max_sessions.max(1)).expect("max_sessions > 0");
        Self {
            sessions: Mutex::new(LruCache::new(capacity)),
            by_user: DashMap::new(),
            timeout,
        }
    }

    /// Register a new connection, evicting the least-recently-used
    /// session if the manager is at capacity.
    pub fn create(&self) -> Uuid {
        let connection_id = Uuid::new_v4();
        let mut sessions = self.sessions.lock();
        if let Some((evicted_id, evicted)) = sessions.push(connection_id, Session::new(connection_id)) {
            if evicted_id != connection_id {
                self.forget_user_index(evicted_id, evicted.user_id);
                tracing::info!(connection_id = %evicted_id, "evicted least-recently-used session");
            }
        }
        connection_id
    }

    pub fn touch(&self, connection_id: Uuid) {
        let mut sessions = self.sessions.lock();
        if let Some(session) = sessions.get_mut(&connection_id) {
            session.touch();
        }
    }

    pub fn get(&self, connection_id: Uuid) -> Option<Session> {
        let mut sessions = self.sessions.lock();
        sessions.get(&connection_id).cloned()
    }

    /// Bind a user id to a connection after successful authentication,
    /// updating the user→session index.
    pub fn bind_user(&self, connection_id: Uuid, user_id: Uuid, username: String) {
        let mut sessions = self.sessions.lock();
        if let Some(session) = sessions.get_mut(&connection_id) {
            session.user_id = Some(user_id);
            session.username = Some(username);
        }
        drop(sessions);
        self.by_user.entry(user_id).or_default().insert(connection_id);
    }

    pub fn sessions_for_user(&self, user_id: Uuid) -> Vec<Uuid> {
        self.by_user.get(&user_id).map(|set| set.iter().copied().collect()).unwrap_or_default()
    }

    pub fn track_upload(&self, connection_id: Uuid, upload_id: Uuid) {
        let mut sessions = self.sessions.lock();
        if let Some(session) = sessions.get_mut(&connection_id) {
            session.upload_ids.insert(upload_id);
        }
    }

    pub fn untrack_upload(&self, connection_id: Uuid, upload_id: Uuid) {
        let mut sessions = self.sessions.lock();
        if let Some(session) = sessions.get_mut(&connection_id) {
            session.upload_ids.remove(&upload_id);
        }
    }

    pub fn track_download(&self, connection_id: Uuid, download_id: Uuid) {
        let mut sessions = self.sessions.lock();
        if let Some(session) = sessions.get_mut(&connection_id) {
            session.download_ids.insert(download_id);
        }
    }

    pub fn untrack_download(&self, connection_id: Uuid, download_id: Uuid) {
        let mut sessions = self.sessions.lock();
        if let Some(session) = sessions.get_mut(&connection_id) {
            session.download_ids.remove(&download_id);
        }
    }

    /// Remove a session, returning the upload/download ids it still
    /// owned so the caller can release their file handles (spec §5: a
    /// closed connection forgets and releases any in-flight transfers).
    pub fn remove(&self, connection_id: Uuid) -> (Vec<Uuid>, Vec<Uuid>) {
        let mut sessions = self.sessions.lock();
        let removed = sessions.pop(&connection_id);
        drop(sessions);
        match removed {
            Some(session) => {
                self.forget_user_index(connection_id, session.user_id);
                (session.upload_ids.into_iter().collect(), session.download_ids.into_iter().collect())
            }
            None => (Vec::new(), Vec::new()),
        }
    }

    fn forget_user_index(&self, connection_id: Uuid, user_id: Option<Uuid>) {
        if let Some(user_id) = user_id {
            if let Some(mut set) = self.by_user.get_mut(&user_id) {
                set.remove(&connection_id);
            }
        }
    }

    /// One sweep pass: remove every session whose `last_activity` is
    /// older than the configured timeout. Returns the evicted ids so the
    /// caller can close their sockets.
    fn sweep_once(&self) -> Vec<Uuid> {
        let mut expired = Vec::new();
        let mut sessions = self.sessions.lock();
        let timeout = self.timeout;
        let stale: Vec<Uuid> = sessions
            .iter()
            .filter(|(_, session)| session.last_activity.elapsed() > timeout)
            .map(|(id, _)| *id)
            .collect();
        for id in stale {
            if let Some(session) = sessions.pop(&id) {
                expired.push(id);
                drop(sessions);
                self.forget_user_index(id, session.user_id);
                sessions = self.sessions.lock();
            }
        }
        expired
    }
}

/// Spawn the background idle-session sweep task (spec §5 "a background
/// cleanup sweep removes expired sessions on a fixed interval").
pub fn spawn_sweep_task(manager: Arc<SessionManager>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let expired = manager.sweep_once();
            if !expired.is_empty() {
                tracing::info!(count = expired.len(), "swept idle sessions");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_user_updates_fan_out_index() {
        let manager = SessionManager::new(10, Duration::from_secs(3600));
        let connection_id = manager.create();
        let user_id = Uuid::new_v4();
        manager.bind_user(connection_id, user_id, "alice".into());
        assert_eq!(manager.sessions_for_user(user_id), vec![connection_id]);
        assert!(manager.get(connection_id).unwrap().is_authenticated());
    }

    #[test]
    fn eviction_over_capacity_drops_oldest() {
        let manager = SessionManager::new(2, Duration::from_secs(3600));
        let a = manager.create();
        let _b = manager.create();
        manager.touch(a);
        let _c = manager.create();
        assert!(manager.get(a).is_some());
    }

    #[test]
    fn remove_clears_user_index() {
        let manager = SessionManager::new(10, Duration::from_secs(3600));
        let connection_id = manager.create();
        let user_id = Uuid::new_v4();
        manager.bind_user(connection_id, user_id, "bob".into());
        manager.remove(connection_id);
        assert!(manager.sessions_for_user(user_id).is_empty());
    }
}
