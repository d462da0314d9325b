//! Per-session cancellation token registry.
//!
//! Each running turn registers a [`CancelToken`] under its session id so
//! an API caller can abort it; tokens are removed when the turn finishes.

use std::collections::HashMap;

use parking_lot::Mutex;
use uuid::Uuid;

use nexus_domain::cancel::CancelToken;

pub struct CancelMap {
    tokens: Mutex<HashMap<Uuid, CancelToken>>,
}

impl Default for CancelMap {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelMap {
    pub fn new() -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Create and register a new cancel token for a session.
    pub fn register(&self, session_id: Uuid) -> CancelToken {
        let token = CancelToken::new();
        self.tokens.lock().insert(session_id, token.clone());
        token
    }

    /// Cancel the running turn for a session. Returns true if one was
    /// registered.
    pub fn cancel(&self, session_id: Uuid) -> bool {
        if let Some(token) = self.tokens.lock().get(&session_id) {
            token.cancel();
            true
        } else {
            false
        }
    }

    /// Remove the token when a turn completes.
    pub fn remove(&self, session_id: Uuid) {
        self.tokens.lock().remove(&session_id);
    }

    pub fn is_running(&self, session_id: Uuid) -> bool {
        self.tokens.lock().contains_key(&session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_cancel_remove() {
        let map = CancelMap::new();
        let sid = Uuid::new_v4();
        let token = map.register(sid);
        assert!(map.is_running(sid));
        assert!(!token.is_cancelled());

        assert!(map.cancel(sid));
        assert!(token.is_cancelled());

        map.remove(sid);
        assert!(!map.is_running(sid));
        assert!(!map.cancel(sid));
    }

    #[test]
    fn register_replaces_previous_token() {
        let map = CancelMap::new();
        let sid = Uuid::new_v4();
        let old = map.register(sid);
        let new = map.register(sid);
        map.cancel(sid);
        assert!(!old.is_cancelled());
        assert!(new.is_cancelled());
    }
}
