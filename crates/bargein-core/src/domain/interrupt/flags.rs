//! Cooperative interrupt flags
//!
//! Producers poll these between units of work. Reads take a short
//! `parking_lot` read lock and an atomic load; they never await.

use crate::domain::identity::Identity;
use crate::domain::session::SessionId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Flag for one session; once raised it stays raised
#[derive(Debug)]
struct InterruptFlag {
    session_id: SessionId,
    raised: AtomicBool,
}

impl InterruptFlag {
    fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            raised: AtomicBool::new(false),
        }
    }

    fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }
}

#[derive(Debug, Default)]
struct FlagTable {
    /// Flag of the newest session per identity; replaced only by a newer session
    by_identity: HashMap<Identity, Arc<InterruptFlag>>,
    /// Flags of live sessions
    by_session: HashMap<SessionId, Arc<InterruptFlag>>,
}

#[derive(Debug, Default)]
pub struct InterruptFlags {
    global: AtomicBool,
    table: RwLock<FlagTable>,
}

impl InterruptFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Give a new session a clean flag, replacing the identity's previous one
    ///
    /// A flag already raised for this session id is kept.
    pub fn arm(&self, identity: &Identity, session_id: SessionId) {
        let mut table = self.table.write();
        let flag = table
            .by_session
            .entry(session_id)
            .or_insert_with(|| Arc::new(InterruptFlag::new(session_id)))
            .clone();
        table.by_identity.insert(identity.clone(), flag);
    }

    /// Raise the flag for a session
    pub fn raise(&self, identity: &Identity, session_id: SessionId) {
        let mut table = self.table.write();
        let flag = table
            .by_session
            .entry(session_id)
            .or_insert_with(|| Arc::new(InterruptFlag::new(session_id)))
            .clone();
        flag.raised.store(true, Ordering::Release);

        // Only point the identity at this flag if no newer session owns it
        let newer = table
            .by_identity
            .get(identity)
            .is_some_and(|current| current.session_id != session_id && !current.is_raised());
        if !newer {
            table.by_identity.insert(identity.clone(), flag);
        }
    }

    /// Forget a session that reached a terminal status
    ///
    /// The identity keeps pointing at the (raised) flag until a new session
    /// is armed, so identity-level polling keeps reporting the interrupt.
    pub fn release(&self, session_id: SessionId) {
        self.table.write().by_session.remove(&session_id);
    }

    /// Identity entries whose session was already released
    pub fn released(&self) -> Vec<(Identity, SessionId)> {
        let table = self.table.read();
        table
            .by_identity
            .iter()
            .filter(|(_, flag)| !table.by_session.contains_key(&flag.session_id))
            .map(|(identity, flag)| (identity.clone(), flag.session_id))
            .collect()
    }

    /// Drop the identity entry if it still belongs to `session_id` and was released
    pub fn forget(&self, identity: &Identity, session_id: SessionId) -> bool {
        let mut table = self.table.write();
        if table.by_session.contains_key(&session_id) {
            return false;
        }
        let stale = table
            .by_identity
            .get(identity)
            .is_some_and(|flag| flag.session_id == session_id);
        if stale {
            table.by_identity.remove(identity);
        }
        stale
    }

    pub fn tracked_identities(&self) -> usize {
        self.table.read().by_identity.len()
    }

    pub fn raise_global(&self) {
        self.global.store(true, Ordering::Release);
    }

    pub fn is_global(&self) -> bool {
        self.global.load(Ordering::Acquire)
    }

    /// Whether producers working for `identity` should stop
    pub fn should_interrupt(&self, identity: &Identity) -> bool {
        if self.is_global() {
            return true;
        }
        self.table
            .read()
            .by_identity
            .get(identity)
            .is_some_and(|flag| flag.is_raised())
    }

    /// Whether producers working for `session_id` should stop
    ///
    /// Sessions that are unknown or already ended report true.
    pub fn should_interrupt_session(&self, session_id: SessionId) -> bool {
        if self.is_global() {
            return true;
        }
        self.table
            .read()
            .by_session
            .get(&session_id)
            .is_none_or(|flag| flag.is_raised())
    }
}
