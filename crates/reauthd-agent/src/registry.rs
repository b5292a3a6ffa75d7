//! Cookie-keyed store of live authentication sessions.
//!
//! The registry is bounded: when a new cookie would push it past
//! `max_sessions`, the oldest sessions are handed back to the caller for
//! cancellation. Insertion order is tracked in a queue next to the map, and
//! re-registering a cookie moves it to the back of that queue.

use std::collections::{HashMap, VecDeque};

use reauthd_core::authority::Cookie;
use reauthd_core::error::AuthorizationOutcome;

use crate::bridge::PromptBridge;
use crate::session::AuthenticationSession;

/// Sessions displaced by a [`SessionRegistry::put`]. The caller owns their
/// teardown; the registry only unlinks.
#[derive(Debug, Default)]
pub(crate) struct Displaced {
    /// Prior session under the same cookie, superseded by the new one.
    pub(crate) replaced: Option<AuthenticationSession>,
    /// Oldest sessions removed to stay within the capacity bound.
    pub(crate) evicted: Vec<AuthenticationSession>,
}

/// In-memory map from authority cookie to in-flight session.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: HashMap<Cookie, AuthenticationSession>,
    order: VecDeque<Cookie>,
    max_sessions: usize,
}

impl SessionRegistry {
    pub(crate) fn new(max_sessions: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            order: VecDeque::new(),
            max_sessions,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    #[must_use]
    pub fn contains(&self, cookie: &Cookie) -> bool {
        self.sessions.contains_key(cookie)
    }

    pub(crate) fn get_mut(&mut self, cookie: &Cookie) -> Option<&mut AuthenticationSession> {
        self.sessions.get_mut(cookie)
    }

    /// Registration instance of the session under `cookie`, if any.
    pub(crate) fn instance_of(&self, cookie: &Cookie) -> Option<u64> {
        self.sessions.get(cookie).map(|session| session.instance())
    }

    /// Links a session under its cookie.
    ///
    /// A session already held under the same cookie is returned in
    /// [`Displaced::replaced`]. If the cookie is new and the registry is at
    /// capacity, the oldest sessions come back in [`Displaced::evicted`].
    pub(crate) fn put(&mut self, session: AuthenticationSession) -> Displaced {
        let cookie = session.cookie().clone();
        let replaced = self.remove(&cookie);
        let mut evicted = Vec::new();
        if replaced.is_none() {
            while self.sessions.len() >= self.max_sessions {
                let Some(oldest) = self.order.pop_front() else {
                    break;
                };
                if let Some(victim) = self.sessions.remove(&oldest) {
                    evicted.push(victim);
                }
            }
        }
        self.order.push_back(cookie.clone());
        self.sessions.insert(cookie, session);
        Displaced { replaced, evicted }
    }

    /// Unlinks a session without tearing it down. The caller decides what
    /// happens to it, which keeps completion free to resolve the verdict
    /// before releasing resources.
    pub(crate) fn remove(&mut self, cookie: &Cookie) -> Option<AuthenticationSession> {
        let session = self.sessions.remove(cookie)?;
        if let Some(position) = self.order.iter().position(|held| held == cookie) {
            self.order.remove(position);
        }
        Some(session)
    }

    /// Unlinks a session and tears it down with `outcome`. Returns false if
    /// the cookie was not present, which is the normal outcome when
    /// cancellation races completion.
    pub(crate) fn remove_and_teardown(
        &mut self,
        cookie: &Cookie,
        bridge: &mut PromptBridge,
        outcome: AuthorizationOutcome,
    ) -> bool {
        match self.remove(cookie) {
            Some(mut session) => {
                session.teardown(bridge, outcome);
                true
            },
            None => false,
        }
    }

    /// Empties the registry, returning sessions in insertion order.
    ///
    /// Collecting before tearing anything down keeps shutdown safe even if
    /// a teardown hook were to reenter the registry.
    pub(crate) fn drain(&mut self) -> Vec<AuthenticationSession> {
        let order: Vec<Cookie> = self.order.drain(..).collect();
        order
            .into_iter()
            .filter_map(|cookie| self.sessions.remove(&cookie))
            .collect()
    }
}
