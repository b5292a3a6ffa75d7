//! Authority registration lifecycle.
//!
//! Registration is best-effort: an agent that cannot register keeps
//! running and still serves any request that reaches it. The usual reason
//! for failure is another agent already holding the subject, which happens
//! whenever two bridges share a login session.

use reauthd_core::authority::{Authority, AuthorityError, RegistrationHandle, SessionSubject};
use tracing::{debug, warn};

use crate::broker::AuthenticationAgent;

/// Registers `agent` with the authority for the current process.
///
/// Never fails: on any registration error the returned [`RegisteredAgent`]
/// simply carries no registration. `AlreadyRegistered` is the quiet,
/// expected collision; anything else is logged as a warning.
pub fn try_register<A: Authority>(
    mut authority: A,
    agent: AuthenticationAgent,
) -> RegisteredAgent<A> {
    let subject = SessionSubject::for_current_process();
    let handle = match authority.register_agent(&subject) {
        Ok(handle) => {
            debug!(%subject, "registered authentication agent for subject");
            Some(handle)
        },
        Err(AuthorityError::AlreadyRegistered) => {
            debug!(%subject, "another authentication agent is already registered");
            None
        },
        Err(err) => {
            warn!(%subject, %err, "could not register authentication agent; running unregistered");
            None
        },
    };
    RegisteredAgent {
        agent,
        authority,
        handle,
    }
}

/// An agent paired with its (possibly absent) authority registration.
pub struct RegisteredAgent<A: Authority> {
    agent: AuthenticationAgent,
    authority: A,
    handle: Option<RegistrationHandle>,
}

impl<A: Authority> RegisteredAgent<A> {
    /// Handle for submitting requests; clone it freely.
    #[must_use]
    pub fn agent(&self) -> &AuthenticationAgent {
        &self.agent
    }

    /// False when the agent runs unregistered.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.handle.is_some()
    }

    /// Cancels every outstanding session, then surrenders the registration.
    pub async fn unregister(mut self) {
        self.agent.shutdown().await;
        if let Some(handle) = self.handle.take() {
            self.authority.unregister_agent(handle);
            debug!("released authority registration");
        }
    }
}

impl<A: Authority> std::fmt::Debug for RegisteredAgent<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredAgent")
            .field("registered", &self.handle.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use reauthd_core::authority::Cookie;
    use reauthd_core::challenge::{Challenge, ChallengeEventSender, ChallengeFactory};
    use reauthd_core::config::AgentConfig;
    use reauthd_core::identity::ResolvedIdentity;

    use super::*;
    use crate::bridge::test_support::recording_channel;

    #[derive(Default)]
    struct AuthorityCalls {
        registered: Vec<SessionSubject>,
        released: Vec<u64>,
        fail_with: Option<AuthorityError>,
    }

    struct RecordingAuthority {
        calls: Arc<Mutex<AuthorityCalls>>,
        next_id: u64,
    }

    impl RecordingAuthority {
        fn new() -> (Self, Arc<Mutex<AuthorityCalls>>) {
            let calls = Arc::new(Mutex::new(AuthorityCalls::default()));
            (
                Self {
                    calls: Arc::clone(&calls),
                    next_id: 0,
                },
                calls,
            )
        }
    }

    impl Authority for RecordingAuthority {
        fn register_agent(
            &mut self,
            subject: &SessionSubject,
        ) -> Result<RegistrationHandle, AuthorityError> {
            let mut calls = self.calls.lock().unwrap();
            if let Some(err) = calls.fail_with.take() {
                return Err(err);
            }
            calls.registered.push(*subject);
            self.next_id += 1;
            Ok(RegistrationHandle::new(self.next_id))
        }

        fn unregister_agent(&mut self, handle: RegistrationHandle) {
            self.calls.lock().unwrap().released.push(handle.id());
        }
    }

    struct NoopChallenge;

    impl Challenge for NoopChallenge {
        fn start(&mut self) {}
        fn respond(&mut self, _answer: &str) {}
        fn cancel(&mut self) {}
    }

    struct NoopFactory;

    impl ChallengeFactory for NoopFactory {
        fn open(
            &self,
            _identity: &ResolvedIdentity,
            _cookie: &Cookie,
            _events: ChallengeEventSender,
        ) -> Box<dyn Challenge> {
            Box::new(NoopChallenge)
        }
    }

    fn noop_agent() -> AuthenticationAgent {
        let (channel, _) = recording_channel();
        AuthenticationAgent::start(
            AgentConfig::default(),
            Box::new(NoopFactory),
            Box::new(channel),
        )
    }

    #[tokio::test]
    async fn test_register_and_release() {
        let (authority, calls) = RecordingAuthority::new();
        let registered = try_register(authority, noop_agent());

        assert!(registered.is_registered());
        {
            let calls = calls.lock().unwrap();
            assert_eq!(calls.registered, vec![SessionSubject::for_current_process()]);
            assert!(calls.released.is_empty());
        }

        let agent = registered.agent().clone();
        registered.unregister().await;

        assert_eq!(calls.lock().unwrap().released, vec![1]);
        // The loop is gone once unregistered.
        assert_eq!(agent.active_sessions().await, 0);
    }

    #[tokio::test]
    async fn test_already_registered_keeps_running() {
        let (authority, calls) = RecordingAuthority::new();
        calls.lock().unwrap().fail_with = Some(AuthorityError::AlreadyRegistered);

        let registered = try_register(authority, noop_agent());

        assert!(!registered.is_registered());
        registered.unregister().await;
        assert!(calls.lock().unwrap().released.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_authority_keeps_running() {
        let (authority, calls) = RecordingAuthority::new();
        calls.lock().unwrap().fail_with = Some(AuthorityError::unavailable("no bus"));

        let registered = try_register(authority, noop_agent());

        assert!(!registered.is_registered());
        assert!(calls.lock().unwrap().registered.is_empty());
    }
}
